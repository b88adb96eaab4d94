use chrono::{NaiveDate, NaiveDateTime};

/// Strict parse of `"YYYYMMDDhhmmss"`: exactly 14 ASCII digits forming a
/// valid date and time.
pub fn parse_compact_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;
    let hour: u32 = s[8..10].parse().ok()?;
    let min: u32 = s[10..12].parse().ok()?;
    let sec: u32 = s[12..14].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, min, sec)
}

/// `"YYYYMMDDhhmmss"` → `"YYYY-MM-DD"`
pub fn report_date(s: &str) -> Option<String> {
    parse_compact_timestamp(s).map(|dt| dt.format("%Y-%m-%d").to_string())
}
