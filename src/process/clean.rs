use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::{fs::File, io::Read, path::Path};
use tracing::{debug, info, instrument};

use crate::{
    error::ParseError,
    fetch::select::ExportName,
    process::{
        date_parser,
        policy::ExclusionPolicy,
        record::{CanonicalRecord, CleanedTable, RawRecord},
    },
};

/// Number of characters kept from `YearCar`.
pub const YEAR_LEN: usize = 4;

/// Row accounting for one cleaned file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanStats {
    pub read: usize,
    pub missing_required: usize,
    pub excluded: usize,
    pub short_year: usize,
    pub kept: usize,
}

/// Clean one downloaded export. The tab name comes from the file name; any
/// malformed name or timestamp fails the whole file.
#[instrument(level = "info", skip(path, policy), fields(path = %path.display()))]
pub fn clean_file(path: &Path, policy: &ExclusionPolicy) -> Result<(CleanedTable, CleanStats)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("no usable file name in {:?}", path))?;
    let tab_name = ExportName::parse(name)?.tab_name();

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (records, stats) =
        clean_reader(file, policy).with_context(|| format!("cleaning {}", name))?;

    info!(
        tab = %tab_name,
        read = stats.read,
        kept = stats.kept,
        missing_required = stats.missing_required,
        excluded = stats.excluded,
        short_year = stats.short_year,
        "cleaned export"
    );
    Ok((CleanedTable { tab_name, records }, stats))
}

/// Clean CSV data from any reader: filter, derive, project and sort.
pub fn clean_reader<R: Read>(
    reader: R,
    policy: &ExclusionPolicy,
) -> Result<(Vec<CanonicalRecord>, CleanStats)> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut stats = CleanStats::default();
    let mut out = Vec::new();

    for (idx, result) in rdr.deserialize::<RawRecord>().enumerate() {
        let row = idx + 1;
        let raw = result.with_context(|| format!("CSV parse error at data row {}", row))?;
        stats.read += 1;

        if !raw.has_required_fields() {
            stats.missing_required += 1;
            continue;
        }
        if let Some(column) = policy.excluded_by(&raw) {
            debug!(row, %column, "excluded by policy");
            stats.excluded += 1;
            continue;
        }
        let Some(year) = truncate_year(raw.year_car.as_deref()) else {
            debug!(row, year_car = ?raw.year_car, "year shorter than 4 characters");
            stats.short_year += 1;
            continue;
        };
        let date = match raw.timestamp.as_deref() {
            None => return Err(ParseError::MissingTimestamp { row }.into()),
            Some(ts) => date_parser::report_date(ts).ok_or_else(|| ParseError::Timestamp {
                row,
                value: ts.to_string(),
            })?,
        };

        out.push(CanonicalRecord {
            date,
            model: raw.model.unwrap_or_default(),
            year,
            number: raw.number.unwrap_or_default(),
            vin: raw.vin.unwrap_or_default(),
            department: raw.department.unwrap_or_default(),
            region: raw.region.unwrap_or_default(),
            status: raw.status.unwrap_or_default(),
        });
    }

    out.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    stats.kept = out.len();
    Ok((out, stats))
}

/// First [`YEAR_LEN`] characters of `YearCar`. Missing → empty year;
/// present but shorter → `None` (row rejected).
fn truncate_year(year_car: Option<&str>) -> Option<String> {
    match year_car {
        None => Some(String::new()),
        Some(y) if y.chars().count() < YEAR_LEN => None,
        Some(y) => Some(y.chars().take(YEAR_LEN).collect()),
    }
}
