use serde::{Deserialize, Deserializer};

/// One row of a raw monthly export. Unknown columns are ignored; blank cells
/// and absent columns read as `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "VIN", default, deserialize_with = "cell")]
    pub vin: Option<String>,
    #[serde(rename = "Number", default, deserialize_with = "cell")]
    pub number: Option<String>,
    #[serde(rename = "Status", default, deserialize_with = "cell")]
    pub status: Option<String>,
    #[serde(rename = "Region", default, deserialize_with = "cell")]
    pub region: Option<String>,
    #[serde(rename = "Department", default, deserialize_with = "cell")]
    pub department: Option<String>,
    #[serde(rename = "Model", default, deserialize_with = "cell")]
    pub model: Option<String>,
    #[serde(rename = "YearCar", default, deserialize_with = "cell")]
    pub year_car: Option<String>,
    #[serde(rename = "timestamp", default, deserialize_with = "cell")]
    pub timestamp: Option<String>,
}

impl RawRecord {
    /// VIN, Number, Status, Region and Department are all present.
    pub fn has_required_fields(&self) -> bool {
        [
            &self.vin,
            &self.number,
            &self.status,
            &self.region,
            &self.department,
        ]
        .iter()
        .all(|f| f.is_some())
    }
}

fn cell<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// The cleaned row published to a month tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub date: String,
    pub model: String,
    pub year: String,
    pub number: String,
    pub vin: String,
    pub department: String,
    pub region: String,
    pub status: String,
}

impl CanonicalRecord {
    pub const HEADER: [&'static str; 8] = [
        "date",
        "model",
        "year",
        "number",
        "vin",
        "department",
        "region",
        "status",
    ];

    pub fn header() -> Vec<String> {
        Self::HEADER.iter().map(|s| s.to_string()).collect()
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.model.clone(),
            self.year.clone(),
            self.number.clone(),
            self.vin.clone(),
            self.department.clone(),
            self.region.clone(),
            self.status.clone(),
        ]
    }

    /// Sort key: (model, year, department, region); empty values sort first.
    pub fn sort_key(&self) -> (&str, &str, &str, &str) {
        (&self.model, &self.year, &self.department, &self.region)
    }
}

/// Cleaned contents of one export, ready for its destination tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedTable {
    pub tab_name: String,
    pub records: Vec<CanonicalRecord>,
}

impl CleanedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_count(&self) -> usize {
        CanonicalRecord::HEADER.len()
    }

    /// Header row followed by every data row.
    pub fn to_values(&self) -> Vec<Vec<String>> {
        std::iter::once(CanonicalRecord::header())
            .chain(self.records.iter().map(CanonicalRecord::to_row))
            .collect()
    }
}
