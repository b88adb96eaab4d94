use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::process::record::RawRecord;

/// Columns an exclusion rule can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyColumn {
    Status,
    Department,
    Model,
    YearCar,
}

impl fmt::Display for PolicyColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicyColumn::Status => "Status",
            PolicyColumn::Department => "Department",
            PolicyColumn::Model => "Model",
            PolicyColumn::YearCar => "YearCar",
        };
        f.write_str(s)
    }
}

/// Denylist of literal values per column. A row is excluded when any listed
/// column holds one of its denied values (exact match on the trimmed cell).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionPolicy {
    rules: BTreeMap<PolicyColumn, BTreeSet<String>>,
}

impl ExclusionPolicy {
    /// A policy that excludes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The fleet report denylist: archived and personal vehicles, the test
    /// placeholder model and the zero-date year sentinel. Localized labels
    /// are listed next to their English equivalents.
    pub fn fleet_default() -> Self {
        Self::empty()
            .deny(PolicyColumn::Status, ["АРХИВ", "ЛИЧНАЯ", "ARCHIVE", "PERSONAL"])
            .deny(PolicyColumn::Department, ["ЛИЧНАЯ", "PERSONAL"])
            .deny(PolicyColumn::Model, ["БЭТМОБИЛЬ", "BATMOBILE"])
            .deny(PolicyColumn::YearCar, ["0001-01-01T00:00:00"])
    }

    pub fn deny<I, S>(mut self, column: PolicyColumn, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules
            .entry(column)
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn is_denied(&self, column: PolicyColumn, value: &str) -> bool {
        self.rules
            .get(&column)
            .is_some_and(|denied| denied.contains(value))
    }

    /// First column whose value is denied for `record`, if any.
    pub fn excluded_by(&self, record: &RawRecord) -> Option<PolicyColumn> {
        [
            (PolicyColumn::Status, &record.status),
            (PolicyColumn::Department, &record.department),
            (PolicyColumn::Model, &record.model),
            (PolicyColumn::YearCar, &record.year_car),
        ]
        .into_iter()
        .find_map(|(column, value)| {
            value
                .as_deref()
                .filter(|v| self.is_denied(column, v))
                .map(|_| column)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: &str, department: &str, model: &str, year: &str) -> RawRecord {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        RawRecord {
            status: opt(status),
            department: opt(department),
            model: opt(model),
            year_car: opt(year),
            ..RawRecord::default()
        }
    }

    #[test]
    fn default_policy_matches_each_column() {
        let p = ExclusionPolicy::fleet_default();
        assert_eq!(
            p.excluded_by(&record("ARCHIVE", "Sales", "Camry", "2020")),
            Some(PolicyColumn::Status)
        );
        assert_eq!(
            p.excluded_by(&record("АКТИВНА", "ЛИЧНАЯ", "Camry", "2020")),
            Some(PolicyColumn::Department)
        );
        assert_eq!(
            p.excluded_by(&record("ACTIVE", "Sales", "БЭТМОБИЛЬ", "2020")),
            Some(PolicyColumn::Model)
        );
        assert_eq!(
            p.excluded_by(&record("ACTIVE", "Sales", "Camry", "0001-01-01T00:00:00")),
            Some(PolicyColumn::YearCar)
        );
        assert_eq!(p.excluded_by(&record("ACTIVE", "Sales", "Camry", "2020")), None);
    }

    #[test]
    fn missing_values_are_never_denied() {
        let p = ExclusionPolicy::fleet_default();
        assert_eq!(p.excluded_by(&record("ACTIVE", "Sales", "", "")), None);
    }

    #[test]
    fn new_rules_extend_without_touching_parsing() {
        let p = ExclusionPolicy::empty().deny(PolicyColumn::Model, ["Test"]);
        assert!(p.is_denied(PolicyColumn::Model, "Test"));
        assert!(!p.is_denied(PolicyColumn::Status, "ARCHIVE"));
    }
}
