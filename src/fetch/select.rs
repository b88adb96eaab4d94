use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::ParseError;

/// `<prefix>_<YYYYMMDD[hhmmss]>.<ext>`; the prefix is greedy so the date is
/// always the last underscore-separated segment.
static EXPORT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prefix>.+)_(?P<stamp>\d{8,14})\.(?P<ext>[A-Za-z0-9]+)$")
        .expect("export name pattern should be valid")
});

/// A parsed export file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportName {
    /// Full object key as listed in the bucket.
    pub key: String,
    /// Base name (last `/` segment of the key).
    pub name: String,
    pub prefix: String,
    /// Raw digit run after the last underscore.
    pub stamp: String,
    pub date: NaiveDate,
    pub ext: String,
}

impl ExportName {
    pub fn parse(key: &str) -> Result<Self, ParseError> {
        let name = key.rsplit('/').next().unwrap_or(key);
        let caps = EXPORT_NAME.captures(name).ok_or_else(|| ParseError::FileName {
            name: name.to_string(),
        })?;
        let stamp = caps["stamp"].to_string();
        let date = NaiveDate::parse_from_str(&stamp[..8], "%Y%m%d").map_err(|_| {
            ParseError::FileDate {
                name: name.to_string(),
                date: stamp[..8].to_string(),
            }
        })?;

        Ok(Self {
            key: key.to_string(),
            name: name.to_string(),
            prefix: caps["prefix"].to_string(),
            stamp,
            date,
            ext: caps["ext"].to_string(),
        })
    }

    pub fn is_first_of_month(&self) -> bool {
        self.date.day() == 1
    }

    /// Destination tab for this export: its report date as `YYYY-MM-DD`.
    pub fn tab_name(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Result of [`select_new_exports`].
#[derive(Debug, Default)]
pub struct Selection {
    pub selected: Vec<ExportName>,
    /// Keys that passed the substring filter but have a malformed name.
    pub skipped: Vec<(String, ParseError)>,
    /// Keys whose base name was already selected from an earlier key.
    pub duplicates: Vec<String>,
}

/// Pick the remote keys that are first-of-month exports not yet materialized
/// locally. `local` holds base file names.
pub fn select_new_exports<'a, I>(keys: I, local: &HashSet<String>, filter: &str) -> Selection
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Selection::default();
    let mut picked: HashSet<String> = HashSet::new();
    for key in keys {
        if !key.contains(filter) {
            continue;
        }
        let export = match ExportName::parse(key) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "skipping malformed export key");
                out.skipped.push((key.to_string(), e));
                continue;
            }
        };
        if !export.is_first_of_month() {
            continue;
        }
        if local.contains(&export.name) {
            debug!(key, "already downloaded");
            continue;
        }
        if !picked.insert(export.name.clone()) {
            warn!(key, name = %export.name, "base name already selected; skipping");
            out.duplicates.push(export.key);
            continue;
        }
        out.selected.push(export);
    }
    out
}
