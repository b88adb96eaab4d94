//! Run configuration.
//!
//! Everything the job needs is read once from the environment into a
//! [`Config`] value that is handed to each collaborator at construction.
//! A `.env` file in the working directory is honoured.

use std::{fmt, path::PathBuf};

use tracing::warn;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_BUCKET: &str = "my-bucket";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_KEY_FILTER: &str = "cars";

#[derive(Clone)]
pub struct S3Config {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: String,
    pub region: String,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Service account key (JSON) used to authorize against the Sheets API.
    pub credentials_file: PathBuf,
    pub sheet_url: String,
    pub spreadsheet_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub s3: S3Config,
    pub bucket: String,
    pub sheets: SheetsConfig,
    /// Working directory holding downloaded exports.
    pub data_dir: PathBuf,
    /// Substring an object key must contain to be considered an export.
    pub key_filter: String,
}

impl Config {
    /// Load from the process environment, after applying `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = ignore_missing(dotenvy::dotenv()) {
            warn!(error = %e, "ignoring unreadable .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let s3 = S3Config {
            access_key_id: require("AWS_ACCESS_KEY_ID")?,
            secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
            endpoint_url: require("S3_ENDPOINT_URL")?,
            region: require("S3_REGION_NAME")?,
        };
        Url::parse(&s3.endpoint_url).map_err(|e| ConfigError::Invalid {
            var: "S3_ENDPOINT_URL",
            reason: e.to_string(),
        })?;

        let sheet_url = require("GSHEET_URL")?;
        let spreadsheet_id = spreadsheet_id_from_url(&sheet_url)?;
        let sheets = SheetsConfig {
            credentials_file: PathBuf::from(require("CREDENTIALS_FILE")?),
            sheet_url,
            spreadsheet_id,
        };

        Ok(Self {
            s3,
            bucket: get("S3_BUCKET_NAME").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            sheets,
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            key_filter: get("EXPORT_KEY_FILTER").unwrap_or_else(|| DEFAULT_KEY_FILTER.to_string()),
        })
    }
}

/// A missing `.env` is fine; anything else is reported.
fn ignore_missing<T>(result: dotenvy::Result<T>) -> dotenvy::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Extract the spreadsheet id from `https://docs.google.com/spreadsheets/d/<id>/edit...`.
/// A bare id is accepted as-is.
pub fn spreadsheet_id_from_url(sheet_url: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var: "GSHEET_URL",
        reason: reason.to_string(),
    };

    let url = match Url::parse(sheet_url) {
        Ok(url) => url,
        Err(_) if !sheet_url.contains('/') => return Ok(sheet_url.to_string()),
        Err(e) => return Err(invalid(&e.to_string())),
    };

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();
    segments
        .windows(2)
        .find(|w| w[0] == "d" && !w[1].is_empty())
        .map(|w| w[1].to_string())
        .ok_or_else(|| invalid("no /d/<spreadsheet id>/ segment"))
}
