use std::path::PathBuf;

use thiserror::Error;

/// Malformed input: export names and timestamps that do not follow the
/// expected layout. Fatal for the file it occurs in, never for the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("file name `{name}` does not match <prefix>_<YYYYMMDD[hhmmss]>.<ext>")]
    FileName { name: String },

    #[error("file name `{name}` carries an invalid date `{date}`")]
    FileDate { name: String, date: String },

    #[error("row {row}: timestamp `{value}` is not YYYYMMDDhhmmss")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: timestamp is missing")]
    MissingTimestamp { row: usize },
}

/// Startup failures. Raised before any remote call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("cannot read credentials file {path}: {source}")]
    CredentialsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service account credentials in {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },
}
