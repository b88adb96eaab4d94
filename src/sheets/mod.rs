//! Destination spreadsheet: the gateway trait, its Google Sheets and
//! in-memory implementations, and the two operations built on top of it
//! (per-month sync and the `all_data` aggregate).

pub mod aggregate;
pub mod auth;
pub mod google;
pub mod memory;
pub mod sync;

use async_trait::async_trait;
use thiserror::Error;

pub use aggregate::{rebuild_aggregate, AggregateOptions, AggregateOutcome};
pub use google::GoogleSheets;
pub use memory::InMemorySpreadsheet;
pub use sync::{sync_table, SizingPolicy, SyncOutcome};

/// Properties of one tab (worksheet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub sheet_id: i64,
    pub title: String,
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("tab `{0}` not found")]
    TabNotFound(String),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Operations the pipeline needs from the destination spreadsheet.
#[async_trait]
pub trait SpreadsheetGateway: Send + Sync {
    /// All tabs, in spreadsheet order.
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, SheetsError>;

    async fn create_tab(&self, title: &str, rows: usize, cols: usize)
        -> Result<TabInfo, SheetsError>;

    async fn get_tab(&self, title: &str) -> Result<TabInfo, SheetsError> {
        self.list_tabs()
            .await?
            .into_iter()
            .find(|t| t.title == title)
            .ok_or_else(|| SheetsError::TabNotFound(title.to_string()))
    }

    async fn resize_tab(&self, tab: &TabInfo, rows: usize, cols: usize)
        -> Result<TabInfo, SheetsError>;

    /// Every non-empty row, starting at row 1. Trailing empty cells may be
    /// omitted.
    async fn read_rows(&self, tab: &TabInfo) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Overwrite the block starting at `A1` with `rows`.
    async fn write_rows(&self, tab: &TabInfo, rows: &[Vec<String>]) -> Result<(), SheetsError>;

    /// Blank every cell; the grid keeps its size.
    async fn clear_tab(&self, tab: &TabInfo) -> Result<(), SheetsError>;

    async fn freeze_header(&self, tab: &TabInfo, rows: usize) -> Result<(), SheetsError>;
}

/// Grid rows needed for `value_rows` rows including a frozen header. A tab
/// can't have every row frozen, so a header-only tab keeps one blank row.
pub(crate) fn grid_rows_for(value_rows: usize) -> usize {
    value_rows.max(2)
}
