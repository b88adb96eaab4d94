//! Publish one cleaned month into its tab.

use tracing::{debug, info, instrument};

use super::{grid_rows_for, SheetsError, SpreadsheetGateway, TabInfo};
use crate::process::CleanedTable;

/// How an existing tab is resized before it is overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizingPolicy {
    /// Grid = header + data rows. Reruns leave the size unchanged.
    #[default]
    FitContent,
    /// Grid = current rows + data rows. Every rerun grows the tab.
    Additive,
}

impl SizingPolicy {
    fn target_rows(self, current: usize, data_rows: usize) -> usize {
        let fit = grid_rows_for(data_rows + 1);
        match self {
            SizingPolicy::FitContent => fit,
            SizingPolicy::Additive => (current + data_rows).max(fit),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub tab: TabInfo,
    pub created: bool,
    /// Data rows written, header excluded.
    pub rows_written: usize,
}

/// Write `table` (header + rows) into the tab named after it, creating the
/// tab if `existing` does not list it. The header row is frozen afterwards.
#[instrument(level = "info", skip(gateway, existing, table), fields(tab = %table.tab_name, rows = table.len()))]
pub async fn sync_table(
    gateway: &dyn SpreadsheetGateway,
    existing: &[TabInfo],
    table: &CleanedTable,
    sizing: SizingPolicy,
) -> Result<SyncOutcome, SheetsError> {
    let values = table.to_values();
    let cols = table.column_count();

    let (tab, created) = match existing.iter().find(|t| t.title == table.tab_name) {
        Some(found) => {
            // listing may be stale; resize from the live grid
            let current = gateway.get_tab(&found.title).await?;
            let rows = sizing.target_rows(current.row_count, table.len());
            debug!(from = current.row_count, to = rows, ?sizing, "resizing tab");
            (gateway.resize_tab(&current, rows, cols).await?, false)
        }
        None => {
            let rows = grid_rows_for(values.len());
            info!(rows, cols, "creating tab");
            (gateway.create_tab(&table.tab_name, rows, cols).await?, true)
        }
    };

    gateway.write_rows(&tab, &values).await?;
    gateway.freeze_header(&tab, 1).await?;

    Ok(SyncOutcome {
        tab,
        created,
        rows_written: table.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{process::CanonicalRecord, sheets::InMemorySpreadsheet};

    fn record(model: &str, vin: &str) -> CanonicalRecord {
        CanonicalRecord {
            date: "2024-01-01".into(),
            model: model.into(),
            year: "2020".into(),
            number: "A001AA".into(),
            vin: vin.into(),
            department: "Sales".into(),
            region: "North".into(),
            status: "Active".into(),
        }
    }

    fn table(n: usize) -> CleanedTable {
        CleanedTable {
            tab_name: "2024-01-01".into(),
            records: (0..n).map(|i| record("Camry", &format!("VIN{i}"))).collect(),
        }
    }

    #[tokio::test]
    async fn creates_missing_tab_and_freezes_header() {
        let sheet = InMemorySpreadsheet::new();
        let t = table(3);
        let out = sync_table(&sheet, &[], &t, SizingPolicy::FitContent)
            .await
            .unwrap();
        assert!(out.created);
        assert_eq!(out.rows_written, 3);
        assert_eq!(out.tab.row_count, 4);
        assert_eq!(out.tab.column_count, 8);
        assert_eq!(sheet.frozen_rows("2024-01-01"), Some(1));
        assert_eq!(sheet.read_rows(&out.tab).await.unwrap(), t.to_values());
    }

    #[tokio::test]
    async fn fit_content_rerun_keeps_size() {
        let sheet = InMemorySpreadsheet::new();
        let t = table(10);
        let first = sync_table(&sheet, &[], &t, SizingPolicy::FitContent)
            .await
            .unwrap();
        let listed = sheet.list_tabs().await.unwrap();
        let second = sync_table(&sheet, &listed, &t, SizingPolicy::FitContent)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(first.tab.row_count, 11);
        assert_eq!(second.tab.row_count, 11);
        assert_eq!(sheet.read_rows(&second.tab).await.unwrap(), t.to_values());
    }

    #[tokio::test]
    async fn additive_rerun_grows_by_data_rows() {
        let sheet = InMemorySpreadsheet::new();
        let t = table(10);
        sync_table(&sheet, &[], &t, SizingPolicy::Additive)
            .await
            .unwrap();
        let listed = sheet.list_tabs().await.unwrap();
        let second = sync_table(&sheet, &listed, &t, SizingPolicy::Additive)
            .await
            .unwrap();
        assert_eq!(second.tab.row_count, 21);
        assert_eq!(sheet.read_rows(&second.tab).await.unwrap(), t.to_values());
    }

    #[tokio::test]
    async fn shrinking_month_leaves_no_stale_rows() {
        let sheet = InMemorySpreadsheet::new();
        sync_table(&sheet, &[], &table(5), SizingPolicy::FitContent)
            .await
            .unwrap();
        let listed = sheet.list_tabs().await.unwrap();
        let small = table(2);
        let out = sync_table(&sheet, &listed, &small, SizingPolicy::FitContent)
            .await
            .unwrap();
        assert_eq!(out.tab.row_count, 3);
        assert_eq!(sheet.read_rows(&out.tab).await.unwrap(), small.to_values());
    }

    #[tokio::test]
    async fn header_only_table_keeps_a_spare_row() {
        let sheet = InMemorySpreadsheet::new();
        let out = sync_table(&sheet, &[], &table(0), SizingPolicy::FitContent)
            .await
            .unwrap();
        assert_eq!(out.tab.row_count, 2);
        assert_eq!(
            sheet.read_rows(&out.tab).await.unwrap(),
            vec![CanonicalRecord::header()]
        );
    }
}
