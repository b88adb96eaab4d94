//! One run of the job: select → download → clean → sync per file, then the
//! aggregate.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::{
    config::Config,
    fetch::{download_selected, select_new_exports},
    history::LocalArchive,
    process::{clean_file, ExclusionPolicy},
    sheets::{
        rebuild_aggregate, sync_table, AggregateOptions, SizingPolicy, SpreadsheetGateway,
        TabInfo,
    },
    store::ObjectStoreClient,
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub data_dir: PathBuf,
    pub key_filter: String,
    pub policy: ExclusionPolicy,
    pub sizing: SizingPolicy,
    pub aggregate: AggregateOptions,
}

impl PipelineOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            key_filter: crate::config::DEFAULT_KEY_FILTER.to_string(),
            policy: ExclusionPolicy::fleet_default(),
            sizing: SizingPolicy::default(),
            aggregate: AggregateOptions::default(),
        }
    }
}

impl From<&Config> for PipelineOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            key_filter: cfg.key_filter.clone(),
            ..Self::new(&cfg.data_dir)
        }
    }
}

/// What happened during a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub downloaded: Vec<String>,
    /// Keys that matched the filter but could not be parsed, with the reason.
    pub skipped: Vec<(String, String)>,
    pub synced_tabs: Vec<String>,
    /// `(key or file, error)` for each download or file that failed.
    pub failures: Vec<(String, String)>,
    pub aggregate_rows: Option<usize>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.aggregate_rows.is_some()
    }
}

/// Run the whole job once.
///
/// Listing the bucket, opening the data directory and rebuilding the
/// aggregate are fatal. A failure on one download or one file is recorded in
/// the report and the run moves on.
#[instrument(level = "info", skip_all, fields(bucket = %store.bucket(), data_dir = %opts.data_dir.display()))]
pub async fn run(
    opts: &PipelineOptions,
    store: &ObjectStoreClient,
    sheets: &dyn SpreadsheetGateway,
) -> Result<RunReport> {
    let start = Instant::now();
    let mut report = RunReport::default();

    // ─── 1) select new exports ───────────────────────────────────────
    let archive = LocalArchive::open(&opts.data_dir)?;
    let local = archive.names()?;
    info!("{} exports already local", local.len());

    let keys = store.list_objects().await?;
    let selection = select_new_exports(keys.iter().map(String::as_str), &local, &opts.key_filter);
    info!(
        listed = keys.len(),
        selected = selection.selected.len(),
        skipped = selection.skipped.len(),
        "selected exports"
    );
    report.skipped = selection
        .skipped
        .iter()
        .map(|(k, e)| (k.clone(), e.to_string()))
        .chain(
            selection
                .duplicates
                .iter()
                .map(|k| (k.clone(), "base name already selected".to_string())),
        )
        .collect();

    // ─── 2) download ─────────────────────────────────────────────────
    let downloads = download_selected(store, &selection.selected, &archive).await;
    report.downloaded = downloads.downloaded.into_iter().map(|(key, _)| key).collect();
    report.failures.extend(downloads.failed);

    // ─── 3) clean + sync every local export ─────────────────────────
    let mut tabs = sheets.list_tabs().await.context("listing spreadsheet tabs")?;
    for path in archive.exports()? {
        let name = display_name(&path);
        match process_file(opts, sheets, &tabs, &path).await {
            Ok(tab) => {
                if !tabs.iter().any(|t| t.title == tab.title) {
                    tabs.push(tab.clone());
                }
                report.synced_tabs.push(tab.title);
            }
            Err(e) => {
                error!(file = %name, "processing failed: {:#}", e);
                report.failures.push((name, format!("{:#}", e)));
            }
        }
    }

    // ─── 4) aggregate ────────────────────────────────────────────────
    let agg = rebuild_aggregate(sheets, &opts.aggregate)
        .await
        .with_context(|| format!("rebuilding `{}`", opts.aggregate.target))?;
    report.aggregate_rows = Some(agg.rows);

    if !report.failures.is_empty() {
        warn!(failures = report.failures.len(), "run finished with failures");
    }
    info!(
        downloaded = report.downloaded.len(),
        synced = report.synced_tabs.len(),
        aggregate_rows = agg.rows,
        elapsed = ?start.elapsed(),
        "run complete"
    );
    Ok(report)
}

async fn process_file(
    opts: &PipelineOptions,
    sheets: &dyn SpreadsheetGateway,
    tabs: &[TabInfo],
    path: &Path,
) -> Result<TabInfo> {
    let (table, _stats) = clean_file(path, &opts.policy)?;
    let outcome = sync_table(sheets, tabs, &table, opts.sizing)
        .await
        .with_context(|| format!("syncing tab {}", table.tab_name))?;
    info!(
        tab = %outcome.tab.title,
        rows = outcome.rows_written,
        created = outcome.created,
        "tab synced"
    );
    Ok(outcome.tab)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::{memory::FailingReads, InMemorySpreadsheet};
    use object_store::memory::InMemory;
    use std::sync::Arc;

    #[test]
    fn report_success_requires_aggregate_and_no_failures() {
        let mut r = RunReport::default();
        assert!(!r.is_success());
        r.aggregate_rows = Some(0);
        assert!(r.is_success());
        r.failures.push(("k".into(), "boom".into()));
        assert!(!r.is_success());
    }

    #[test]
    fn options_from_config_take_filter_and_dir() {
        let vars: std::collections::HashMap<&str, &str> = [
            ("AWS_ACCESS_KEY_ID", "a"),
            ("AWS_SECRET_ACCESS_KEY", "s"),
            ("S3_ENDPOINT_URL", "http://localhost:9000"),
            ("S3_REGION_NAME", "us-east-1"),
            ("CREDENTIALS_FILE", "c.json"),
            ("GSHEET_URL", "SHEETID"),
            ("DATA_DIR", "/tmp/exports"),
            ("EXPORT_KEY_FILTER", "trucks"),
        ]
        .into_iter()
        .collect();
        let cfg = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        let opts = PipelineOptions::from(&cfg);
        assert_eq!(opts.data_dir, PathBuf::from("/tmp/exports"));
        assert_eq!(opts.key_filter, "trucks");
        assert_eq!(opts.sizing, SizingPolicy::FitContent);
    }

    #[tokio::test]
    async fn unreadable_source_tab_aborts_the_run() {
        let store = ObjectStoreClient::new("fleet", Arc::new(InMemory::new()));
        let body = "VIN,Number,Status,Region,Department,Model,YearCar,timestamp\n\
                    V1,A001,Active,North,Sales,Camry,2020,20240101030000\n";
        assert!(store.create_object("cars_20240101030000.csv", body).await);

        let previous = vec![
            crate::process::CanonicalRecord::header(),
            vec!["2023-12-01".to_string(); 8],
        ];
        let sheets = FailingReads {
            inner: InMemorySpreadsheet::with_tabs([
                ("2023-12-01", previous.clone()),
                ("all_data", previous.clone()),
            ]),
            tab: "2023-12-01".into(),
        };
        let tmp = tempfile::tempdir().unwrap();

        let err = run(&PipelineOptions::new(tmp.path()), &store, &sheets)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("all_data"), "{:#}", err);

        // the month was still published; the aggregate was not touched
        assert!(sheets.inner.get_tab("2024-01-01").await.is_ok());
        let all = sheets.inner.get_tab("all_data").await.unwrap();
        assert_eq!(sheets.inner.read_rows(&all).await.unwrap(), previous);
    }
}
