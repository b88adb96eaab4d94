//! Rebuild the `all_data` tab from every month tab.

use tracing::{debug, info, instrument, warn};

use super::{grid_rows_for, SheetsError, SpreadsheetGateway, TabInfo};
use crate::process::CanonicalRecord;

pub const AGGREGATE_TAB: &str = "all_data";
/// Hand-maintained pivot tab; never a data source.
pub const SUMMARY_TAB: &str = "сводная таблица";

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub target: String,
    /// Tabs that are never read as sources. The target is always excluded.
    pub excluded: Vec<String>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            target: AGGREGATE_TAB.to_string(),
            excluded: vec![AGGREGATE_TAB.to_string(), SUMMARY_TAB.to_string()],
        }
    }
}

impl AggregateOptions {
    fn is_source(&self, title: &str) -> bool {
        title != self.target && !self.excluded.iter().any(|e| e == title)
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub tab: TabInfo,
    pub created: bool,
    pub source_tabs: Vec<String>,
    /// Data rows written, header excluded.
    pub rows: usize,
    pub header: Vec<String>,
}

/// Concatenate the data rows of every source tab (in listing order) under a
/// single header and overwrite the target tab with them.
///
/// The header is the first row of the first source tab by name that has one;
/// with no such tab the canonical header is used. All sources are read before
/// the target is touched.
#[instrument(level = "info", skip(gateway, opts), fields(target = %opts.target))]
pub async fn rebuild_aggregate(
    gateway: &dyn SpreadsheetGateway,
    opts: &AggregateOptions,
) -> Result<AggregateOutcome, SheetsError> {
    let tabs = gateway.list_tabs().await?;
    let sources: Vec<&TabInfo> = tabs.iter().filter(|t| opts.is_source(&t.title)).collect();

    let mut contents: Vec<(&str, Vec<Vec<String>>)> = Vec::with_capacity(sources.len());
    for tab in &sources {
        let rows = gateway.read_rows(tab).await?;
        debug!(tab = %tab.title, rows = rows.len().saturating_sub(1), "read source tab");
        contents.push((tab.title.as_str(), rows));
    }

    let header = pick_header(&contents);
    let width = header.len();

    let mut data: Vec<Vec<String>> = Vec::new();
    for (_, rows) in &contents {
        for row in rows.iter().skip(1) {
            let mut row = row.clone();
            if row.len() < width {
                row.resize(width, String::new());
            }
            data.push(row);
        }
    }
    let cols = data.iter().map(Vec::len).max().unwrap_or(0).max(width);
    let total = data.len();
    if total == 0 {
        warn!(sources = sources.len(), "no data rows found for aggregate");
    }

    let values: Vec<Vec<String>> = std::iter::once(header.clone()).chain(data).collect();
    let rows = grid_rows_for(values.len());

    let (tab, created) = match tabs.iter().find(|t| t.title == opts.target) {
        Some(existing) => {
            gateway.clear_tab(existing).await?;
            (gateway.resize_tab(existing, rows, cols).await?, false)
        }
        None => (gateway.create_tab(&opts.target, rows, cols).await?, true),
    };
    gateway.write_rows(&tab, &values).await?;
    gateway.freeze_header(&tab, 1).await?;

    info!(rows = total, sources = sources.len(), created, "aggregate rebuilt");
    Ok(AggregateOutcome {
        tab,
        created,
        source_tabs: sources.iter().map(|t| t.title.clone()).collect(),
        rows: total,
        header,
    })
}

fn pick_header(contents: &[(&str, Vec<Vec<String>>)]) -> Vec<String> {
    let mut by_name: Vec<&(&str, Vec<Vec<String>>)> = contents.iter().collect();
    by_name.sort_by(|a, b| a.0.cmp(b.0));
    by_name
        .into_iter()
        .find_map(|(_, rows)| rows.first().filter(|r| !r.is_empty()).cloned())
        .unwrap_or_else(CanonicalRecord::header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::{memory::FailingReads, InMemorySpreadsheet};

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn month(date: &str, vins: &[&str]) -> Vec<Vec<String>> {
        std::iter::once(CanonicalRecord::header())
            .chain(vins.iter().map(|v| {
                row(&[date, "Camry", "2020", "A001AA", v, "Sales", "North", "Active"])
            }))
            .collect()
    }

    #[tokio::test]
    async fn row_count_is_sum_of_sources() {
        let sheet = InMemorySpreadsheet::with_tabs([
            ("2024-01-01", month("2024-01-01", &["V1", "V2", "V3", "V4", "V5"])),
            ("2024-02-01", month("2024-02-01", &["V6", "V7", "V8"])),
        ]);
        let out = rebuild_aggregate(&sheet, &AggregateOptions::default())
            .await
            .unwrap();
        assert!(out.created);
        assert_eq!(out.rows, 8);

        let all = sheet.read_rows(&out.tab).await.unwrap();
        assert_eq!(all.len(), 9);
        assert_eq!(all[0], CanonicalRecord::header());
        assert_eq!(all[1][4], "V1");
        assert_eq!(all[6][4], "V6");
        assert_eq!(sheet.frozen_rows(AGGREGATE_TAB), Some(1));
    }

    #[tokio::test]
    async fn excluded_tabs_are_not_sources() {
        let sheet = InMemorySpreadsheet::with_tabs([
            (SUMMARY_TAB, vec![row(&["pivot", "total"]), row(&["Camry", "42"])]),
            ("2024-01-01", month("2024-01-01", &["V1", "V2"])),
            (AGGREGATE_TAB, month("2023-12-01", &["OLD1", "OLD2", "OLD3"])),
        ]);
        let out = rebuild_aggregate(&sheet, &AggregateOptions::default())
            .await
            .unwrap();
        assert!(!out.created);
        assert_eq!(out.source_tabs, vec!["2024-01-01"]);
        assert_eq!(out.rows, 2);
        assert_eq!(out.tab.row_count, 3);

        let all = sheet.read_rows(&out.tab).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|r| !r.contains(&"OLD1".to_string())));
    }

    #[tokio::test]
    async fn header_comes_from_first_tab_by_name() {
        let mut late = month("2024-03-01", &["V3"]);
        late[0][0] = "report_date".into();
        // listed first, but sorts after 2024-01-01
        let sheet = InMemorySpreadsheet::with_tabs([
            ("2024-03-01", late),
            ("2024-01-01", month("2024-01-01", &["V1"])),
        ]);
        let out = rebuild_aggregate(&sheet, &AggregateOptions::default())
            .await
            .unwrap();
        assert_eq!(out.header, CanonicalRecord::header());
        let all = sheet.read_rows(&out.tab).await.unwrap();
        assert_eq!(all[1][4], "V3");
        assert_eq!(all[2][4], "V1");
    }

    #[tokio::test]
    async fn no_sources_writes_canonical_header() {
        let sheet = InMemorySpreadsheet::with_tabs([(SUMMARY_TAB, vec![row(&["x"])])]);
        let out = rebuild_aggregate(&sheet, &AggregateOptions::default())
            .await
            .unwrap();
        assert_eq!(out.rows, 0);
        assert_eq!(
            sheet.read_rows(&out.tab).await.unwrap(),
            vec![CanonicalRecord::header()]
        );
    }

    #[tokio::test]
    async fn failed_source_read_leaves_target_untouched() {
        let previous = month("2023-12-01", &["OLD1", "OLD2"]);
        let sheet = FailingReads {
            inner: InMemorySpreadsheet::with_tabs([
                ("2024-01-01", month("2024-01-01", &["V1", "V2"])),
                ("2024-02-01", month("2024-02-01", &["V3"])),
                (AGGREGATE_TAB, previous.clone()),
            ]),
            tab: "2024-02-01".into(),
        };
        let before = sheet.inner.get_tab(AGGREGATE_TAB).await.unwrap();

        let err = rebuild_aggregate(&sheet, &AggregateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SheetsError::Api { status: 503, .. }));

        let after = sheet.inner.get_tab(AGGREGATE_TAB).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(sheet.inner.read_rows(&after).await.unwrap(), previous);
        assert_eq!(sheet.inner.frozen_rows(AGGREGATE_TAB), Some(0));
    }

    #[tokio::test]
    async fn rerun_is_stable() {
        let sheet = InMemorySpreadsheet::with_tabs([(
            "2024-01-01",
            month("2024-01-01", &["V1", "V2"]),
        )]);
        let opts = AggregateOptions::default();
        let first = rebuild_aggregate(&sheet, &opts).await.unwrap();
        let second = rebuild_aggregate(&sheet, &opts).await.unwrap();
        assert_eq!(first.tab.row_count, second.tab.row_count);
        assert_eq!(
            sheet.read_rows(&first.tab).await.unwrap(),
            sheet.read_rows(&second.tab).await.unwrap()
        );
    }
}
