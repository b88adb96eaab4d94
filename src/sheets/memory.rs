//! In-memory spreadsheet with the grid rules of the Sheets API: writes must
//! fit inside the grid, resizing truncates or pads, clearing keeps the size,
//! and a tab can't have all its rows frozen.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use super::{SheetsError, SpreadsheetGateway, TabInfo};

#[derive(Debug, Clone)]
struct Tab {
    id: i64,
    title: String,
    frozen_rows: usize,
    /// `rows × cols` cells, always rectangular.
    cells: Vec<Vec<String>>,
    cols: usize,
}

impl Tab {
    fn info(&self) -> TabInfo {
        TabInfo {
            sheet_id: self.id,
            title: self.title.clone(),
            row_count: self.cells.len(),
            column_count: self.cols,
        }
    }

    fn resize(&mut self, rows: usize, cols: usize) {
        self.cells.resize_with(rows, Vec::new);
        for row in &mut self.cells {
            row.resize(cols, String::new());
        }
        self.cols = cols;
    }
}

#[derive(Debug, Default)]
struct State {
    tabs: Vec<Tab>,
    next_id: i64,
}

#[derive(Debug, Default)]
pub struct InMemorySpreadsheet {
    state: Mutex<State>,
}

impl InMemorySpreadsheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A spreadsheet that already holds `tabs`, each given as its rows.
    pub fn with_tabs<'a>(tabs: impl IntoIterator<Item = (&'a str, Vec<Vec<String>>)>) -> Self {
        let sheet = Self::new();
        {
            let mut st = sheet.state();
            for (title, rows) in tabs {
                let cols = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
                let id = st.next_id;
                st.next_id += 1;
                let mut tab = Tab {
                    id,
                    title: title.to_string(),
                    frozen_rows: 0,
                    cells: rows,
                    cols,
                };
                let n = tab.cells.len().max(1);
                tab.resize(n, cols);
                st.tabs.push(tab);
            }
        }
        sheet
    }

    pub fn frozen_rows(&self, title: &str) -> Option<usize> {
        self.state()
            .tabs
            .iter()
            .find(|t| t.title == title)
            .map(|t| t.frozen_rows)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn bad_request(message: impl Into<String>) -> SheetsError {
    SheetsError::Api {
        status: 400,
        message: message.into(),
    }
}

fn find<'a>(st: &'a mut State, tab: &TabInfo) -> Result<&'a mut Tab, SheetsError> {
    st.tabs
        .iter_mut()
        .find(|t| t.id == tab.sheet_id)
        .ok_or_else(|| SheetsError::TabNotFound(tab.title.clone()))
}

#[async_trait]
impl SpreadsheetGateway for InMemorySpreadsheet {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, SheetsError> {
        Ok(self.state().tabs.iter().map(Tab::info).collect())
    }

    async fn create_tab(
        &self,
        title: &str,
        rows: usize,
        cols: usize,
    ) -> Result<TabInfo, SheetsError> {
        let mut st = self.state();
        if st.tabs.iter().any(|t| t.title == title) {
            return Err(bad_request(format!(
                "A sheet with the name \"{}\" already exists.",
                title
            )));
        }
        if rows == 0 || cols == 0 {
            return Err(bad_request("grid must have at least one row and column"));
        }
        let id = st.next_id;
        st.next_id += 1;
        let mut tab = Tab {
            id,
            title: title.to_string(),
            frozen_rows: 0,
            cells: Vec::new(),
            cols: 0,
        };
        tab.resize(rows, cols);
        let info = tab.info();
        st.tabs.push(tab);
        Ok(info)
    }

    async fn resize_tab(
        &self,
        tab: &TabInfo,
        rows: usize,
        cols: usize,
    ) -> Result<TabInfo, SheetsError> {
        let mut st = self.state();
        let t = find(&mut st, tab)?;
        if rows == 0 || cols == 0 {
            return Err(bad_request("grid must have at least one row and column"));
        }
        if rows <= t.frozen_rows {
            return Err(bad_request("You can't freeze all visible rows on the sheet."));
        }
        t.resize(rows, cols);
        Ok(t.info())
    }

    async fn read_rows(&self, tab: &TabInfo) -> Result<Vec<Vec<String>>, SheetsError> {
        let mut st = self.state();
        let t = find(&mut st, tab)?;
        let mut rows: Vec<Vec<String>> = t
            .cells
            .iter()
            .map(|row| {
                let end = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
                row[..end].to_vec()
            })
            .collect();
        while rows.last().is_some_and(|r| r.is_empty()) {
            rows.pop();
        }
        Ok(rows)
    }

    async fn write_rows(&self, tab: &TabInfo, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        let mut st = self.state();
        let t = find(&mut st, tab)?;
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if rows.len() > t.cells.len() || width > t.cols {
            return Err(bad_request(format!(
                "Range ('{}'!A1) exceeds grid limits. Max rows: {}, max columns: {}",
                t.title,
                t.cells.len(),
                t.cols
            )));
        }
        for (dst, src) in t.cells.iter_mut().zip(rows) {
            for (cell, value) in dst.iter_mut().zip(src) {
                cell.clone_from(value);
            }
        }
        Ok(())
    }

    async fn clear_tab(&self, tab: &TabInfo) -> Result<(), SheetsError> {
        let mut st = self.state();
        let t = find(&mut st, tab)?;
        for row in &mut t.cells {
            row.iter_mut().for_each(String::clear);
        }
        Ok(())
    }

    async fn freeze_header(&self, tab: &TabInfo, rows: usize) -> Result<(), SheetsError> {
        let mut st = self.state();
        let t = find(&mut st, tab)?;
        if rows >= t.cells.len() {
            return Err(bad_request("You can't freeze all visible rows on the sheet."));
        }
        t.frozen_rows = rows;
        Ok(())
    }
}

/// Wraps an [`InMemorySpreadsheet`] and fails every read of one tab.
#[cfg(test)]
pub(crate) struct FailingReads {
    pub inner: InMemorySpreadsheet,
    pub tab: String,
}

#[cfg(test)]
#[async_trait]
impl SpreadsheetGateway for FailingReads {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, SheetsError> {
        self.inner.list_tabs().await
    }

    async fn create_tab(
        &self,
        title: &str,
        rows: usize,
        cols: usize,
    ) -> Result<TabInfo, SheetsError> {
        self.inner.create_tab(title, rows, cols).await
    }

    async fn resize_tab(
        &self,
        tab: &TabInfo,
        rows: usize,
        cols: usize,
    ) -> Result<TabInfo, SheetsError> {
        self.inner.resize_tab(tab, rows, cols).await
    }

    async fn read_rows(&self, tab: &TabInfo) -> Result<Vec<Vec<String>>, SheetsError> {
        if tab.title == self.tab {
            return Err(SheetsError::Api {
                status: 503,
                message: "The service is currently unavailable.".into(),
            });
        }
        self.inner.read_rows(tab).await
    }

    async fn write_rows(&self, tab: &TabInfo, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        self.inner.write_rows(tab, rows).await
    }

    async fn clear_tab(&self, tab: &TabInfo) -> Result<(), SheetsError> {
        self.inner.clear_tab(tab).await
    }

    async fn freeze_header(&self, tab: &TabInfo, rows: usize) -> Result<(), SheetsError> {
        self.inner.freeze_header(tab, rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let sheet = InMemorySpreadsheet::new();
        let tab = sheet.create_tab("2024-01-01", 3, 3).await.unwrap();
        let values = vec![row(&["a", "b", "c"]), row(&["1", "", "3"])];
        sheet.write_rows(&tab, &values).await.unwrap();
        assert_eq!(sheet.read_rows(&tab).await.unwrap(), values);
    }

    #[tokio::test]
    async fn writes_must_fit_the_grid() {
        let sheet = InMemorySpreadsheet::new();
        let tab = sheet.create_tab("t", 1, 2).await.unwrap();
        let err = sheet
            .write_rows(&tab, &[row(&["a", "b"]), row(&["c", "d"])])
            .await
            .unwrap_err();
        assert!(matches!(err, SheetsError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn clear_keeps_size_and_resize_truncates() {
        let sheet = InMemorySpreadsheet::new();
        let tab = sheet.create_tab("t", 4, 2).await.unwrap();
        sheet
            .write_rows(&tab, &[row(&["a", "b"]), row(&["c", "d"]), row(&["e", "f"])])
            .await
            .unwrap();
        let tab = sheet.resize_tab(&tab, 2, 1).await.unwrap();
        assert_eq!(sheet.read_rows(&tab).await.unwrap(), vec![row(&["a"]), row(&["c"])]);

        sheet.clear_tab(&tab).await.unwrap();
        assert!(sheet.read_rows(&tab).await.unwrap().is_empty());
        assert_eq!(sheet.get_tab("t").await.unwrap().row_count, 2);
    }

    #[tokio::test]
    async fn duplicate_titles_and_full_freeze_rejected() {
        let sheet = InMemorySpreadsheet::new();
        let tab = sheet.create_tab("t", 1, 1).await.unwrap();
        assert!(sheet.create_tab("t", 1, 1).await.is_err());
        assert!(sheet.freeze_header(&tab, 1).await.is_err());
        let tab = sheet.resize_tab(&tab, 2, 1).await.unwrap();
        sheet.freeze_header(&tab, 1).await.unwrap();
        assert_eq!(sheet.frozen_rows("t"), Some(1));
        assert!(matches!(
            sheet.get_tab("missing").await,
            Err(SheetsError::TabNotFound(_))
        ));
    }
}
