//! Google Sheets API v4 over `reqwest`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

use super::{
    auth::{ServiceAccountAuth, ServiceAccountKey},
    SheetsError, SpreadsheetGateway, TabInfo,
};
use crate::{config::SheetsConfig, error::ConfigError};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

pub struct GoogleSheets {
    spreadsheet_id: String,
    base: Url,
    http: Client,
    auth: ServiceAccountAuth,
}

impl GoogleSheets {
    /// Load the service account key and bind to the configured spreadsheet.
    /// No request is sent until the first operation.
    pub fn connect(cfg: &SheetsConfig) -> Result<Self, ConfigError> {
        let key = ServiceAccountKey::from_file(&cfg.credentials_file)?;
        let http = Client::new();
        let base = Url::parse(API_BASE)
            .and_then(|u| u.join(&format!("{}/", cfg.spreadsheet_id)))
            .map_err(|e| ConfigError::Invalid {
                var: "GSHEET_URL",
                reason: e.to_string(),
            })?;
        Ok(Self {
            spreadsheet_id: cfg.spreadsheet_id.clone(),
            base,
            auth: ServiceAccountAuth::new(key, http.clone()),
            http,
        })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// `<base>` with extra path segments, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `<base>:batchUpdate`; the custom method is part of the id segment.
    fn batch_update_url(&self) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .pop()
                .push(&format!("{}:batchUpdate", self.spreadsheet_id));
        }
        url
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, SheetsError> {
        let token = self.auth.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn batch_update(&self, requests: Vec<Value>) -> Result<Value, SheetsError> {
        let resp = self
            .request(Method::POST, self.batch_update_url())
            .await?
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

/// Turn a non-success response into [`SheetsError::Api`].
async fn check(resp: Response) -> Result<Response, SheetsError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SheetsError::Api {
        status: status.as_u16(),
        message: api_error_message(&body),
    })
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// `'<title>'!<cells>` with quotes in the title doubled.
pub fn a1_range(title: &str, cells: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), cells)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
}

impl From<SheetProperties> for TabInfo {
    fn from(p: SheetProperties) -> Self {
        TabInfo {
            sheet_id: p.sheet_id,
            title: p.title,
            row_count: p.grid_properties.row_count,
            column_count: p.grid_properties.column_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn cell_to_string(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_tabs(meta: SpreadsheetMeta) -> Vec<TabInfo> {
    meta.sheets.into_iter().map(|s| s.properties.into()).collect()
}

fn parse_added_tab(reply: &Value) -> Result<TabInfo, SheetsError> {
    let props = reply["replies"][0]["addSheet"]["properties"].clone();
    if props.is_null() {
        return Err(SheetsError::Unexpected("addSheet reply without properties".into()));
    }
    let props: SheetProperties = serde_json::from_value(props)?;
    Ok(props.into())
}

#[async_trait]
impl SpreadsheetGateway for GoogleSheets {
    #[instrument(level = "debug", skip(self), fields(spreadsheet = %self.spreadsheet_id))]
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, SheetsError> {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let resp = self.request(Method::GET, url).await?.send().await?;
        let meta: SpreadsheetMeta = check(resp).await?.json().await?;
        Ok(parse_tabs(meta))
    }

    #[instrument(level = "debug", skip(self), fields(spreadsheet = %self.spreadsheet_id))]
    async fn create_tab(
        &self,
        title: &str,
        rows: usize,
        cols: usize,
    ) -> Result<TabInfo, SheetsError> {
        let reply = self
            .batch_update(vec![json!({
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols }
                    }
                }
            })])
            .await?;
        parse_added_tab(&reply)
    }

    #[instrument(level = "debug", skip(self, tab), fields(spreadsheet = %self.spreadsheet_id, tab = %tab.title))]
    async fn resize_tab(
        &self,
        tab: &TabInfo,
        rows: usize,
        cols: usize,
    ) -> Result<TabInfo, SheetsError> {
        self.batch_update(vec![json!({
            "updateSheetProperties": {
                "properties": {
                    "sheetId": tab.sheet_id,
                    "gridProperties": { "rowCount": rows, "columnCount": cols }
                },
                "fields": "gridProperties.rowCount,gridProperties.columnCount"
            }
        })])
        .await?;
        Ok(TabInfo {
            row_count: rows,
            column_count: cols,
            ..tab.clone()
        })
    }

    #[instrument(level = "debug", skip(self, tab), fields(spreadsheet = %self.spreadsheet_id, tab = %tab.title))]
    async fn read_rows(&self, tab: &TabInfo) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = self.url(&["values", &a1_range(&tab.title, "A1:ZZ")]);
        let resp = self.request(Method::GET, url).await?.send().await?;
        let range: ValueRange = check(resp).await?.json().await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    #[instrument(level = "debug", skip(self, tab, rows), fields(spreadsheet = %self.spreadsheet_id, tab = %tab.title, rows = rows.len()))]
    async fn write_rows(&self, tab: &TabInfo, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        let range = a1_range(&tab.title, "A1");
        let mut url = self.url(&["values", &range]);
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let resp = self
            .request(Method::PUT, url)
            .await?
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": rows }))
            .send()
            .await?;
        let body: Value = check(resp).await?.json().await?;
        debug!(updated = %body["updatedCells"], "values written");
        Ok(())
    }

    #[instrument(level = "debug", skip(self, tab), fields(spreadsheet = %self.spreadsheet_id, tab = %tab.title))]
    async fn clear_tab(&self, tab: &TabInfo) -> Result<(), SheetsError> {
        let clear = format!("{}:clear", a1_range(&tab.title, "A1:ZZ"));
        let url = self.url(&["values", &clear]);
        let resp = self
            .request(Method::POST, url)
            .await?
            .json(&json!({}))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, tab), fields(spreadsheet = %self.spreadsheet_id, tab = %tab.title))]
    async fn freeze_header(&self, tab: &TabInfo, rows: usize) -> Result<(), SheetsError> {
        self.batch_update(vec![json!({
            "updateSheetProperties": {
                "properties": {
                    "sheetId": tab.sheet_id,
                    "gridProperties": { "frozenRowCount": rows }
                },
                "fields": "gridProperties.frozenRowCount"
            }
        })])
        .await?;
        Ok(())
    }
}
