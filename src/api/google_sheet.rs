//! Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet.
//!
//! Cell values go through the `sheets` crate. Worksheet management and cell formatting use the
//! spreadsheets `batchUpdate` REST endpoint directly with an authenticated `reqwest` client, since
//! the values API does not cover them.

use crate::api::{CellRect, FormatOp, Sheet, SheetRange, TokenProvider};
use crate::{Config, Result};
use anyhow::Context;
use serde_json::{json, Value};
use sheets::types::{
    BatchClearValuesRequest, BatchUpdateValuesRequest, DateTimeRenderOption, Dimension,
    ValueInputOption, ValueRange, ValueRenderOption,
};
use sheets::ClientError;
use tracing::trace;

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet. It
/// takes a `TokenProvider`, on which it calls refresh to keep the token up-to-date.
pub(super) struct GoogleSheet {
    config: Config,
    token_provider: TokenProvider,
    client: sheets::Client,
    http: reqwest::Client,
}

impl GoogleSheet {
    pub(super) async fn new(config: Config, mut token_provider: TokenProvider) -> Result<Self> {
        let client = create_sheets_client(&mut token_provider).await?;
        Ok(Self {
            config,
            token_provider,
            client,
            http: reqwest::Client::new(),
        })
    }

    /// Refreshes the sheets client with a new access token if needed
    async fn refresh_client(&mut self) -> Result<()> {
        self.client = create_sheets_client(&mut self.token_provider).await?;
        Ok(())
    }

    /// Sends a spreadsheets `batchUpdate` request (worksheet management, formatting).
    async fn batch_update(&mut self, requests: Vec<Value>) -> Result<Value> {
        let token = self.token_provider.token_with_refresh().await?.to_string();
        let url = format!(
            "{SHEETS_API_URL}/{}:batchUpdate",
            self.config.spreadsheet_id()
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .context("Failed to send the spreadsheet batchUpdate request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Spreadsheet batchUpdate failed with status {status}: {body}");
        }
        response
            .json()
            .await
            .context("Failed to parse the batchUpdate response")
    }

    /// Fetches worksheet titles and numeric IDs for the spreadsheet.
    async fn worksheet_ids(&mut self) -> Result<Vec<(String, i64)>> {
        let token = self.token_provider.token_with_refresh().await?.to_string();
        let url = format!(
            "{SHEETS_API_URL}/{}?fields=sheets.properties",
            self.config.spreadsheet_id()
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to fetch spreadsheet metadata")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Spreadsheet metadata request failed with status {status}: {body}");
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse spreadsheet metadata")?;
        let mut result = Vec::new();
        if let Some(worksheets) = body.get("sheets").and_then(|v| v.as_array()) {
            for ws in worksheets {
                let properties = ws.get("properties");
                let title = properties
                    .and_then(|p| p.get("title"))
                    .and_then(|v| v.as_str());
                let id = properties
                    .and_then(|p| p.get("sheetId"))
                    .and_then(|v| v.as_i64());
                if let (Some(title), Some(id)) = (title, id) {
                    result.push((title.to_string(), id));
                }
            }
        }
        Ok(result)
    }
}

#[async_trait::async_trait]
impl Sheet for GoogleSheet {
    async fn get(&mut self, worksheet: &str) -> Result<Vec<Vec<String>>> {
        trace!("get for {worksheet}");
        self.refresh_client().await?;
        let range = format!("{worksheet}!A:ZZ"); // Get all columns
        let response = self
            .client
            .spreadsheets()
            .values_get(
                self.config.spreadsheet_id(),
                &range,
                DateTimeRenderOption::FormattedString,
                Dimension::Rows,
                ValueRenderOption::FormattedValue,
            )
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to fetch {worksheet} sheet data"))?;
        Ok(response.body.values)
    }

    async fn append_rows(&mut self, worksheet: &str, rows: &[Vec<String>]) -> Result<()> {
        trace!("append_rows for {worksheet}");
        // The next free row is one past the currently populated extent.
        let populated = self.get(worksheet).await?.len();
        let range = SheetRange {
            range: format!("{worksheet}!A{}", populated + 1),
            values: rows.to_vec(),
        };
        self.write_ranges(&[range]).await
    }

    async fn clear_ranges(&mut self, ranges: &[&str]) -> Result<()> {
        self.refresh_client().await?;
        let request = BatchClearValuesRequest {
            ranges: ranges.iter().map(|s| s.to_string()).collect(),
        };
        self.client
            .spreadsheets()
            .values_batch_clear(self.config.spreadsheet_id(), &request)
            .await
            .map_err(map_client_error)
            .with_context(|| format!("Failed to clear ranges: {:?}", ranges))?;
        Ok(())
    }

    async fn write_ranges(&mut self, data: &[SheetRange]) -> Result<()> {
        self.refresh_client().await?;
        let value_ranges: Vec<ValueRange> = data
            .iter()
            .map(|sr| ValueRange {
                major_dimension: Some(Dimension::Rows),
                range: sr.range.clone(),
                values: sr.values.clone(),
            })
            .collect();

        let request = BatchUpdateValuesRequest {
            data: value_ranges,
            include_values_in_response: Some(false),
            response_date_time_render_option: None,
            response_value_render_option: None,
            value_input_option: Some(ValueInputOption::UserEntered),
        };

        self.client
            .spreadsheets()
            .values_batch_update(self.config.spreadsheet_id(), &request)
            .await
            .map_err(map_client_error)
            .with_context(|| "Failed to write ranges")?;
        Ok(())
    }

    async fn ensure_worksheet(&mut self, title: &str) -> Result<i64> {
        if let Some((_, id)) = self
            .worksheet_ids()
            .await?
            .into_iter()
            .find(|(t, _)| t == title)
        {
            return Ok(id);
        }

        trace!("creating worksheet {title}");
        let response = self
            .batch_update(vec![json!({
                "addSheet": { "properties": { "title": title } }
            })])
            .await?;
        response
            .pointer("/replies/0/addSheet/properties/sheetId")
            .and_then(|v| v.as_i64())
            .with_context(|| format!("The addSheet reply for '{title}' had no sheetId"))
    }

    async fn format(&mut self, worksheet_id: i64, ops: &[FormatOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let requests = ops
            .iter()
            .map(|op| format_request(worksheet_id, op))
            .collect();
        self.batch_update(requests).await?;
        Ok(())
    }
}

/// Translates one formatting operation into a spreadsheets `batchUpdate` request.
fn format_request(worksheet_id: i64, op: &FormatOp) -> Value {
    match op {
        FormatOp::Merge(rect) => json!({
            "mergeCells": {
                "range": grid_range(worksheet_id, rect),
                "mergeType": "MERGE_ALL"
            }
        }),
        FormatOp::Title(rect) => json!({
            "repeatCell": {
                "range": grid_range(worksheet_id, rect),
                "cell": { "userEnteredFormat": {
                    "textFormat": { "bold": true, "fontSize": 14 },
                    "horizontalAlignment": "CENTER",
                    "verticalAlignment": "MIDDLE"
                }},
                "fields": "userEnteredFormat(textFormat,horizontalAlignment,verticalAlignment)"
            }
        }),
        FormatOp::Subtitle(rect) => json!({
            "repeatCell": {
                "range": grid_range(worksheet_id, rect),
                "cell": { "userEnteredFormat": {
                    "textFormat": { "bold": true, "fontSize": 12 },
                    "horizontalAlignment": "LEFT",
                    "verticalAlignment": "MIDDLE"
                }},
                "fields": "userEnteredFormat(textFormat,horizontalAlignment,verticalAlignment)"
            }
        }),
        FormatOp::Header(rect) => json!({
            "repeatCell": {
                "range": grid_range(worksheet_id, rect),
                "cell": { "userEnteredFormat": {
                    "backgroundColor": { "red": 0.2, "green": 0.4, "blue": 0.5 },
                    "textFormat": {
                        "bold": true,
                        "foregroundColor": { "red": 1.0, "green": 1.0, "blue": 1.0 }
                    },
                    "horizontalAlignment": "CENTER",
                    "verticalAlignment": "MIDDLE"
                }},
                "fields": "userEnteredFormat(backgroundColor,textFormat,horizontalAlignment,verticalAlignment)"
            }
        }),
        FormatOp::Currency(rect) => json!({
            "repeatCell": {
                "range": grid_range(worksheet_id, rect),
                "cell": { "userEnteredFormat": {
                    "numberFormat": { "type": "CURRENCY", "pattern": "€#,##0.00" },
                    "horizontalAlignment": "RIGHT"
                }},
                "fields": "userEnteredFormat(numberFormat,horizontalAlignment)"
            }
        }),
        FormatOp::ColumnWidth { col, pixels } => json!({
            "updateDimensionProperties": {
                "range": {
                    "sheetId": worksheet_id,
                    "dimension": "COLUMNS",
                    "startIndex": col,
                    "endIndex": col + 1
                },
                "properties": { "pixelSize": pixels },
                "fields": "pixelSize"
            }
        }),
    }
}

fn grid_range(worksheet_id: i64, rect: &CellRect) -> Value {
    json!({
        "sheetId": worksheet_id,
        "startRowIndex": rect.start_row,
        "endRowIndex": rect.end_row,
        "startColumnIndex": rect.start_col,
        "endColumnIndex": rect.end_col
    })
}

/// Creates a new sheets client with a refreshed access token.
async fn create_sheets_client(token_provider: &mut TokenProvider) -> Result<sheets::Client> {
    // Get the access token (will refresh if needed)
    let access_token = token_provider.token_with_refresh().await?;

    // Create sheets client
    // Note: The sheets crate requires client_id, client_secret, and redirect_uri,
    // but we don't need them for API calls, only the access token
    Ok(sheets::Client::new(
        String::new(), // client_id (not needed for API calls with access token)
        String::new(), // client_secret (not needed for API calls with access token)
        String::new(), // redirect_uri (not needed for API calls with access token)
        access_token.to_string(),
        String::new(), // refresh_token (not needed, we handle refresh ourselves)
    ))
}

fn map_client_error(e: sheets::ClientError) -> anyhow::Error {
    let error_name = match &e {
        ClientError::EmptyRefreshToken => "EmptyRefreshToken".to_string(),
        ClientError::FromUtf8Error(inner) => format!("FromUtf8Error {inner}"),
        ClientError::UrlParserError(inner) => format!("UrlParserError {inner}"),
        ClientError::SerdeJsonError(inner) => format!("SerdeJsonError {inner}"),
        ClientError::ReqwestError(inner) => format!("ReqwestError {inner}"),
        ClientError::InvalidHeaderValue(inner) => format!("InvalidHeaderValue {inner}"),
        ClientError::ReqwestMiddleWareError(inner) => format!("ReqwestMiddleWareError {inner}"),
        ClientError::HttpError { .. } => "HttpError".to_string(),
    };
    Err::<(), ClientError>(e).context(error_name).err().unwrap()
}
