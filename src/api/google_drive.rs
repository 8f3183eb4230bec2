//! Implements the `Drive` trait against the Google Drive v3 REST API with an authenticated
//! `reqwest` client.

use crate::api::{Drive, DriveFile, TokenProvider};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

/// The timestamp format the Drive query language expects.
const DRIVE_QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub(super) struct GoogleDrive {
    token_provider: TokenProvider,
    client: reqwest::Client,
}

impl GoogleDrive {
    pub(super) fn new(token_provider: TokenProvider) -> Result<Self> {
        Ok(Self {
            token_provider,
            client: reqwest::Client::new(),
        })
    }

    async fn bearer(&mut self) -> Result<String> {
        Ok(self.token_provider.token_with_refresh().await?.to_string())
    }

    /// Runs a files.list query and returns the `files` array.
    async fn list(&mut self, query: &str, fields: &str, order_by: Option<&str>) -> Result<Value> {
        let token = self.bearer().await?;
        let mut params = vec![("q", query.to_string()), ("fields", fields.to_string())];
        if let Some(order) = order_by {
            params.push(("orderBy", order.to_string()));
        }
        let response = self
            .client
            .get(DRIVE_FILES_URL)
            .bearer_auth(token)
            .query(&params)
            .send()
            .await
            .context("Failed to send the Drive file listing request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Drive file listing failed with status {status}: {body}");
        }
        let body: Value = response
            .json()
            .await
            .context("Failed to parse the Drive file listing response")?;
        Ok(body.get("files").cloned().unwrap_or_else(|| json!([])))
    }
}

#[async_trait::async_trait]
impl Drive for GoogleDrive {
    async fn list_recent_images(
        &mut self,
        folder_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DriveFile>> {
        let threshold = since.format(DRIVE_QUERY_TIME_FORMAT);
        let query = format!(
            "'{folder_id}' in parents and mimeType contains 'image/' \
            and (createdTime > '{threshold}' or modifiedTime > '{threshold}') \
            and trashed = false"
        );
        trace!("drive query: {query}");
        let files = self
            .list(
                &query,
                "files(id, name, createdTime, modifiedTime)",
                Some("createdTime desc"),
            )
            .await?;

        let listed: Vec<ListedFile> = serde_json::from_value(files)
            .context("The Drive file listing had an unexpected shape")?;
        Ok(listed.into_iter().map(ListedFile::into_drive_file).collect())
    }

    async fn download(&mut self, file_id: &str) -> Result<Vec<u8>> {
        let token = self.bearer().await?;
        let url = format!("{DRIVE_FILES_URL}/{file_id}?alt=media");
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to download Drive file {file_id}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Drive download of {file_id} failed with status {status}: {body}");
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read the content of Drive file {file_id}"))?;
        Ok(bytes.to_vec())
    }

    async fn copy_to_folder(&mut self, file_id: &str, folder_id: &str) -> Result<String> {
        // Fetch the original name so the copy is not called "Copy of ...".
        let token = self.bearer().await?;
        let metadata_url = format!("{DRIVE_FILES_URL}/{file_id}?fields=name");
        let metadata: Value = self
            .client
            .get(&metadata_url)
            .bearer_auth(&token)
            .send()
            .await
            .with_context(|| format!("Failed to fetch metadata for Drive file {file_id}"))?
            .json()
            .await
            .context("Failed to parse Drive file metadata")?;
        let name = metadata
            .get("name")
            .and_then(|v| v.as_str())
            .with_context(|| format!("Drive file {file_id} metadata had no name"))?;

        trace!("copying {file_id} ('{name}') to folder {folder_id}");
        let copy_url = format!("{DRIVE_FILES_URL}/{file_id}/copy?supportsAllDrives=true");
        let response = self
            .client
            .post(&copy_url)
            .bearer_auth(&token)
            .json(&json!({
                "name": name,
                "parents": [folder_id]
            }))
            .send()
            .await
            .with_context(|| format!("Failed to send the copy request for Drive file {file_id}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Drive copy of {file_id} failed with status {status}: {body}");
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse the Drive copy response")?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .context("The Drive copy response had no 'id' field")
    }

    async fn exists_in_folder(&mut self, name: &str, folder_id: &str) -> Result<bool> {
        let query = format!(
            "name = '{}' and '{folder_id}' in parents and trashed = false",
            escape_query_value(name)
        );
        let files = self.list(&query, "files(id)", None).await?;
        Ok(files.as_array().map(|a| !a.is_empty()).unwrap_or(false))
    }
}

/// One entry of a files.list response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedFile {
    id: String,
    name: String,
    created_time: Option<DateTime<Utc>>,
    modified_time: Option<DateTime<Utc>>,
}

impl ListedFile {
    fn into_drive_file(self) -> DriveFile {
        DriveFile {
            id: self.id,
            name: self.name,
            created_time: self.created_time,
            modified_time: self.modified_time,
        }
    }
}

/// Escapes a string literal for the Drive query language. Single quotes and backslashes must be
/// backslash-escaped.
fn escape_query_value(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query_value() {
        assert_eq!(escape_query_value("plain.jpg"), "plain.jpg");
        assert_eq!(escape_query_value("o'brien.jpg"), "o\\'brien.jpg");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_listed_file_parses() {
        let json = r#"[{
            "id": "abc",
            "name": "receipt.jpg",
            "createdTime": "2026-03-01T10:00:00Z",
            "modifiedTime": "2026-03-02T10:00:00Z"
        }]"#;
        let listed: Vec<ListedFile> = serde_json::from_str(json).unwrap();
        let file = listed[0].clone().into_drive_file();
        assert_eq!(file.id, "abc");
        assert_eq!(file.name, "receipt.jpg");
        assert!(file.created_time.is_some());
    }
}
