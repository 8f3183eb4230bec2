//! Clients for the Google Sheets and Drive APIs, plus in-memory test doubles.
//!
//! The `Sheet` and `Drive` traits are the seams between the pipeline and Google. Each has a real
//! implementation backed by OAuth-authenticated HTTP calls and a test implementation backed by
//! in-memory data, selected by [`Mode`].

mod files;
mod google_drive;
mod google_sheet;
mod oauth;
mod test_client;

use crate::{Config, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(crate) use oauth::TokenProvider;
pub(crate) use test_client::{TestDrive, TestSheet};

/// The worksheet holding expense records.
pub(crate) const EXPENSES: &str = "Expenses";

/// The worksheet holding the rendered dashboard.
pub(crate) const DASHBOARD: &str = "Dashboard";

// OAuth scopes required for API access. The full drive scope is needed because the pipeline
// lists, downloads, and copies receipt images in arbitrary folders.
const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

/// The environment variable that switches the app into test mode.
const TEST_MODE_VAR: &str = "RECEIPT_SYNC_IN_TEST_MODE";

/// Selects between the real Google clients and the in-memory test doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Google,
    Test,
}

impl Mode {
    /// Reads the mode from the environment: `Test` when `RECEIPT_SYNC_IN_TEST_MODE` is set and
    /// non-empty, `Google` otherwise.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_VAR) {
            Ok(value) if !value.is_empty() => Mode::Test,
            _ => Mode::Google,
        }
    }
}

/// A contiguous block of cells and the values to write there. The `range` is in A1 notation and
/// includes the worksheet name, e.g. `Dashboard!A5`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) struct SheetRange {
    pub(crate) range: String,
    pub(crate) values: Vec<Vec<String>>,
}

/// A rectangle of cells in zero-based, half-open coordinates.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub(crate) struct CellRect {
    pub(crate) start_row: usize,
    pub(crate) end_row: usize,
    pub(crate) start_col: usize,
    pub(crate) end_col: usize,
}

impl CellRect {
    pub(crate) fn new(start_row: usize, end_row: usize, start_col: usize, end_col: usize) -> Self {
        Self {
            start_row,
            end_row,
            start_col,
            end_col,
        }
    }
}

/// A formatting operation to apply to a worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FormatOp {
    /// Merge the cells of the rectangle into one.
    Merge(CellRect),
    /// Large bold centered text for the dashboard title.
    Title(CellRect),
    /// Bold left-aligned text for section subtitles.
    Subtitle(CellRect),
    /// Dark fill with bold white centered text for table headers.
    Header(CellRect),
    /// Euro currency number format, right aligned.
    Currency(CellRect),
    /// Set a column's width in pixels.
    ColumnWidth { col: usize, pixels: i64 },
}

/// Metadata for a file found in a Drive folder.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct DriveFile {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) created_time: Option<DateTime<Utc>>,
    pub(crate) modified_time: Option<DateTime<Utc>>,
}

/// Spreadsheet operations used by the pipeline and the dashboard renderer.
#[async_trait::async_trait]
pub(crate) trait Sheet {
    /// Returns all values of the named worksheet, header row included.
    async fn get(&mut self, worksheet: &str) -> Result<Vec<Vec<String>>>;

    /// Appends rows after the last populated row of the named worksheet.
    async fn append_rows(&mut self, worksheet: &str, rows: &[Vec<String>]) -> Result<()>;

    /// Clears the given ranges (A1 notation; a bare worksheet name clears the whole tab).
    async fn clear_ranges(&mut self, ranges: &[&str]) -> Result<()>;

    /// Writes the given blocks of values.
    async fn write_ranges(&mut self, data: &[SheetRange]) -> Result<()>;

    /// Returns the numeric worksheet ID for `title`, creating the worksheet if necessary.
    async fn ensure_worksheet(&mut self, title: &str) -> Result<i64>;

    /// Applies formatting operations to the worksheet with the given numeric ID.
    async fn format(&mut self, worksheet_id: i64, ops: &[FormatOp]) -> Result<()>;
}

/// Drive operations used by the ingest pipeline.
#[async_trait::async_trait]
pub(crate) trait Drive {
    /// Lists image files in `folder_id` created or modified after `since`, newest first.
    async fn list_recent_images(
        &mut self,
        folder_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DriveFile>>;

    /// Downloads the content of a file.
    async fn download(&mut self, file_id: &str) -> Result<Vec<u8>>;

    /// Copies a file into `folder_id`, keeping its name. Returns the new file's ID.
    async fn copy_to_folder(&mut self, file_id: &str, folder_id: &str) -> Result<String>;

    /// Returns true when a file with the given name exists in `folder_id`.
    async fn exists_in_folder(&mut self, name: &str, folder_id: &str) -> Result<bool>;
}

/// Creates a `Sheet` implementation for the given mode.
pub(crate) async fn sheet(config: &Config, mode: Mode) -> Result<Box<dyn Sheet + Send>> {
    match mode {
        Mode::Google => {
            let token_provider =
                TokenProvider::load(config.client_secret_path(), config.token_path()).await?;
            Ok(Box::new(
                google_sheet::GoogleSheet::new(config.clone(), token_provider).await?,
            ))
        }
        Mode::Test => Ok(Box::new(TestSheet::default())),
    }
}

/// Creates a `Drive` implementation for the given mode.
pub(crate) async fn drive(config: &Config, mode: Mode) -> Result<Box<dyn Drive + Send>> {
    match mode {
        Mode::Google => {
            let token_provider =
                TokenProvider::load(config.client_secret_path(), config.token_path()).await?;
            Ok(Box::new(google_drive::GoogleDrive::new(token_provider)?))
        }
        Mode::Test => Ok(Box::new(TestDrive::default())),
    }
}
