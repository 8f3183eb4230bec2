//! Implements the `Sheet` and `Drive` traits using in-memory data for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the
//! whole app, top-to-bottom, without using the Google APIs.

use crate::api::{Drive, DriveFile, FormatOp, Sheet, SheetRange, EXPENSES};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Cursor;

/// An implementation of the `Sheet` trait that does not use Google sheets. It can hold any data in
/// memory and, by default, is seeded with some existing expense data.
pub(crate) struct TestSheet {
    pub(crate) data: HashMap<String, Vec<Vec<String>>>,
    /// Every formatting op that was applied, with the worksheet ID it targeted.
    pub(crate) formatted: Vec<(i64, FormatOp)>,
    worksheet_ids: HashMap<String, i64>,
}

impl TestSheet {
    /// Create a new `TestSheet` using `data`. The map key is a worksheet name and the map value is
    /// the rows of the worksheet.
    pub(crate) fn new(data: HashMap<String, Vec<Vec<String>>>) -> Self {
        let worksheet_ids = data
            .keys()
            .enumerate()
            .map(|(ix, title)| (title.clone(), ix as i64))
            .collect();
        Self {
            data,
            formatted: Vec::new(),
            worksheet_ids,
        }
    }

    /// Create a `TestSheet` with no worksheets at all.
    pub(crate) fn empty() -> Self {
        Self::new(HashMap::new())
    }
}

impl Default for TestSheet {
    /// Loads seed data from this module.
    fn default() -> Self {
        Self::new(default_data())
    }
}

#[async_trait::async_trait]
impl Sheet for TestSheet {
    async fn get(&mut self, worksheet: &str) -> Result<Vec<Vec<String>>> {
        self.data
            .get(worksheet)
            .with_context(|| format!("Worksheet '{worksheet}' not found"))
            .cloned()
    }

    async fn append_rows(&mut self, worksheet: &str, rows: &[Vec<String>]) -> Result<()> {
        let sheet = self
            .data
            .get_mut(worksheet)
            .with_context(|| format!("Worksheet '{worksheet}' not found"))?;
        sheet.extend(rows.iter().cloned());
        Ok(())
    }

    async fn clear_ranges(&mut self, ranges: &[&str]) -> Result<()> {
        // The double only models whole-tab clears; a range like `Dashboard!A1:Z100` clears the
        // named tab.
        for range in ranges {
            let worksheet = range.split('!').next().unwrap_or(range);
            if let Some(rows) = self.data.get_mut(worksheet) {
                rows.clear();
            }
        }
        Ok(())
    }

    async fn write_ranges(&mut self, data: &[SheetRange]) -> Result<()> {
        for block in data {
            let (worksheet, start_row, start_col) = parse_a1_start(&block.range)?;
            let rows = self
                .data
                .entry(worksheet)
                .or_default();
            for (row_offset, values) in block.values.iter().enumerate() {
                let row_ix = start_row + row_offset;
                while rows.len() <= row_ix {
                    rows.push(Vec::new());
                }
                let row = &mut rows[row_ix];
                for (col_offset, value) in values.iter().enumerate() {
                    let col_ix = start_col + col_offset;
                    while row.len() <= col_ix {
                        row.push(String::new());
                    }
                    row[col_ix] = value.clone();
                }
            }
        }
        Ok(())
    }

    async fn ensure_worksheet(&mut self, title: &str) -> Result<i64> {
        if let Some(id) = self.worksheet_ids.get(title) {
            return Ok(*id);
        }
        let id = self.worksheet_ids.len() as i64;
        self.worksheet_ids.insert(title.to_string(), id);
        self.data.entry(title.to_string()).or_default();
        Ok(id)
    }

    async fn format(&mut self, worksheet_id: i64, ops: &[FormatOp]) -> Result<()> {
        self.formatted
            .extend(ops.iter().map(|op| (worksheet_id, *op)));
        Ok(())
    }
}

/// Parses the first cell of an A1-notation range like `Dashboard!B5` or `Dashboard!A1:C3`.
/// Returns the worksheet name and zero-based (row, column).
fn parse_a1_start(range: &str) -> Result<(String, usize, usize)> {
    let (worksheet, cells) = range
        .split_once('!')
        .with_context(|| format!("Range '{range}' has no worksheet name"))?;
    let first_cell = cells.split(':').next().unwrap_or(cells);

    let mut col = 0usize;
    let mut row_digits = String::new();
    for c in first_cell.chars() {
        if c.is_ascii_alphabetic() {
            col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
        } else {
            row_digits.push(c);
        }
    }
    let row: usize = row_digits
        .parse()
        .with_context(|| format!("Range '{range}' has no row number"))?;
    if col == 0 || row == 0 {
        anyhow::bail!("Range '{range}' is not valid A1 notation");
    }
    Ok((worksheet.to_string(), row - 1, col - 1))
}

/// Provides the seed data for the default `TestSheet`.
fn default_data() -> HashMap<String, Vec<Vec<String>>> {
    let mut map = HashMap::new();
    let expenses = load_csv(EXPENSE_DATA).unwrap();
    map.insert(EXPENSES.to_string(), expenses);
    map
}

/// Loads data from a CSV-formatted string.
fn load_csv(csv_data: &str) -> Result<Vec<Vec<String>>> {
    let bytes = csv_data.as_bytes();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false) // Ensure headers are treated as part of the data
        .from_reader(Cursor::new(bytes));

    let mut rows: Vec<Vec<String>> = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let row: Vec<String> = record.iter().map(|field| field.to_string()).collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Seed expense data.
const EXPENSE_DATA: &str = r##"Date,Merchant,Description,Amount,Category,Payment Method,Source File,Processed At
2026-01-05,Mercadona,Weekly groceries,€54.20,Groceries,Card,receipt-0105.jpg,2026-01-05 18:30:01
2026-01-12,Renfe,Train to Valencia,€23.40,Transport,Card,receipt-0112.jpg,2026-01-12 09:12:44
2026-01-28,Farmacia Central,Cold medicine,€11.95,Health,Cash,receipt-0128.jpg,2026-01-28 17:05:12
2026-02-02,Mercadona,Weekly groceries,€61.75,Groceries,Card,receipt-0202.jpg,2026-02-02 19:01:33
2026-02-14,La Trattoria,Dinner for two,€48.00,Dining,Card,receipt-0214.jpg,2026-02-14 22:40:09
2026-02-20,Iberdrola,Electricity bill,€87.60,Housing,Direct Debit,receipt-0220.jpg,2026-02-20 08:15:27
"##;

/// An implementation of the `Drive` trait that serves seeded files from memory.
#[derive(Debug, Clone)]
pub(crate) struct TestDrive {
    /// The files "in the inbox folder", with their content.
    pub(crate) files: Vec<(DriveFile, Vec<u8>)>,
    /// Names of files already present in the archive folder.
    pub(crate) archive: Vec<String>,
    /// Records each (file_id, folder_id) copy that was requested.
    pub(crate) copies: Vec<(String, String)>,
}

impl TestDrive {
    pub(crate) fn new(files: Vec<(DriveFile, Vec<u8>)>, archive: Vec<String>) -> Self {
        Self {
            files,
            archive,
            copies: Vec::new(),
        }
    }
}

impl Default for TestDrive {
    fn default() -> Self {
        let file = |id: &str, name: &str| DriveFile {
            id: id.to_string(),
            name: name.to_string(),
            created_time: None,
            modified_time: None,
        };
        Self::new(
            vec![
                (file("drive-001", "receipt-0301.jpg"), b"jpeg-bytes-1".to_vec()),
                (file("drive-002", "receipt-0303.jpg"), b"jpeg-bytes-2".to_vec()),
            ],
            Vec::new(),
        )
    }
}

#[async_trait::async_trait]
impl Drive for TestDrive {
    async fn list_recent_images(
        &mut self,
        _folder_id: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<DriveFile>> {
        // The double does not model folders or timestamps; everything seeded is "recent".
        Ok(self.files.iter().map(|(meta, _)| meta.clone()).collect())
    }

    async fn download(&mut self, file_id: &str) -> Result<Vec<u8>> {
        self.files
            .iter()
            .find(|(meta, _)| meta.id == file_id)
            .map(|(_, bytes)| bytes.clone())
            .with_context(|| format!("Drive file '{file_id}' not found"))
    }

    async fn copy_to_folder(&mut self, file_id: &str, folder_id: &str) -> Result<String> {
        self.copies.push((file_id.to_string(), folder_id.to_string()));
        if let Some((meta, _)) = self.files.iter().find(|(meta, _)| meta.id == file_id) {
            self.archive.push(meta.name.clone());
        }
        Ok(format!("copy-of-{file_id}"))
    }

    async fn exists_in_folder(&mut self, name: &str, _folder_id: &str) -> Result<bool> {
        Ok(self.archive.iter().any(|n| n == name))
    }
}
