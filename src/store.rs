//! The local CSV ledger, the second of the two stores every expense is written to.
//!
//! The file lives at `$RECEIPTS_HOME/ledger.csv` and mirrors the Expenses worksheet columns. It is
//! append-only; the header is written when the file is first created.

use crate::model::{Expense, LEDGER_HEADER, SOURCE_FILE_STR};
use crate::Result;
use anyhow::Context;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub(crate) struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true when a record for `file_name` is already present in the Source File column.
    /// A ledger that does not exist yet has no records.
    pub(crate) fn is_processed(&self, file_name: &str) -> Result<bool> {
        if !self.path.is_file() {
            return Ok(false);
        }
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Unable to open the ledger at {}", self.path.display()))?;
        let headers = reader
            .headers()
            .context("Unable to read the ledger header")?
            .clone();
        let source_col = match headers.iter().position(|h| h == SOURCE_FILE_STR) {
            Some(ix) => ix,
            None => return Ok(false),
        };

        for record in reader.records() {
            let record = record.context("Unable to read a ledger record")?;
            if record.get(source_col) == Some(file_name) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Appends one expense, creating the file with a header row first if needed.
    pub(crate) fn append(&self, expense: &Expense) -> Result<()> {
        let needs_header = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata.len() == 0,
            Err(_) => true,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Unable to open the ledger at {}", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer
                .write_record(LEDGER_HEADER)
                .context("Unable to write the ledger header")?;
        }
        writer
            .write_record(expense.to_row())
            .context("Unable to write the ledger record")?;
        writer.flush().context("Unable to flush the ledger")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;
    use chrono::NaiveDate;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn expense(source_file: &str) -> Expense {
        Expense::new(
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            "Mercadona",
            "Weekly groceries",
            Amount::from_str("€54.20").unwrap(),
            "Groceries",
            "Card",
            source_file,
            "2026-03-02 18:30:01",
        )
    }

    #[test]
    fn test_append_creates_header_once() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerFile::new(dir.path().join("ledger.csv"));

        ledger.append(&expense("a.jpg")).unwrap();
        ledger.append(&expense("b.jpg")).unwrap();

        let content = std::fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Date,Merchant,Description,Amount"));
        assert!(lines[1].contains("a.jpg"));
        assert!(lines[2].contains("b.jpg"));
    }

    #[test]
    fn test_is_processed() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerFile::new(dir.path().join("ledger.csv"));

        assert!(!ledger.is_processed("a.jpg").unwrap(), "missing file has no records");

        ledger.append(&expense("a.jpg")).unwrap();
        assert!(ledger.is_processed("a.jpg").unwrap());
        assert!(!ledger.is_processed("b.jpg").unwrap());
    }

    #[test]
    fn test_fields_with_commas_round_trip() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerFile::new(dir.path().join("ledger.csv"));

        let e = Expense::new(
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            "Bar, Restaurante Pepe",
            "Lunch, menu of the day",
            Amount::from_str("€1,234.00").unwrap(),
            "Dining",
            "Card",
            "c.jpg",
            "2026-03-02 14:00:00",
        );
        ledger.append(&e).unwrap();

        let mut reader = csv::Reader::from_path(ledger.path()).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.get(1), Some("Bar, Restaurante Pepe"));
        assert_eq!(record.get(3), Some("€1,234.00"));
        assert!(ledger.is_processed("c.jpg").unwrap());
    }
}
