//! The `receipts ingest` command: a single sequential pass over new receipt images.
//!
//! For each image in the inbox folder: skip if a record for it already exists, download it,
//! extract its fields with the vision model, append the record to the CSV ledger and the Expenses
//! worksheet, then file a copy of the image in the archive folder. Any failure along the way logs
//! a warning and skips that file; there are no retries.

use crate::api::{self, Drive, DriveFile, Sheet, SheetRange, EXPENSES};
use crate::commands::Out;
use crate::extract::{self, Extractor};
use crate::model::{Expense, LEDGER_HEADER, PROCESSED_AT_FORMAT, SOURCE_FILE_STR};
use crate::store::LedgerFile;
use crate::{Config, Mode, Result};
use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Counters reported at the end of an ingest pass.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestStats {
    /// How many files the listing returned.
    pub total: usize,
    /// How many files were recorded in both stores.
    pub processed: usize,
    /// How many files were skipped, whether as duplicates or after an error.
    pub skipped: usize,
}

/// Handles the `receipts ingest` command.
pub async fn ingest(config: Config, mode: Mode, args: crate::args::IngestArgs) -> Result<Out<IngestStats>> {
    let mut sheet = api::sheet(&config, mode).await?;
    let mut drive = api::drive(&config, mode).await?;
    let extractor = extract::extractor(&config, mode)?;
    let ledger = LedgerFile::new(config.ledger_path());

    let days = args.days().unwrap_or(config.lookback_days());
    let since = Utc::now() - chrono::Duration::days(days as i64);
    info!(
        "Processing receipt images from the last {days} day(s) in folder {}",
        config.inbox_folder_id()
    );

    let stats = ingest_inner(
        sheet.as_mut(),
        drive.as_mut(),
        extractor.as_ref(),
        &ledger,
        config.inbox_folder_id(),
        config.archive_folder_id(),
        since,
    )
    .await?;

    Ok(Out::new(
        format!(
            "Ingest complete: {} of {} file(s) processed, {} skipped",
            stats.processed, stats.total, stats.skipped
        ),
        stats,
    ))
}

/// The pipeline itself, decoupled from `Config` so that it can run against test doubles.
pub(crate) async fn ingest_inner(
    sheet: &mut (dyn Sheet + Send),
    drive: &mut (dyn Drive + Send),
    extractor: &(dyn Extractor + Send + Sync),
    ledger: &LedgerFile,
    inbox_folder: &str,
    archive_folder: &str,
    since: DateTime<Utc>,
) -> Result<IngestStats> {
    ensure_expenses_header(sheet).await?;

    let files = drive.list_recent_images(inbox_folder, since).await?;
    let mut stats = IngestStats {
        total: files.len(),
        ..IngestStats::default()
    };
    if files.is_empty() {
        info!("No new receipt images to process");
        return Ok(stats);
    }
    info!("Found {} receipt image(s)", files.len());

    for file in &files {
        info!("Processing {} ({})", file.name, file.id);

        if already_processed(sheet, drive, ledger, archive_folder, &file.name).await {
            info!("{} was already processed, skipping", file.name);
            stats.skipped += 1;
            continue;
        }

        match process_file(sheet, drive, extractor, ledger, archive_folder, file).await {
            Ok(()) => stats.processed += 1,
            Err(e) => {
                warn!("Skipping {}: {e:#}", file.name);
                stats.skipped += 1;
            }
        }
    }

    info!(
        "Finished: {} file(s) total, {} processed, {} skipped",
        stats.total, stats.processed, stats.skipped
    );
    Ok(stats)
}

/// Runs one file through download, extraction, both stores, and archival.
async fn process_file(
    sheet: &mut (dyn Sheet + Send),
    drive: &mut (dyn Drive + Send),
    extractor: &(dyn Extractor + Send + Sync),
    ledger: &LedgerFile,
    archive_folder: &str,
    file: &DriveFile,
) -> Result<()> {
    let image = drive
        .download(&file.id)
        .await
        .context("Unable to download the image")?;

    let fields = extractor
        .extract(&image)
        .await
        .context("Unable to extract receipt data from the image")?;

    let expense = Expense::new(
        fields.date,
        fields.merchant,
        fields.description,
        fields.amount,
        fields.category,
        fields.payment_method,
        file.name.clone(),
        Local::now().format(PROCESSED_AT_FORMAT).to_string(),
    );

    // Both stores must succeed before the image is archived; the record is the source of truth
    // for the duplicate check.
    ledger
        .append(&expense)
        .context("Unable to append to the CSV ledger")?;
    sheet
        .append_rows(EXPENSES, &[expense.to_row()])
        .await
        .context("Unable to append to the Expenses worksheet")?;

    // An archival failure is not fatal: the record exists, so a re-run will skip this file.
    match drive.copy_to_folder(&file.id, archive_folder).await {
        Ok(copy_id) => info!("Filed {} in the archive folder as {}", file.name, copy_id),
        Err(e) => warn!(
            "{} was recorded but could not be copied to the archive folder: {e:#}",
            file.name
        ),
    }
    Ok(())
}

/// Checks the CSV ledger, the worksheet's Source File column, and the archive folder for an
/// existing record of `file_name`. A check that itself fails is logged and treated as "not
/// processed" so that a broken store never blocks the pipeline.
async fn already_processed(
    sheet: &mut (dyn Sheet + Send),
    drive: &mut (dyn Drive + Send),
    ledger: &LedgerFile,
    archive_folder: &str,
    file_name: &str,
) -> bool {
    match ledger.is_processed(file_name) {
        Ok(true) => {
            info!("{file_name} found in the CSV ledger");
            return true;
        }
        Ok(false) => {}
        Err(e) => warn!("Unable to check the CSV ledger for {file_name}: {e:#}"),
    }

    match sheet_contains(sheet, file_name).await {
        Ok(true) => {
            info!("{file_name} found in the Expenses worksheet");
            return true;
        }
        Ok(false) => {}
        Err(e) => warn!("Unable to check the Expenses worksheet for {file_name}: {e:#}"),
    }

    match drive.exists_in_folder(file_name, archive_folder).await {
        Ok(true) => {
            info!("{file_name} found in the archive folder");
            return true;
        }
        Ok(false) => {}
        Err(e) => warn!("Unable to check the archive folder for {file_name}: {e:#}"),
    }

    false
}

/// Scans the worksheet's Source File column for `file_name`.
async fn sheet_contains(sheet: &mut (dyn Sheet + Send), file_name: &str) -> Result<bool> {
    let values = sheet.get(EXPENSES).await?;
    let Some(header) = values.first() else {
        return Ok(false);
    };
    let Some(source_col) = header.iter().position(|h| h == SOURCE_FILE_STR) else {
        return Ok(false);
    };
    Ok(values
        .iter()
        .skip(1)
        .any(|row| row.get(source_col).map(|s| s.as_str()) == Some(file_name)))
}

/// Makes sure the Expenses worksheet exists and starts with the canonical header row, creating or
/// repairing the header as needed.
async fn ensure_expenses_header(sheet: &mut (dyn Sheet + Send)) -> Result<()> {
    let _ = sheet.ensure_worksheet(EXPENSES).await?;
    let values = sheet.get(EXPENSES).await?;

    let header_ok = values.first().is_some_and(|header| {
        header.len() >= LEDGER_HEADER.len()
            && LEDGER_HEADER
                .iter()
                .zip(header.iter())
                .all(|(expected, actual)| expected.eq_ignore_ascii_case(actual.trim()))
    });
    if header_ok {
        return Ok(());
    }

    if values.first().is_none() {
        info!("Creating the header row in the Expenses worksheet");
    } else {
        warn!("The Expenses worksheet header is missing columns or misnamed, repairing it");
    }
    sheet
        .write_ranges(&[SheetRange {
            range: format!("{EXPENSES}!A1"),
            values: vec![LEDGER_HEADER.iter().map(|s| s.to_string()).collect()],
        }])
        .await
        .context("Unable to write the Expenses header row")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{TestDrive, TestSheet};
    use crate::extract::TestVision;
    use tempfile::TempDir;

    fn since() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::days(7)
    }

    #[tokio::test]
    async fn test_ingest_processes_new_files() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerFile::new(dir.path().join("ledger.csv"));
        let mut sheet = TestSheet::default();
        let mut drive = TestDrive::default();
        let vision = TestVision::default();

        let seeded_rows = sheet.data[EXPENSES].len();
        let stats = ingest_inner(
            &mut sheet,
            &mut drive,
            &vision,
            &ledger,
            "inbox",
            "archive",
            since(),
        )
        .await
        .unwrap();

        assert_eq!(
            stats,
            IngestStats {
                total: 2,
                processed: 2,
                skipped: 0
            }
        );

        // Both files landed in the worksheet...
        let rows = &sheet.data[EXPENSES];
        assert_eq!(rows.len(), seeded_rows + 2);
        assert_eq!(rows[seeded_rows][1], "Mercadona");
        assert_eq!(rows[seeded_rows][6], "receipt-0301.jpg");

        // ...and in the CSV ledger...
        assert!(ledger.is_processed("receipt-0301.jpg").unwrap());
        assert!(ledger.is_processed("receipt-0303.jpg").unwrap());

        // ...and were filed in the archive folder.
        assert_eq!(drive.copies.len(), 2);
        assert_eq!(drive.copies[0], ("drive-001".to_string(), "archive".to_string()));
    }

    #[tokio::test]
    async fn test_ingest_skips_already_processed_files() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerFile::new(dir.path().join("ledger.csv"));
        let mut sheet = TestSheet::default();
        let mut drive = TestDrive::default();

        let first = ingest_inner(
            &mut sheet,
            &mut drive,
            &TestVision::default(),
            &ledger,
            "inbox",
            "archive",
            since(),
        )
        .await
        .unwrap();
        assert_eq!(first.processed, 2);

        // A second pass sees the same two files and skips both. The empty TestVision proves the
        // vision model is never consulted for a duplicate.
        let second = ingest_inner(
            &mut sheet,
            &mut drive,
            &TestVision::new(Vec::new()),
            &ledger,
            "inbox",
            "archive",
            since(),
        )
        .await
        .unwrap();
        assert_eq!(
            second,
            IngestStats {
                total: 2,
                processed: 0,
                skipped: 2
            }
        );
    }

    #[tokio::test]
    async fn test_ingest_skips_on_extraction_error_and_continues() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerFile::new(dir.path().join("ledger.csv"));
        let mut sheet = TestSheet::default();
        let mut drive = TestDrive::default();
        // No canned replies: every extraction fails and the file is skipped.
        let vision = TestVision::new(vec![]);

        let stats = ingest_inner(
            &mut sheet,
            &mut drive,
            &vision,
            &ledger,
            "inbox",
            "archive",
            since(),
        )
        .await
        .unwrap();

        assert_eq!(
            stats,
            IngestStats {
                total: 2,
                processed: 0,
                skipped: 2
            }
        );
        assert!(!ledger.is_processed("receipt-0301.jpg").unwrap());
        assert!(drive.copies.is_empty());
    }

    #[tokio::test]
    async fn test_header_is_created_in_an_empty_worksheet() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerFile::new(dir.path().join("ledger.csv"));
        let mut sheet = TestSheet::empty();
        let mut drive = TestDrive::default();

        ingest_inner(
            &mut sheet,
            &mut drive,
            &TestVision::default(),
            &ledger,
            "inbox",
            "archive",
            since(),
        )
        .await
        .unwrap();

        let rows = &sheet.data[EXPENSES];
        assert_eq!(rows[0], LEDGER_HEADER.map(|s| s.to_string()).to_vec());
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_header_is_repaired_when_misnamed() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerFile::new(dir.path().join("ledger.csv"));
        let mut data = std::collections::HashMap::new();
        data.insert(
            EXPENSES.to_string(),
            vec![vec!["Fecha".to_string(), "Negocio".to_string()]],
        );
        let mut sheet = TestSheet::new(data);
        let mut drive = TestDrive::new(Vec::new(), Vec::new());

        ingest_inner(
            &mut sheet,
            &mut drive,
            &TestVision::new(Vec::new()),
            &ledger,
            "inbox",
            "archive",
            since(),
        )
        .await
        .unwrap();

        assert_eq!(sheet.data[EXPENSES][0][0], "Date");
        assert_eq!(sheet.data[EXPENSES][0][7], "Processed At");
    }
}
