//! The `receipts dashboard` command: load the expense table, aggregate it, and render the result
//! either as cells in the Dashboard worksheet or as JSON for a web dashboard.

use crate::api::{self, Sheet, DASHBOARD, EXPENSES};
use crate::args::{DashboardArgs, OutputTarget};
use crate::backup::{Backup, DASHBOARD_PRE};
use crate::commands::Out;
use crate::model::{Ledger, PROCESSED_AT_FORMAT};
use crate::{render, report, Config, DashboardData, Mode, Result};
use anyhow::Context;
use chrono::Local;
use tracing::{debug, warn};

/// Handles the `receipts dashboard` command.
pub async fn dashboard(
    config: Config,
    mode: Mode,
    args: DashboardArgs,
) -> Result<Out<DashboardData>> {
    let mut sheet = api::sheet(&config, mode).await?;
    let backup = config.backup();
    dashboard_inner(sheet.as_mut(), &backup, &args).await
}

/// The rebuild itself, decoupled from `Config` so that it can run against test doubles.
pub(crate) async fn dashboard_inner(
    sheet: &mut (dyn Sheet + Send),
    backup: &Backup,
    args: &DashboardArgs,
) -> Result<Out<DashboardData>> {
    let values = sheet
        .get(EXPENSES)
        .await
        .context("Unable to read the Expenses worksheet")?;

    // A worksheet with only a header (or nothing at all) is an empty table, not an error.
    let ledger = if values.len() <= 1 {
        Ledger::default()
    } else {
        Ledger::from_sheet_values(values.clone())?
    };
    if ledger.dropped() > 0 {
        warn!(
            "{} row(s) had an unparseable date or amount and were left out",
            ledger.dropped()
        );
    }

    let data = report::analyze(ledger.expenses(), args.top());

    match args.output() {
        OutputTarget::Json => Ok(Out::new(
            format!(
                "Computed dashboard data from {} transaction(s)",
                ledger.len()
            ),
            data,
        )),
        OutputTarget::Sheet => {
            // Snapshot the source table before the destructive rewrite.
            let backup_path = backup.save_json(DASHBOARD_PRE, &values).await?;
            debug!("Saved pre-rebuild snapshot to {}", backup_path.display());

            let worksheet_id = sheet.ensure_worksheet(DASHBOARD).await?;
            sheet.clear_ranges(&[DASHBOARD]).await?;

            let layout = if data.is_empty() {
                warn!("There are no usable expense records, writing a notice instead");
                render::empty_notice()
            } else {
                let stamp = Local::now().format(PROCESSED_AT_FORMAT).to_string();
                render::build_dashboard(&data, &stamp)
            };
            sheet.write_ranges(&layout.ranges).await?;
            sheet.format(worksheet_id, &layout.formats).await?;

            Ok(Out::new(
                format!("Dashboard rebuilt from {} transaction(s)", ledger.len()),
                data,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestSheet;
    use crate::utils;
    use tempfile::TempDir;

    /// Builds a real `Config` in a temp directory so that `Backup` has somewhere to write.
    async fn test_config(dir: &TempDir) -> Config {
        let secret = dir.path().join("secret.json");
        utils::write(&secret, "{}").await.unwrap();
        Config::create(
            dir.path().join("home"),
            &secret,
            "https://docs.google.com/spreadsheets/d/TestSheetId",
            "inbox",
            "archive",
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_dashboard_sheet_output() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir).await;
        let mut sheet = TestSheet::default();

        let out = dashboard_inner(
            &mut sheet,
            &config.backup(),
            &DashboardArgs::new(OutputTarget::Sheet, 10),
        )
        .await
        .unwrap();

        // The seeded table has six records.
        assert_eq!(out.structure().unwrap().overview.count, 6);

        // The Dashboard worksheet was created and populated.
        let dashboard = &sheet.data[DASHBOARD];
        assert_eq!(dashboard[0][0], "EXPENSE DASHBOARD");
        assert!(dashboard[4][0].contains("Total spend"));
        assert!(!sheet.formatted.is_empty());

        // A snapshot landed in the backups directory.
        let backups: Vec<_> = std::fs::read_dir(config.backups())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with(DASHBOARD_PRE));
    }

    #[tokio::test]
    async fn test_dashboard_json_output_leaves_sheet_alone() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir).await;
        let mut sheet = TestSheet::default();

        let out = dashboard_inner(
            &mut sheet,
            &config.backup(),
            &DashboardArgs::new(OutputTarget::Json, 3),
        )
        .await
        .unwrap();

        let data = out.structure().unwrap();
        assert_eq!(data.overview.count, 6);
        assert!(data.companies.len() <= 3);
        assert!(!sheet.data.contains_key(DASHBOARD));
        assert!(std::fs::read_dir(config.backups()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_dashboard_with_empty_table_writes_notice() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir).await;
        let mut sheet = TestSheet::empty();
        sheet.ensure_worksheet(EXPENSES).await.unwrap();

        let out = dashboard_inner(
            &mut sheet,
            &config.backup(),
            &DashboardArgs::new(OutputTarget::Sheet, 10),
        )
        .await
        .unwrap();

        assert!(out.structure().unwrap().is_empty());
        assert!(sheet.data[DASHBOARD][0][0].contains("not enough data"));
    }

    #[tokio::test]
    async fn test_dashboard_missing_worksheet_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir).await;
        let mut sheet = TestSheet::empty();

        let result = dashboard_inner(
            &mut sheet,
            &config.backup(),
            &DashboardArgs::default(),
        )
        .await;
        assert!(result.is_err());
    }
}
