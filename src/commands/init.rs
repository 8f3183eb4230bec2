use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its subdirectories and:
/// - Creates an initial `config.json` file using `sheet_url` and the folder IDs along with
///   default settings
/// - Moves `secret_file` into its default location in the data dir.
///
/// # Arguments
/// - `receipts_home` - The directory that will be the root of the data directory, e.g.
///   `$HOME/receipts`
/// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON needed to start the Google
///   OAuth workflow.
/// - `sheet_url` - The URL of the Google Sheet where the expense records are stored.
/// - `inbox_folder_id` - The Drive folder where new receipt images are uploaded.
/// - `archive_folder_id` - The Drive folder where processed receipt images are filed.
///
/// # Errors
/// - Returns an error if any file operations fail.
pub async fn init(
    receipts_home: &Path,
    secret_file: &Path,
    sheet_url: &str,
    inbox_folder_id: &str,
    archive_folder_id: &str,
) -> Result<Out<()>> {
    let _config = Config::create(
        receipts_home,
        secret_file,
        sheet_url,
        inbox_folder_id,
        archive_folder_id,
    )
    .await
    .context("Unable to create the data directory and configs")?;
    Ok("Successfully created the receipts directory and config".into())
}
