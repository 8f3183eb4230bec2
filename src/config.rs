//! Configuration file handling for receipt-sync.
//!
//! The configuration file is stored at `$RECEIPTS_HOME/config.json` and contains settings for the
//! application including the Google Sheet URL, the Drive folder IDs, the extraction model, backup
//! settings, and authentication file paths.

use crate::backup::Backup;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "receipts";
const CONFIG_VERSION: u8 = 1;
const BACKUP_COPIES: u32 = 5;
const LOOKBACK_DAYS: u32 = 7;
const DEFAULT_MODEL: &str = "gpt-4o";
const SECRETS: &str = ".secrets";
const BACKUPS: &str = ".backups";
const CLIENT_SECRET_JSON: &str = "client_secret.json";
const TOKEN_JSON: &str = "token.json";
const CONFIG_JSON: &str = "config.json";
const LEDGER_CSV: &str = "ledger.csv";

/// The environment variable holding the OpenAI API key used for receipt extraction.
const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$RECEIPTS_HOME` and from there it loads `$RECEIPTS_HOME/config.json`. It provides
/// paths to other items that are either configurable or are expected in a certain location within
/// the receipts home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    backups: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    spreadsheet_id: String,
    ledger_path: PathBuf,
}

impl Config {
    /// Creates the data directory, its subdirectories and:
    /// - Creates an initial `config.json` file using `sheet_url` and the Drive folder IDs along
    ///   with default settings
    /// - Moves `secret_file` into its default location in the data dir.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of the data directory, e.g. `$HOME/receipts`
    /// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON needed to start the
    ///   Google OAuth workflow. This will be moved from the `secret_file` path to its default
    ///   location and name in the data directory.
    /// - `sheet_url` - The URL of the Google Sheet where the expense records are stored.
    ///   e.g. https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    /// - `inbox_folder_id` - The Drive folder where new receipt images are uploaded.
    /// - `archive_folder_id` - The Drive folder where processed receipt images are filed.
    ///
    /// # Errors
    /// - Returns an error if any file operations fail.
    pub async fn create(
        dir: impl Into<PathBuf>,
        secret_file: &Path,
        sheet_url: &str,
        inbox_folder_id: &str,
        archive_folder_id: &str,
    ) -> Result<Self> {
        // Create the directory if it does not exist
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the receipts home directory")?;

        // Canonicalize the directory path
        let root = utils::canonicalize(&maybe_relative).await?;

        // Create the subdirectories
        let backups_dir = root.join(BACKUPS);
        utils::make_dir(&backups_dir).await?;
        let secrets_dir = root.join(SECRETS);
        utils::make_dir(&secrets_dir).await?;

        // Move the Google OAuth client credentials file to its default location in the data dir
        let secret_destination = secrets_dir.join(CLIENT_SECRET_JSON);
        utils::rename(secret_file, secret_destination).await?;
        let config_path = root.join(CONFIG_JSON);

        // Create and save an initial ConfigFile in the datastore
        let config_file = ConfigFile {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            sheet_url: sheet_url.to_string(),
            inbox_folder_id: inbox_folder_id.to_string(),
            archive_folder_id: archive_folder_id.to_string(),
            lookback_days: LOOKBACK_DAYS,
            model: DEFAULT_MODEL.to_string(),
            backup_copies: BACKUP_COPIES,
            client_secret_path: None,
            token_path: None,
        };
        config_file.save(&config_path).await?;

        // Extract the spreadsheet ID from the URL
        let spreadsheet_id = extract_spreadsheet_id(sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        // Return a new `Config` object that represents a data directory that is ready to use
        Ok(Self {
            root: root.clone(),
            backups: backups_dir,
            secrets: secrets_dir,
            config_path,
            config_file,
            spreadsheet_id,
            ledger_path: root.join(LEDGER_CSV),
        })
    }

    /// This will
    /// - validate that the `receipts_home` exists and that the config file exists
    /// - load the config file
    /// - validate that the backups and secrets directories exist
    /// - return the loaded configuration object
    pub async fn load(receipts_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = receipts_home.into();
        let root = utils::canonicalize(&maybe_relative).await?;

        // Validate that the home directory exists.
        let _ = utils::read_dir(&root)
            .await
            .context("Receipts home is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        // Extract the spreadsheet ID from the URL
        let spreadsheet_id = extract_spreadsheet_id(&config_file.sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let config = Self {
            root: root.clone(),
            backups: root.join(BACKUPS),
            secrets: root.join(SECRETS),
            config_path,
            config_file,
            spreadsheet_id,
            ledger_path: root.join(LEDGER_CSV),
        };
        if !config.backups.is_dir() {
            bail!(
                "The backups directory is missing '{}'",
                config.backups.display()
            )
        }
        if !config.secrets.is_dir() {
            bail!(
                "The secrets directory is missing '{}'",
                config.secrets.display()
            )
        }
        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn backups(&self) -> &Path {
        &self.backups
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn sheet_url(&self) -> &str {
        &self.config_file.sheet_url
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn inbox_folder_id(&self) -> &str {
        &self.config_file.inbox_folder_id
    }

    pub fn archive_folder_id(&self) -> &str {
        &self.config_file.archive_folder_id
    }

    pub fn lookback_days(&self) -> u32 {
        self.config_file.lookback_days
    }

    pub fn model(&self) -> &str {
        &self.config_file.model
    }

    pub fn backup_copies(&self) -> u32 {
        self.config_file.backup_copies
    }

    /// The path to the local CSV ledger file.
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// Creates a new `Backup` instance for managing backup files.
    pub fn backup(&self) -> Backup {
        Backup::new(self)
    }

    /// Reads the OpenAI API key from the environment.
    pub fn openai_api_key(&self) -> Result<String> {
        std::env::var(OPENAI_API_KEY).with_context(|| {
            format!(
                "The {OPENAI_API_KEY} environment variable is required for receipt extraction \
                but was not set"
            )
        })
    }

    /// Returns the stored `client_secret_path` if it is absolute, otherwise resolves the relative path.
    pub fn client_secret_path(&self) -> PathBuf {
        self.resolve_secrets_file_path(self.config_file.client_secret_path())
    }

    /// Returns the stored `token_path` if it is absolute, otherwise resolves the relative path.
    pub fn token_path(&self) -> PathBuf {
        self.resolve_secrets_file_path(self.config_file.token_path())
    }

    /// Checks if `p` is relative, and if so, resolves it. Returns it unchanged if it is absolute.
    fn resolve_secrets_file_path(&self, p: PathBuf) -> PathBuf {
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "receipts",
///   "config_version": 1,
///   "sheet_url": "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
///   "inbox_folder_id": "1o7ODEc36bYV0cKWP9gxIgr4cWSvCRz6A",
///   "archive_folder_id": "1U_QB29Xeg8fAF_aLLB9nFqKG5LTJsBSu",
///   "lookback_days": 7,
///   "model": "gpt-4o",
///   "backup_copies": 5,
///   "client_secret_path": ".secrets/client_secret.json",
///   "token_path": ".secrets/token.json"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "receipts"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// URL to the expenses Google Sheet
    sheet_url: String,

    /// Drive folder where new receipt images are uploaded
    inbox_folder_id: String,

    /// Drive folder where processed receipt images are filed
    archive_folder_id: String,

    /// How many days back `ingest` looks for new receipt images
    lookback_days: u32,

    /// The vision model used for receipt extraction
    model: String,

    /// Number of backup copies to keep
    backup_copies: u32,

    /// Path to the OAuth 2.0 client credentials file (optional, relative to config.json or absolute)
    /// Defaults to $RECEIPTS_HOME/.secrets/client_secret.json if not specified
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret_path: Option<PathBuf>,

    /// Path to the OAuth token file (optional, relative to config.json or absolute)
    /// Defaults to $RECEIPTS_HOME/.secrets/token.json if not specified
    #[serde(skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            sheet_url: String::new(),
            inbox_folder_id: String::new(),
            archive_folder_id: String::new(),
            lookback_days: LOOKBACK_DAYS,
            model: DEFAULT_MODEL.to_string(),
            backup_copies: BACKUP_COPIES,
            client_secret_path: None,
            token_path: None,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = utils::read(path).await?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        // Validate app_name
        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );

        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }

    /// Gets the client secret path.
    ///
    /// If the path is relative, it should be interpreted as relative to the config.json file.
    /// If None, defaults to $RECEIPTS_HOME/.secrets/client_secret.json
    pub fn client_secret_path(&self) -> PathBuf {
        self.client_secret_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON))
    }

    /// Gets the token path.
    ///
    /// If the path is relative, it should be interpreted as relative to the config.json file.
    /// If None, defaults to $RECEIPTS_HOME/.secrets/token.json
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(TOKEN_JSON))
    }
}

/// Extracts the spreadsheet ID from a Google Sheets URL
///
/// # Arguments
/// * `url` - The Google Sheets URL (e.g., "https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...")
///
/// # Returns
/// The spreadsheet ID or an error if the URL format is invalid. Returns an empty string if the URL
/// is empty.
fn extract_spreadsheet_id(url: &str) -> Result<&str> {
    // Handle empty URL case
    if url.is_empty() {
        return Ok(url);
    }

    // URL format: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...
    // or: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID?foo=bar
    let parts: Vec<&str> = url.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "d" && i + 1 < parts.len() {
            // Extract the ID and remove any query parameters or fragments
            let id_part = parts[i + 1];
            let id = id_part
                .split('?')
                .next()
                .unwrap_or(id_part)
                .split('#')
                .next()
                .unwrap_or(id_part);
            return Ok(id);
        }
    }
    Err(anyhow::anyhow!(
        "Invalid Google Sheets URL format. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("receipts_home");
        let secret_source_file = dir.path().join("x.txt");
        let secret_content = "12345";
        let sheet_url =
            "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL/edit";
        utils::write(&secret_source_file, secret_content)
            .await
            .unwrap();

        // Run the function under test:
        let config = Config::create(&home_dir, &secret_source_file, sheet_url, "inbox1", "arch1")
            .await
            .unwrap();

        // Check some values on the config object
        assert_eq!(sheet_url, config.sheet_url());
        assert_eq!(
            "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
            config.spreadsheet_id()
        );
        assert_eq!("inbox1", config.inbox_folder_id());
        assert_eq!("arch1", config.archive_folder_id());
        assert_eq!(7, config.lookback_days());
        assert_eq!("gpt-4o", config.model());

        // Check for some files in the directory
        let found_secret_content = utils::read(&config.client_secret_path()).await.unwrap();
        assert_eq!(secret_content, found_secret_content);

        assert!(config.backups().is_dir());
        assert!(config.secrets().is_dir());
    }

    #[tokio::test]
    async fn test_config_load() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().to_owned();
        let secret_file = dir.path().join("foo.json");
        utils::write(&secret_file, "{}").await.unwrap();
        let url = "https://example.com/spreadsheets/d/MySheetIDX";
        let _ = Config::create(&home_dir, &secret_file, url, "in", "out")
            .await
            .unwrap();

        let config = Config::load(&home_dir).await.unwrap();
        assert_eq!("MySheetIDX", config.spreadsheet_id());
        assert_eq!(config.ledger_path(), home_dir.canonicalize().unwrap().join("ledger.csv"));
    }

    #[tokio::test]
    async fn test_config_file_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = ConfigFile {
            sheet_url: "https://docs.google.com/spreadsheets/d/test123".to_string(),
            inbox_folder_id: "folderA".to_string(),
            archive_folder_id: "folderB".to_string(),
            backup_copies: 7,
            client_secret_path: Some(PathBuf::from(".secrets/my_key.json")),
            token_path: Some(PathBuf::from(".secrets/my_token.json")),
            ..ConfigFile::default()
        };

        // Save the config
        original_config.save(&config_path).await.unwrap();

        // Load it back
        let loaded_config = ConfigFile::load(&config_path).await.unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[tokio::test]
    async fn test_config_file_load_with_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let json = r#"{
            "app_name": "receipts",
            "config_version": 1,
            "sheet_url": "https://docs.google.com/spreadsheets/d/minimal",
            "inbox_folder_id": "in",
            "archive_folder_id": "out",
            "lookback_days": 3,
            "model": "gpt-4o",
            "backup_copies": 3
        }"#;

        utils::write(&config_path, json).await.unwrap();

        let config = ConfigFile::load(&config_path).await.unwrap();

        assert_eq!(
            config.sheet_url,
            "https://docs.google.com/spreadsheets/d/minimal"
        );
        assert_eq!(config.lookback_days, 3);
        assert_eq!(
            config.client_secret_path(),
            PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON)
        );
        assert_eq!(config.token_path(), PathBuf::from(SECRETS).join(TOKEN_JSON));
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_app_name() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let json = r#"{
            "app_name": "wrong_app",
            "config_version": 1,
            "sheet_url": "https://docs.google.com/spreadsheets/d/test",
            "inbox_folder_id": "in",
            "archive_folder_id": "out",
            "lookback_days": 7,
            "model": "gpt-4o",
            "backup_copies": 5
        }"#;

        utils::write(&config_path, json).await.unwrap();

        let result = ConfigFile::load(&config_path).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid app_name"));
    }

    #[test]
    fn test_config_file_serialization_omits_none_fields() {
        let config = ConfigFile::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("client_secret_path"));
        assert!(!json.contains("token_path"));
    }

    #[test]
    fn test_extract_spreadsheet_id() {
        let url = "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL/edit";
        let id = extract_spreadsheet_id(url).unwrap();
        assert_eq!(id, "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL");

        let url2 = "https://docs.google.com/spreadsheets/d/ABC123";
        let id2 = extract_spreadsheet_id(url2).unwrap();
        assert_eq!(id2, "ABC123");

        let invalid = "https://example.com/invalid";
        assert!(extract_spreadsheet_id(invalid).is_err());

        // Empty URL should return empty string
        let empty = "";
        let id_empty = extract_spreadsheet_id(empty).unwrap();
        assert_eq!(id_empty, "");
    }

    #[test]
    fn test_extract_spreadsheet_id_query_params() {
        let url = "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL?foo=bar";
        let id = extract_spreadsheet_id(url).unwrap();
        assert_eq!(id, "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL");
    }
}
