//! These structs provide the CLI interface for the receipts CLI.

use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// receipts: A command-line tool for turning receipt images into expense records.
///
/// The purpose of this program is to watch a Google Drive folder for photos of receipts, extract
/// the purchase details from each image with a vision model, record the results in a Google Sheet
/// and a local CSV ledger, and rebuild a summary dashboard from the accumulated records.
///
/// You will need to set up a Google API key and OAuth for this, plus an OpenAI API key in the
/// OPENAI_API_KEY environment variable. See the README for documentation on how to set this up.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and initialize the configuration files.
    ///
    /// This is the first command you should run when setting up the receipts CLI. You need to get
    /// a few things ready beforehand.
    ///
    /// - Decide what directory you want to store data in and pass this as --receipts-home. By
    ///   default, it will be $HOME/receipts. If you want it somewhere else then you should specify
    ///   it.
    ///
    /// - Get the URL of your expenses Google Sheet and pass it as --sheet-url.
    ///
    /// - Find the Drive folder IDs for the folder where receipt photos land (--inbox-folder) and
    ///   the folder where processed photos should be filed (--archive-folder).
    ///
    /// - Set up your Google API access credentials and download them to a file. You will pass this
    ///   as --client-secret.
    Init(InitArgs),
    /// Authenticate with Google Sheets and Drive via OAuth.
    Auth(AuthArgs),
    /// Process new receipt images from the Drive inbox folder.
    Ingest(IngestArgs),
    /// Rebuild the summary dashboard from the recorded expenses.
    Dashboard(DashboardArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// none, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG. See the tracing-subscriber crate for instructions.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where receipts data and configuration is held. Defaults to ~/receipts
    #[arg(long, env = "RECEIPTS_HOME", default_value_t = default_receipts_home())]
    receipts_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, receipts_home: PathBuf) -> Self {
        Self {
            log_level,
            receipts_home: receipts_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn receipts_home(&self) -> &DisplayPath {
        &self.receipts_home
    }
}

/// Args for the `receipts init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The URL to your expenses Google sheet. It looks like this:
    /// https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    #[arg(long)]
    sheet_url: String,

    /// The Drive folder ID of the folder where new receipt photos are uploaded.
    #[arg(long)]
    inbox_folder: String,

    /// The Drive folder ID of the folder where processed receipt photos are filed.
    #[arg(long)]
    archive_folder: String,

    /// The path to your downloaded OAuth client credentials. This file will be moved to the
    /// default secrets location in the main data directory.
    #[arg(long)]
    client_secret: PathBuf,
}

impl InitArgs {
    pub fn new(
        sheet_url: impl Into<String>,
        inbox_folder: impl Into<String>,
        archive_folder: impl Into<String>,
        client_secret: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sheet_url: sheet_url.into(),
            inbox_folder: inbox_folder.into(),
            archive_folder: archive_folder.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }

    pub fn inbox_folder(&self) -> &str {
        &self.inbox_folder
    }

    pub fn archive_folder(&self) -> &str {
        &self.archive_folder
    }

    pub fn client_secret(&self) -> &Path {
        &self.client_secret
    }
}

/// Args for the `receipts auth` command.
#[derive(Debug, Parser, Clone)]
pub struct AuthArgs {
    /// Verify and refresh authentication without opening a browser.
    #[arg(long)]
    verify: bool,
}

impl AuthArgs {
    pub fn new(verify: bool) -> Self {
        Self { verify }
    }

    pub fn verify(&self) -> bool {
        self.verify
    }
}

/// Args for the `receipts ingest` command.
#[derive(Debug, Parser, Clone, Default)]
pub struct IngestArgs {
    /// How many days back to look for new receipt images. Overrides the configured value.
    #[arg(long)]
    days: Option<u32>,
}

impl IngestArgs {
    pub fn new(days: Option<u32>) -> Self {
        Self { days }
    }

    pub fn days(&self) -> Option<u32> {
        self.days
    }
}

/// Where the rebuilt dashboard should go.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    /// Render the dashboard as cells in the Dashboard worksheet.
    #[default]
    Sheet,
    /// Print the dashboard data as JSON for consumption by a web dashboard.
    Json,
}

serde_plain::derive_display_from_serialize!(OutputTarget);
serde_plain::derive_fromstr_from_deserialize!(OutputTarget);

/// Args for the `receipts dashboard` command.
#[derive(Debug, Parser, Clone)]
pub struct DashboardArgs {
    /// The output target: "sheet" or "json".
    #[arg(long, value_enum, default_value_t = OutputTarget::Sheet)]
    output: OutputTarget,

    /// How many companies to include in the top-companies view.
    #[arg(long, default_value_t = 10)]
    top: usize,
}

impl Default for DashboardArgs {
    fn default() -> Self {
        Self {
            output: OutputTarget::default(),
            top: 10,
        }
    }
}

impl DashboardArgs {
    pub fn new(output: OutputTarget, top: usize) -> Self {
        Self { output, top }
    }

    pub fn output(&self) -> OutputTarget {
        self.output
    }

    pub fn top(&self) -> usize {
        self.top
    }
}

fn default_receipts_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("receipts"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --receipts-home or RECEIPTS_HOME instead of relying on the \
                default receipts home directory. If you continue using the program right now, you \
                may have problems!",
            );
            PathBuf::from("receipts")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
