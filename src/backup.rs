//! Backup management for local snapshot files taken before destructive sheet writes.

use crate::{utils, Config, Result};
use anyhow::Context;
use chrono::Local;
use serde::Serialize;
use std::path::PathBuf;

/// Prefix for snapshots of the Expenses worksheet taken before a dashboard rebuild.
pub const DASHBOARD_PRE: &str = "dashboard-pre";

/// Manages backup file creation and rotation.
///
/// The `Backup` struct is immutable and owns copies of the paths and settings it needs.
/// Create a new instance via `Config::backup()` or `Backup::new()`.
#[derive(Debug, Clone)]
pub struct Backup {
    backups_dir: PathBuf,
    backup_copies: u32,
}

impl Backup {
    /// Creates a new `Backup` instance from a `Config`.
    pub fn new(config: &Config) -> Self {
        Self {
            backups_dir: config.backups().to_path_buf(),
            backup_copies: config.backup_copies(),
        }
    }

    /// Saves `data` as a pretty-printed JSON backup file.
    ///
    /// The filename format is `{prefix}.YYYY-MM-DD-NNN.json` where NNN is a sequence number.
    /// Automatically rotates old backups, keeping only `backup_copies` files.
    ///
    /// Returns the path to the created backup file.
    pub async fn save_json<T: Serialize>(&self, prefix: &str, data: &T) -> Result<PathBuf> {
        let date = today();
        let seq = self.next_sequence_number(prefix, &date).await?;
        let filename = format!("{prefix}.{date}-{seq:03}.json");
        let path = self.backups_dir.join(&filename);

        let json =
            serde_json::to_string_pretty(data).context("Failed to serialize backup data to JSON")?;
        utils::write(&path, json).await?;

        self.rotate(prefix).await?;

        Ok(path)
    }

    /// Scans the backups directory for existing files with the given prefix and date,
    /// and returns the next sequence number.
    async fn next_sequence_number(&self, prefix: &str, date: &str) -> Result<u32> {
        let pattern_start = format!("{prefix}.{date}-");
        let mut max_seq: u32 = 0;

        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();

            if name.starts_with(&pattern_start) {
                if let Some(seq) = parse_sequence_number(&name, prefix, date) {
                    max_seq = max_seq.max(seq);
                }
            }
        }

        Ok(max_seq + 1)
    }

    /// Rotates old backup files, keeping only `backup_copies` files with the given prefix.
    async fn rotate(&self, prefix: &str) -> Result<()> {
        // Collect all matching backup files
        let mut files: Vec<(PathBuf, String)> = Vec::new();

        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy().to_string();

            if is_backup_file(&name, prefix) {
                files.push((entry.path(), name));
            }
        }

        // Sort by filename (which sorts by date and sequence number due to format)
        files.sort_by(|a, b| a.1.cmp(&b.1));

        // Delete oldest files if we have more than backup_copies
        let to_delete = files.len().saturating_sub(self.backup_copies as usize);
        for (path, _) in files.into_iter().take(to_delete) {
            utils::remove(&path).await?;
        }

        Ok(())
    }
}

/// Returns today's date in YYYY-MM-DD format.
fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Parses the sequence number from a backup filename.
/// Returns None if the filename doesn't match the expected pattern.
fn parse_sequence_number(filename: &str, prefix: &str, date: &str) -> Option<u32> {
    // Pattern: {prefix}.{date}-{NNN}.json
    let expected_start = format!("{prefix}.{date}-");

    if !filename.starts_with(&expected_start) {
        return None;
    }

    let remainder = &filename[expected_start.len()..];
    let seq_str = remainder.strip_suffix(".json")?;
    seq_str.parse().ok()
}

/// Checks if a filename is a backup file with the given prefix.
fn is_backup_file(filename: &str, prefix: &str) -> bool {
    filename.starts_with(&format!("{prefix}.")) && filename.ends_with(".json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sequence_number() {
        assert_eq!(
            parse_sequence_number(
                "dashboard-pre.2026-03-14-001.json",
                "dashboard-pre",
                "2026-03-14"
            ),
            Some(1)
        );
        assert_eq!(
            parse_sequence_number(
                "dashboard-pre.2026-03-14-042.json",
                "dashboard-pre",
                "2026-03-14"
            ),
            Some(42)
        );
        // Wrong prefix
        assert_eq!(
            parse_sequence_number(
                "something-else.2026-03-14-001.json",
                "dashboard-pre",
                "2026-03-14"
            ),
            None
        );
        // Wrong date
        assert_eq!(
            parse_sequence_number(
                "dashboard-pre.2026-03-13-001.json",
                "dashboard-pre",
                "2026-03-14"
            ),
            None
        );
    }

    #[test]
    fn test_is_backup_file() {
        assert!(is_backup_file(
            "dashboard-pre.2026-03-14-001.json",
            "dashboard-pre"
        ));
        assert!(!is_backup_file(
            "dashboard-pre.2026-03-14-001.json",
            "other-prefix"
        ));
        assert!(!is_backup_file("dashboard-pre.2026-03-14-001", "dashboard-pre"));
    }

    #[tokio::test]
    async fn test_save_json_rotates() {
        use tempfile::TempDir;
        let dir = TempDir::new().unwrap();
        let backup = Backup {
            backups_dir: dir.path().to_path_buf(),
            backup_copies: 2,
        };

        for i in 0..4u32 {
            backup.save_json(DASHBOARD_PRE, &vec![i]).await.unwrap();
        }

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("-003.json"));
        assert!(names[1].ends_with("-004.json"));
    }
}
