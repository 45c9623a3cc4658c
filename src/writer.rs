//! Monthly markdown file operations for the vault.
//!
//! The writer owns all mutations to month files: lazy file bootstrap with
//! the configured header, duplicate-date detection, row rendering, and the
//! atomic read-modify-rename commit. It never touches existing content
//! beyond appending rows, and it assumes single-writer access (the process
//! lock upstream enforces that).

use crate::config::{Config, ThresholdRange};
use crate::error::{Result, SyncError};
use crate::metrics::MetricsSnapshot;
use crate::table::TableSchema;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Counts returned by a multi-row append.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppendStats {
    /// Rows committed to the file.
    pub written: usize,
    /// Rows skipped because their date already had one.
    pub skipped: usize,
}

/// Handles writing metric rows to monthly files in the vault.
pub struct VaultWriter {
    vault: PathBuf,
    file_prefix: String,
    schema: TableSchema,
    thresholds: BTreeMap<String, ThresholdRange>,
    dedupe: bool,
}

impl VaultWriter {
    /// Create a new writer, validating the vault directory.
    pub fn new(config: &Config) -> Result<Self> {
        let vault = config.vault.path.clone();

        if !vault.exists() {
            return Err(SyncError::Vault(format!(
                "vault not found at {} - check vault.path in the config",
                vault.display()
            )));
        }
        if !vault.is_dir() {
            return Err(SyncError::Vault(format!(
                "vault path is not a directory: {}",
                vault.display()
            )));
        }

        Ok(Self {
            vault,
            file_prefix: config.vault.file_prefix.clone(),
            schema: config.table.clone(),
            thresholds: config.thresholds.clone(),
            dedupe: config.execution.deduplication,
        })
    }

    /// Path of the monthly file for a date. Pure mapping, no I/O.
    pub fn month_file_path(&self, date: NaiveDate) -> PathBuf {
        let month = month_name(date);
        self.vault
            .join(format!("{}-{}-{}.md", self.file_prefix, month, date.year()))
    }

    /// Create the monthly file with its header if absent.
    ///
    /// An existing file is never touched, whatever its content.
    pub fn ensure_file(&self, path: &Path, date: NaiveDate) -> Result<()> {
        if path.exists() {
            debug!(file = %path.display(), "Monthly file already exists");
            return Ok(());
        }

        info!(file = %path.display(), "Creating new monthly file");
        let content = self.schema.empty_file(&month_name(date), date.year());
        fs::write(path, content).map_err(|e| SyncError::TableFormat {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Whether a row for this date already exists in the file.
    pub fn is_duplicate(&self, path: &Path, date: NaiveDate) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }

        let content = fs::read_to_string(path).map_err(|e| SyncError::TableFormat {
            path: path.to_path_buf(),
            source: e,
        })?;

        let date_str = self.schema.format_date(date);
        let pattern = format!(r"\|\s*{}\s*\|", regex::escape(&date_str));
        let re = Regex::new(&pattern).expect("escaped date pattern is valid");

        Ok(re.is_match(&content))
    }

    /// Render the row this writer would append for a date and snapshot.
    pub fn render_row(&self, date: NaiveDate, snapshot: &MetricsSnapshot) -> String {
        self.schema.render_row(date, snapshot, &self.thresholds)
    }

    /// Append one metrics row for a date.
    ///
    /// Ensures the file, rejects duplicates when deduplication is enabled,
    /// and commits atomically. Returns the path written to.
    pub fn append_snapshot(&self, date: NaiveDate, snapshot: &MetricsSnapshot) -> Result<PathBuf> {
        let path = self.month_file_path(date);

        self.ensure_file(&path, date)?;

        // Advisory: a mismatched header is flagged but still writable.
        self.validate_structure(&path);

        if self.dedupe && self.is_duplicate(&path, date)? {
            return Err(SyncError::DuplicateEntry {
                date: date.format("%Y-%m-%d").to_string(),
                file: file_name(&path),
            });
        }

        let row = self.render_row(date, snapshot);
        self.commit_row(&path, &row)?;

        info!(date = %date, file = %file_name(&path), "Appended metrics row");
        Ok(path)
    }

    /// Append a resolved sequence of (date, snapshot) pairs.
    ///
    /// Duplicate dates are skipped benignly rather than failing the batch;
    /// any other error aborts. This is the backfill entry point - the
    /// caller resolves the snapshots, the writer stays offline.
    pub fn append_entries(&self, entries: &[(NaiveDate, MetricsSnapshot)]) -> Result<AppendStats> {
        let mut stats = AppendStats::default();

        for (date, snapshot) in entries {
            match self.append_snapshot(*date, snapshot) {
                Ok(_) => stats.written += 1,
                Err(e) if e.is_benign() => {
                    info!(date = %date, "Skipping duplicate entry");
                    stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(stats)
    }

    /// Commit a row via write-to-temp-then-rename.
    ///
    /// A crash before the rename leaves the original file untouched; the
    /// orphaned temp file is simply overwritten on the next run.
    fn commit_row(&self, path: &Path, row: &str) -> Result<()> {
        let io_err = |e: std::io::Error| SyncError::TableFormat {
            path: path.to_path_buf(),
            source: e,
        };

        let content = fs::read_to_string(path).map_err(io_err)?;
        let new_content = format!("{}\n{}\n", content.trim_end(), row);

        let temp_path = path.with_file_name(format!(".{}.tmp", file_name(path)));
        fs::write(&temp_path, &new_content).map_err(io_err)?;
        fs::rename(&temp_path, path).map_err(io_err)?;

        Ok(())
    }

    /// Check that the file's table header matches the configured schema.
    ///
    /// Scans for the first `|`-prefixed line followed by a separator line
    /// and compares its cell names, ordered, against the schema's column
    /// names. Mismatches are logged; the result is advisory only.
    pub fn validate_structure(&self, path: &Path) -> bool {
        let Ok(content) = fs::read_to_string(path) else {
            return false;
        };

        let lines: Vec<&str> = content.lines().collect();

        for (i, line) in lines.iter().enumerate() {
            if !line.trim_start().starts_with('|') {
                continue;
            }
            let Some(next) = lines.get(i + 1) else {
                break;
            };
            if !(next.contains('|') && next.contains('-')) {
                continue;
            }

            let found: Vec<&str> = line
                .split('|')
                .map(str::trim)
                .filter(|cell| !cell.is_empty())
                .collect();
            let expected = self.schema.column_names();

            if found != expected {
                warn!(
                    file = %file_name(path),
                    expected = ?expected,
                    found = ?found,
                    "Table structure mismatch"
                );
                return false;
            }
            return true;
        }

        warn!(file = %file_name(path), "No table found in monthly file");
        false
    }
}

/// Full English month name for a date.
fn month_name(date: NaiveDate) -> String {
    date.format("%B").to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use tempfile::TempDir;

    fn test_writer(vault: &TempDir) -> VaultWriter {
        VaultWriter::new(&test_config(vault.path())).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            sleep_score: Some(85.0),
            recovery_score: Some(72.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_vault_rejected() {
        let vault = TempDir::new().unwrap();
        let mut config = test_config(vault.path());
        config.vault.path = vault.path().join("nope");
        assert!(matches!(
            VaultWriter::new(&config),
            Err(SyncError::Vault(_))
        ));
    }

    #[test]
    fn test_vault_path_must_be_directory() {
        let vault = TempDir::new().unwrap();
        let file = vault.path().join("file.md");
        fs::write(&file, "x").unwrap();
        let mut config = test_config(vault.path());
        config.vault.path = file;
        assert!(matches!(
            VaultWriter::new(&config),
            Err(SyncError::Vault(_))
        ));
    }

    #[test]
    fn test_month_file_path() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let path = writer.month_file_path(date(2024, 12, 5));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "health-December-2024.md"
        );
        assert_eq!(path.parent().unwrap(), vault.path());
    }

    #[test]
    fn test_ensure_file_idempotent() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let d = date(2024, 12, 5);
        let path = writer.month_file_path(d);

        writer.ensure_file(&path, d).unwrap();
        let first = fs::read_to_string(&path).unwrap();

        writer.ensure_file(&path, d).unwrap();
        let second = fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with("# Health Metrics - December 2024\n\n"));
        assert!(first.contains("| Date | Sleep Score | Recovery | Notes |"));
    }

    #[test]
    fn test_ensure_file_preserves_existing_content() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let d = date(2024, 12, 5);
        let path = writer.month_file_path(d);

        fs::write(&path, "totally custom content, not even a table").unwrap();
        writer.ensure_file(&path, d).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "totally custom content, not even a table"
        );
    }

    #[test]
    fn test_is_duplicate() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let d = date(2024, 12, 5);
        let path = writer.month_file_path(d);

        fs::write(
            &path,
            "# Health Metrics - December 2024\n\n\
             | Date | Sleep Score | Recovery | Notes |\n\
             |----|-----------|--------|-----|\n\
             | 12/05 | 85 | 72 |  |\n",
        )
        .unwrap();

        assert!(writer.is_duplicate(&path, d).unwrap());
        assert!(!writer.is_duplicate(&path, date(2024, 12, 6)).unwrap());
    }

    #[test]
    fn test_is_duplicate_missing_file() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let path = writer.month_file_path(date(2024, 12, 5));
        assert!(!writer.is_duplicate(&path, date(2024, 12, 5)).unwrap());
    }

    #[test]
    fn test_append_round_trip() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let d = date(2024, 12, 5);

        let path = writer.append_snapshot(d, &snapshot()).unwrap();
        let content = fs::read_to_string(&path).unwrap();

        let expected = format!(
            "{}| 12/05 | 85 | 72 |  |\n",
            writer.schema.empty_file("December", 2024)
        );
        assert_eq!(content, expected);

        // No temp file left behind.
        let temp = path.with_file_name(".health-December-2024.md.tmp");
        assert!(!temp.exists());
    }

    #[test]
    fn test_duplicate_rejected_then_skipped() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let d = date(2024, 12, 5);

        writer.append_snapshot(d, &snapshot()).unwrap();
        let err = writer.append_snapshot(d, &snapshot()).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateEntry { .. }));
        assert_eq!(err.exit_code(), 0);

        let content = fs::read_to_string(writer.month_file_path(d)).unwrap();
        assert_eq!(content.matches("| 12/05 |").count(), 1);
    }

    #[test]
    fn test_dedupe_disabled_allows_repeat_rows() {
        let vault = TempDir::new().unwrap();
        let mut config = test_config(vault.path());
        config.execution.deduplication = false;
        let writer = VaultWriter::new(&config).unwrap();
        let d = date(2024, 12, 5);

        writer.append_snapshot(d, &snapshot()).unwrap();
        writer.append_snapshot(d, &snapshot()).unwrap();

        let content = fs::read_to_string(writer.month_file_path(d)).unwrap();
        assert_eq!(content.matches("| 12/05 |").count(), 2);
    }

    #[test]
    fn test_append_entries_skips_duplicates() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);

        writer.append_snapshot(date(2024, 12, 4), &snapshot()).unwrap();

        let entries = vec![
            (date(2024, 12, 3), snapshot()),
            (date(2024, 12, 4), snapshot()),
            (date(2024, 12, 5), snapshot()),
        ];
        let stats = writer.append_entries(&entries).unwrap();

        assert_eq!(stats.written, 2);
        assert_eq!(stats.skipped, 1);

        let content = fs::read_to_string(writer.month_file_path(date(2024, 12, 5))).unwrap();
        assert_eq!(content.matches("| 12/03 |").count(), 1);
        assert_eq!(content.matches("| 12/04 |").count(), 1);
        assert_eq!(content.matches("| 12/05 |").count(), 1);
    }

    #[test]
    fn test_append_preserves_prior_rows() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);

        writer.append_snapshot(date(2024, 12, 4), &snapshot()).unwrap();
        let before = fs::read_to_string(writer.month_file_path(date(2024, 12, 4))).unwrap();

        writer.append_snapshot(date(2024, 12, 5), &snapshot()).unwrap();
        let after = fs::read_to_string(writer.month_file_path(date(2024, 12, 5))).unwrap();

        assert_eq!(after, format!("{}| 12/05 | 85 | 72 |  |\n", before));
    }

    #[test]
    fn test_validate_structure_fresh_file() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let d = date(2024, 12, 5);
        let path = writer.month_file_path(d);

        writer.ensure_file(&path, d).unwrap();
        assert!(writer.validate_structure(&path));
    }

    #[test]
    fn test_validate_structure_mismatched_header() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let path = writer.month_file_path(date(2024, 12, 5));

        fs::write(
            &path,
            "# Health Metrics - December 2024\n\n\
             | Date | Different Column | Recovery | Notes |\n\
             |----|----------------|--------|-----|\n",
        )
        .unwrap();

        assert!(!writer.validate_structure(&path));
    }

    #[test]
    fn test_validate_structure_no_table() {
        let vault = TempDir::new().unwrap();
        let writer = test_writer(&vault);
        let path = writer.month_file_path(date(2024, 12, 5));

        fs::write(&path, "# Just a heading\n\nsome prose\n").unwrap();
        assert!(!writer.validate_structure(&path));
        assert!(!writer.validate_structure(&vault.path().join("absent.md")));
    }
}
