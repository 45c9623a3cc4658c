//! Sync orchestration: fetch snapshots upstream, append rows downstream.
//!
//! This module wires the API client and the vault writer together for one
//! run. The client stays strictly upstream and the writer strictly
//! downstream - backfill resolves every (date, snapshot) pair here before
//! the writer sees any of them.

use crate::client::{self, ApiClient};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use crate::writer::VaultWriter;
use chrono::{Datelike, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Behavior flags for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Resolve and render without writing to the vault.
    pub dry_run: bool,

    /// Fill missing days of the target month before the target date.
    pub backfill: bool,

    /// Show a progress bar during multi-day backfill fetches.
    pub show_progress: bool,
}

/// Result of one sync run.
#[derive(Debug)]
pub struct SyncOutcome {
    /// The target date that was synced.
    pub date: NaiveDate,

    /// The monthly file the run targeted.
    pub file: PathBuf,

    /// Rows committed (0 for a dry run).
    pub rows_written: usize,

    /// Rows skipped as duplicates during backfill.
    pub duplicates_skipped: usize,

    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Coordinates one sync run end to end.
pub struct SyncRunner {
    config: Arc<Config>,
    client: ApiClient,
    writer: VaultWriter,
}

impl SyncRunner {
    /// Create a new runner from validated configuration and an API token.
    pub fn new(config: Config, token: String) -> Result<Self> {
        let config = Arc::new(config);
        let client = ApiClient::new(Arc::clone(&config), token)?;
        let writer = VaultWriter::new(&config)?;

        Ok(Self {
            config,
            client,
            writer,
        })
    }

    /// Run one sync for the target date.
    pub async fn run(&self, target: NaiveDate, opts: RunOptions) -> Result<SyncOutcome> {
        let file = self.writer.month_file_path(target);

        let mut backfill_entries: Vec<(NaiveDate, MetricsSnapshot)> = Vec::new();
        if opts.backfill {
            backfill_entries = self.resolve_backfill(target, opts.show_progress).await?;
        }

        info!(date = %target, "Fetching metrics for target date");
        let snapshot = self.client.fetch_day(target).await?;

        if !client::validate_ranges(&snapshot) {
            warn!("Some metrics are outside expected ranges");
        }
        if snapshot.is_empty() {
            warn!(date = %target, "No scored records for this date yet");
        }

        if opts.dry_run {
            let row = self.writer.render_row(target, &snapshot);
            info!(file = %file.display(), "DRY RUN: would append to this file");
            info!(row, "DRY RUN: rendered row");
            return Ok(SyncOutcome {
                date: target,
                file,
                rows_written: 0,
                duplicates_skipped: 0,
                dry_run: true,
            });
        }

        let stats = self.writer.append_entries(&backfill_entries)?;

        // The target date keeps strict duplicate semantics: a second run on
        // the same day surfaces DuplicateEntry for the caller's benign-skip
        // handling instead of being silently absorbed.
        self.writer.append_snapshot(target, &snapshot)?;

        Ok(SyncOutcome {
            date: target,
            file,
            rows_written: stats.written + 1,
            duplicates_skipped: stats.skipped,
            dry_run: false,
        })
    }

    /// Fetch snapshots for every day of the target month, before the
    /// target date, that has no row yet.
    async fn resolve_backfill(
        &self,
        target: NaiveDate,
        show_progress: bool,
    ) -> Result<Vec<(NaiveDate, MetricsSnapshot)>> {
        let missing = self.missing_dates(target)?;
        if missing.is_empty() {
            info!("No missing days to backfill");
            return Ok(Vec::new());
        }

        info!(days = missing.len(), "Backfilling missing days");

        let progress = if show_progress && missing.len() > 1 {
            let pb = ProgressBar::new(missing.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} | {msg}")
                    .unwrap()
                    .progress_chars("█▓▒░"),
            );
            Some(pb)
        } else {
            None
        };

        let mut entries = Vec::with_capacity(missing.len());
        for date in missing {
            if let Some(pb) = &progress {
                pb.set_message(date.to_string());
            }
            let snapshot = self.client.fetch_day(date).await?;
            if snapshot.is_empty() {
                info!(date = %date, "No scored records, leaving day blank");
            }
            entries.push((date, snapshot));
            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }

        Ok(entries)
    }

    /// Days of the target month, strictly before the target date, with no
    /// row in the monthly file yet.
    fn missing_dates(&self, target: NaiveDate) -> Result<Vec<NaiveDate>> {
        let path = self.writer.month_file_path(target);
        let mut missing = Vec::new();

        for day in 1..target.day() {
            let date = target
                .with_day(day)
                .expect("days below the target day are valid");
            if !self.writer.is_duplicate(&path, date)? {
                missing.push(date);
            }
        }

        Ok(missing)
    }

    /// The configuration this runner was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
