//! # Vital Sync
//!
//! Sync daily health metrics from a wellness API into monthly markdown logs.
//!
//! Vital Sync fetches sleep, recovery and strain records over HTTPS,
//! normalizes them into one snapshot per day, and appends a table row to a
//! monthly markdown file inside a vault directory - with deduplication,
//! idempotent file bootstrap, and atomic commits.
//!
//! ## Features
//!
//! - **Retry & Backoff**: `Retry-After` aware 429 handling plus jittered
//!   exponential backoff for transient transport failures
//! - **Deduplication**: at most one row per calendar date per file
//! - **Atomic Commits**: write-to-temp-then-rename, never a half-written file
//! - **Backfill**: fill missing days of the month from resolved snapshots
//! - **Run Lock**: overlapping scheduled runs skip benignly
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vital_sync::{Config, RunOptions, SyncRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"config.yaml".into())?;
//!     let token = vital_sync::config::api_token()?;
//!
//!     let runner = SyncRunner::new(config, token)?;
//!     let today = chrono::Local::now().date_naive();
//!     let outcome = runner.run(today, RunOptions::default()).await?;
//!
//!     println!("wrote {} row(s) to {}", outcome.rows_written, outcome.file.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Configuration lives in a YAML file (`--config`, `VITALS_CONFIG_PATH`, or
//! `config.yaml`); the API bearer token comes from `VITALS_API_TOKEN`.
//! See [`Config`] for all available options.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod sync;
pub mod table;
pub mod writer;

// Re-exports for convenience
pub use client::ApiClient;
pub use config::{Args, Config, RetryConfig, ThresholdRange};
pub use error::{Result, SyncError};
pub use lock::LockHandle;
pub use metrics::MetricsSnapshot;
pub use sync::{RunOptions, SyncOutcome, SyncRunner};
pub use table::{Alignment, ColumnKind, ColumnSpec, TableSchema};
pub use writer::VaultWriter;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
