//! Configuration management for Vital Sync.
//!
//! Supports configuration via a YAML file with CLI argument and
//! environment variable overrides, validated with sensible defaults.

use crate::error::{Result, SyncError};
use crate::table::TableSchema;
use clap::Parser;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the upstream bearer token.
pub const API_TOKEN_ENV: &str = "VITALS_API_TOKEN";

/// Environment variable pointing at the config file.
pub const CONFIG_PATH_ENV: &str = "VITALS_CONFIG_PATH";

/// CLI arguments for the Vital Sync client.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vitals",
    version,
    about = "Sync daily health metrics into monthly markdown logs",
    long_about = "Vital Sync fetches sleep, recovery and strain records from a\n\
                  wellness API and appends one table row per day to a monthly\n\
                  markdown file inside your vault, with deduplication and\n\
                  atomic writes.",
    after_help = "EXAMPLES:\n    \
        vitals --config config.yaml\n    \
        vitals --date 2024-12-05 --dry-run\n    \
        vitals --backfill --no-progress"
)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "VITALS_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Sync a specific date (YYYY-MM-DD) instead of today;
    /// requires execution.allow_historical
    #[arg(short, long)]
    pub date: Option<chrono::NaiveDate>,

    /// Fill missing days of the target month before appending today's row
    #[arg(short, long)]
    pub backfill: bool,

    /// Simulate the sync without writing to the vault
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "VITALS_VERBOSE")]
    pub verbose: bool,

    /// Output logs as JSON
    #[arg(long, env = "VITALS_JSON_LOGS")]
    pub json_logs: bool,

    /// Disable the backfill progress bar
    #[arg(long, env = "VITALS_NO_PROGRESS")]
    pub no_progress: bool,
}

impl Args {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the metrics API.
    pub base_url: String,

    /// Metric keys to sync (must be non-empty).
    pub metrics: Vec<String>,

    /// Per-request timeout in seconds (1-300).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Client-side request rate cap, per second.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_rate_limit() -> u32 {
    4
}

impl ApiConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Rate limit as a `NonZeroU32` for the limiter quota.
    pub fn rate_limit_nonzero(&self) -> NonZeroU32 {
        NonZeroU32::new(self.rate_limit).unwrap_or(NonZeroU32::MIN)
    }
}

/// Vault (target directory) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Absolute path to the vault directory.
    pub path: PathBuf,

    /// File name prefix for monthly files (alphanumeric, dash, underscore).
    pub file_prefix: String,
}

/// Threshold bands for one metric, used for row decoration.
///
/// Each band is an inclusive `[low, high]` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRange {
    /// Band rendered with a green indicator.
    pub green: [f64; 2],

    /// Band rendered with a yellow indicator.
    pub yellow: [f64; 2],

    /// Band rendered with a red indicator.
    pub red: [f64; 2],
}

impl ThresholdRange {
    /// Indicator for a value, checked green, then yellow, then red.
    pub fn indicator(&self, value: f64) -> Option<&'static str> {
        let in_band = |band: &[f64; 2]| band[0] <= value && value <= band[1];
        if in_band(&self.green) {
            Some("\u{1F7E2}")
        } else if in_band(&self.yellow) {
            Some("\u{1F7E1}")
        } else if in_band(&self.red) {
            Some("\u{1F534}")
        } else {
            None
        }
    }
}

/// Scheduling configuration.
///
/// The run time is validated here; installing the OS-level schedule is an
/// external concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Daily run time in `HH:MM` 24-hour format.
    pub run_time: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_time: "07:30".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (`debug`, `info`, `warn`, `error`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file destination.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Rotate the log file daily.
    #[serde(default = "default_true")]
    pub rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
            rotation: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("logs/vitals.log")
}

fn default_true() -> bool {
    true
}

/// Execution behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Allow syncing dates other than today via `--date`.
    #[serde(default)]
    pub allow_historical: bool,

    /// Reject rows for dates that already have one.
    #[serde(default = "default_true")]
    pub deduplication: bool,

    /// Fill missing days of the target month before the target date.
    #[serde(default)]
    pub backfill: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            allow_historical: false,
            deduplication: true,
            backfill: false,
        }
    }
}

/// Retry configuration for the HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per request.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    pub max_backoff: Duration,

    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_multiplier() -> f64 {
    2.0
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream API settings.
    pub api: ApiConfig,

    /// Vault settings.
    pub vault: VaultConfig,

    /// Table schema for monthly files.
    pub table: TableSchema,

    /// Optional per-metric threshold bands for row decoration.
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdRange>,

    /// Scheduled run time.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Execution flags.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::ConfigFileRead {
            path: path.clone(),
            source: e,
        })?;

        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| SyncError::ConfigParse {
                path: path.clone(),
                source: e,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Resolve the config path from CLI args, environment, or the default.
    pub fn resolve_path(args: &Args) -> PathBuf {
        args.config.clone().unwrap_or_else(|| {
            std::env::var(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.yaml"))
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(SyncError::Config("api.base_url cannot be empty".into()));
        }
        if self.api.metrics.is_empty() {
            return Err(SyncError::Config("api.metrics cannot be empty".into()));
        }
        if !(1..=300).contains(&self.api.timeout_seconds) {
            return Err(SyncError::Config(
                "api.timeout_seconds must be between 1 and 300".into(),
            ));
        }
        if self.api.rate_limit == 0 {
            return Err(SyncError::Config("api.rate_limit must be at least 1".into()));
        }

        if !self.vault.path.is_absolute() {
            return Err(SyncError::Config(
                "vault.path must be an absolute path".into(),
            ));
        }
        let prefix_re = Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex");
        if !prefix_re.is_match(&self.vault.file_prefix) {
            return Err(SyncError::Config(
                "vault.file_prefix must contain only alphanumeric characters, \
                 dashes, and underscores"
                    .into(),
            ));
        }

        self.table.validate().map_err(SyncError::Config)?;

        let time_re = Regex::new(r"^([0-1][0-9]|2[0-3]):[0-5][0-9]$").expect("static regex");
        if !time_re.is_match(&self.schedule.run_time) {
            return Err(SyncError::Config(
                "schedule.run_time must be in HH:MM format (24-hour)".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

/// Read the API bearer token from the environment.
pub fn api_token() -> Result<String> {
    std::env::var(API_TOKEN_ENV).map_err(|_| {
        SyncError::Config(format!(
            "{API_TOKEN_ENV} environment variable is not set - export it with \
             your wellness API bearer token"
        ))
    })
}

/// Custom serde module for humantime Duration parsing.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Simple parsing: support "30s", "100ms", or just seconds as number
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
