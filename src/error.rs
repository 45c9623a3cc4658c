//! Custom error types for Vital Sync.
//!
//! This module defines all error types used throughout the application,
//! following Rust best practices with `thiserror` for library errors.
//! Each variant maps to a distinct process exit code so scheduled runs
//! can be triaged from the scheduler log alone.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum SyncError {
    /// Bad or missing configuration (file, field, or API token).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    ConfigFileRead {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as YAML.
    #[error("failed to parse config file '{path}': {source}")]
    ConfigParse {
        /// Path to the file that could not be parsed.
        path: PathBuf,
        /// The underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// Upstream rejected the bearer token (HTTP 401). Never retried.
    #[error("authentication failed - check VITALS_API_TOKEN")]
    Auth,

    /// Upstream returned a non-success, non-retryable status.
    #[error("API returned status {status}: {body}")]
    Api {
        /// HTTP status code returned.
        status: u16,
        /// Response body content (truncated).
        body: String,
    },

    /// Transient transport failures exhausted the retry budget.
    #[error("request to '{path}' failed after {attempts} attempts")]
    RetriesExhausted {
        /// Request path that kept failing.
        path: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// HTTP transport failure outside the retryable set.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to decode an upstream response body.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Vault directory is missing or not a directory.
    #[error("vault error: {0}")]
    Vault(String),

    /// A row for this date already exists. Benign - the caller skips.
    #[error("entry for {date} already exists in {file}")]
    DuplicateEntry {
        /// The date that already has a row.
        date: String,
        /// File name holding the existing row.
        file: String,
    },

    /// I/O failure while reading or committing a month file.
    #[error("failed to write table file '{path}': {source}")]
    TableFormat {
        /// Path to the file being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or remove the lock file.
    #[error("lock file error at '{path}': {source}")]
    Lock {
        /// Path to the lock file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Map an error to the process exit code contract.
    ///
    /// 0 = success or benign skip, 1 = configuration/vault error,
    /// 2 = authentication failure, 3 = other API failure,
    /// 4 = unexpected/application error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DuplicateEntry { .. } => 0,
            Self::Config(_) | Self::ConfigFileRead { .. } | Self::ConfigParse { .. } => 1,
            Self::Vault(_) => 1,
            Self::Auth => 2,
            Self::Api { .. } | Self::RetriesExhausted { .. } | Self::Http(_) => 3,
            Self::InvalidResponse(_) => 3,
            Self::TableFormat { .. } | Self::Lock { .. } => 4,
        }
    }

    /// Whether this error is an expected, non-fatal outcome.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::DuplicateEntry { .. })
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
