//! Metric snapshot and upstream record types.
//!
//! This module defines the data structures for the wellness API's wire
//! format and the normalized snapshot the rest of the application consumes.

use serde::{Deserialize, Serialize};

/// Known metric keys, in the order they are documented.
pub const METRIC_KEYS: &[&str] = &[
    "sleep_score",
    "sleep_duration",
    "recovery_score",
    "strain_score",
    "hrv",
];

/// One immutable bundle of optional health metrics for a time window.
///
/// Every field is independently optional: partial data is valid and renders
/// as blank table cells, never as an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Sleep performance percentage (0-100).
    pub sleep_score: Option<f64>,

    /// Main sleep duration in minutes.
    pub sleep_duration_minutes: Option<i64>,

    /// Recovery score percentage (0-100).
    pub recovery_score: Option<f64>,

    /// Day strain (0-21 scale).
    pub strain_score: Option<f64>,

    /// Heart rate variability (RMSSD) in milliseconds.
    pub hrv: Option<f64>,

    /// Reference instant of the observation window (RFC 3339).
    pub timestamp: Option<String>,
}

impl MetricsSnapshot {
    /// Look up a metric value by its configured key.
    ///
    /// The mapping is explicit over the known metric set; unknown keys
    /// resolve to `None` rather than panicking or guessing.
    pub fn metric(&self, key: &str) -> Option<f64> {
        match key {
            "sleep_score" => self.sleep_score,
            "sleep_duration" => self.sleep_duration_minutes.map(|m| m as f64),
            "recovery_score" => self.recovery_score,
            "strain_score" => self.strain_score,
            "hrv" => self.hrv,
            _ => None,
        }
    }

    /// True when no metric field carries a value.
    pub fn is_empty(&self) -> bool {
        METRIC_KEYS.iter().all(|key| self.metric(key).is_none())
    }
}

/// Scoring state indicating the upstream finished computing a record.
pub const SCORE_STATE_SCORED: &str = "SCORED";

/// Generic collection envelope returned by every metrics resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct CollectionResponse<T> {
    /// Records within the requested window, newest first.
    #[serde(default)]
    pub records: Vec<T>,
}

/// One sleep activity record.
#[derive(Debug, Clone, Deserialize)]
pub struct SleepRecord {
    /// Activity start (RFC 3339).
    pub start: Option<chrono::DateTime<chrono::Utc>>,

    /// Activity end (RFC 3339).
    pub end: Option<chrono::DateTime<chrono::Utc>>,

    /// Whether this activity was a nap rather than main sleep.
    #[serde(default)]
    pub nap: bool,

    /// Scoring state (`SCORED`, `PENDING_SCORE`, `UNSCORABLE`).
    #[serde(default)]
    pub score_state: String,

    /// Computed score, present once the record is scored.
    pub score: Option<SleepScore>,
}

impl SleepRecord {
    /// Whether this is the fully scored main (non-nap) sleep entry.
    pub fn is_scored_main_sleep(&self) -> bool {
        !self.nap && self.score_state == SCORE_STATE_SCORED
    }

    /// Duration of the activity in whole minutes, when both bounds exist.
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end > start => {
                Some((end - start).num_minutes())
            }
            _ => None,
        }
    }
}

/// Score payload for a sleep record.
#[derive(Debug, Clone, Deserialize)]
pub struct SleepScore {
    /// Sleep performance percentage.
    pub sleep_performance_percentage: Option<f64>,

    /// Sleep efficiency percentage.
    pub sleep_efficiency_percentage: Option<f64>,
}

/// One recovery record.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryRecord {
    /// Scoring state (`SCORED`, `PENDING_SCORE`, `UNSCORABLE`).
    #[serde(default)]
    pub score_state: String,

    /// Computed score, present once the record is scored.
    pub score: Option<RecoveryScore>,
}

impl RecoveryRecord {
    /// Whether the upstream finished scoring this record.
    pub fn is_scored(&self) -> bool {
        self.score_state == SCORE_STATE_SCORED
    }
}

/// Score payload for a recovery record.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryScore {
    /// Recovery score percentage.
    pub recovery_score: Option<f64>,

    /// Heart rate variability (RMSSD) in milliseconds.
    pub hrv_rmssd_milli: Option<f64>,

    /// Resting heart rate in bpm.
    pub resting_heart_rate: Option<f64>,

    /// Blood oxygen saturation percentage.
    pub spo2_percentage: Option<f64>,
}

/// One physiological cycle record (source of day strain).
#[derive(Debug, Clone, Deserialize)]
pub struct CycleRecord {
    /// Scoring state (`SCORED`, `PENDING_SCORE`, `UNSCORABLE`).
    #[serde(default)]
    pub score_state: String,

    /// Computed score, present once the record is scored.
    pub score: Option<CycleScore>,
}

impl CycleRecord {
    /// Whether the upstream finished scoring this record.
    pub fn is_scored(&self) -> bool {
        self.score_state == SCORE_STATE_SCORED
    }
}

/// Score payload for a cycle record.
#[derive(Debug, Clone, Deserialize)]
pub struct CycleScore {
    /// Day strain on the 0-21 scale.
    pub strain: Option<f64>,

    /// Average heart rate across the cycle in bpm.
    pub average_heart_rate: Option<f64>,

    /// Maximum heart rate across the cycle in bpm.
    pub max_heart_rate: Option<f64>,

    /// Energy expenditure in kilojoules.
    pub kilojoule: Option<f64>,
}
