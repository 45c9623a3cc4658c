//! HTTP client for the wellness API with retry and rate-limit handling.
//!
//! This module provides the upstream transport: authenticated GET requests
//! with automatic retries, `Retry-After` aware 429 handling, and a
//! client-side request rate cap.

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::metrics::{
    CollectionResponse, CycleRecord, MetricsSnapshot, RecoveryRecord, SleepRecord,
};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Page-size limit for collection requests; one day of records fits easily.
const WINDOW_LIMIT: u32 = 10;

/// Maximum error-body length carried into error messages.
const ERROR_BODY_LIMIT: usize = 500;

/// Client for the wellness metrics API.
pub struct ApiClient {
    client: Client,
    config: Arc<Config>,
    token: String,
    limiter: DefaultDirectRateLimiter,
}

impl ApiClient {
    /// Create a new API client.
    pub fn new(config: Arc<Config>, token: String) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(config.api.timeout())
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(SyncError::Http)?;

        let limiter = RateLimiter::direct(Quota::per_second(config.api.rate_limit_nonzero()));

        Ok(Self {
            client,
            config,
            token,
            limiter,
        })
    }

    /// Issue a GET request with retries.
    ///
    /// Retries up to `retry.max_attempts` on connection failure, timeout,
    /// and HTTP 429. A 429 honors the `Retry-After` header when present and
    /// falls back to deterministic exponential backoff. 401 fails
    /// immediately as an authentication error; any other error status fails
    /// immediately as an API error.
    pub async fn request(&self, path: &str, query: &[(String, String)]) -> Result<serde_json::Value> {
        let url = format!(
            "{}/{}",
            self.config.api.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let max_attempts = self.config.retry.max_attempts;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            self.limiter.until_ready().await;

            debug!(url = %url, attempt = attempts, max_attempts, "Sending request");

            let response = match self
                .client
                .get(&url)
                .query(query)
                .bearer_auth(&self.token)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempts < max_attempts {
                        let backoff = self.transport_backoff(attempts);
                        warn!(
                            attempt = attempts,
                            max_attempts,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Transport error, retrying"
                        );
                        sleep(backoff).await;
                        continue;
                    }
                    return Err(SyncError::RetriesExhausted {
                        path: path.to_string(),
                        attempts,
                    });
                }
                Err(e) => return Err(SyncError::Http(e)),
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let backoff = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.rate_limit_backoff(attempts));
                warn!(
                    attempt = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "Rate limited by API, backing off"
                );
                sleep(backoff).await;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED {
                return Err(SyncError::Auth);
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Api {
                    status: status.as_u16(),
                    body: truncate_body(&body),
                });
            }

            return response.json().await.map_err(|e| {
                SyncError::InvalidResponse(format!("failed to decode response from '{path}': {e}"))
            });
        }

        Err(SyncError::RetriesExhausted {
            path: path.to_string(),
            attempts,
        })
    }

    /// Fetch sleep activities within a window.
    pub async fn sleep_collection(&self, start: &str, end: &str) -> Result<Vec<SleepRecord>> {
        let query = window_query(start, end);
        let data = self.request("v2/activity/sleep", &query).await?;
        parse_records(data, "sleep")
    }

    /// Fetch recovery records within a window.
    pub async fn recovery_collection(&self, start: &str, end: &str) -> Result<Vec<RecoveryRecord>> {
        let query = window_query(start, end);
        let data = self.request("v2/recovery", &query).await?;
        parse_records(data, "recovery")
    }

    /// Fetch physiological cycles within a window.
    pub async fn cycle_collection(&self, start: &str, end: &str) -> Result<Vec<CycleRecord>> {
        let query = window_query(start, end);
        let data = self.request("v2/cycle", &query).await?;
        parse_records(data, "cycle")
    }

    /// Fetch the three collections for the half-open window `[start, end)`
    /// and fold the most relevant record of each into one snapshot.
    ///
    /// Per collection the first fully scored record wins; for sleep, naps
    /// are skipped when selecting the main entry. Empty collections leave
    /// the corresponding fields `None` - absent data is not an error.
    pub async fn fetch_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MetricsSnapshot> {
        let start_iso = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_iso = end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut snapshot = MetricsSnapshot {
            timestamp: Some(start_iso.clone()),
            ..Default::default()
        };

        let sleeps = self.sleep_collection(&start_iso, &end_iso).await?;
        if let Some(main_sleep) = sleeps.iter().find(|s| s.is_scored_main_sleep()) {
            snapshot.sleep_duration_minutes = main_sleep.duration_minutes();
            if let Some(score) = &main_sleep.score {
                snapshot.sleep_score = score.sleep_performance_percentage;
            }
        }

        let recoveries = self.recovery_collection(&start_iso, &end_iso).await?;
        if let Some(recovery) = recoveries.iter().find(|r| r.is_scored()) {
            if let Some(score) = &recovery.score {
                snapshot.recovery_score = score.recovery_score;
                snapshot.hrv = score.hrv_rmssd_milli;
            }
        }

        let cycles = self.cycle_collection(&start_iso, &end_iso).await?;
        if let Some(cycle) = cycles.iter().find(|c| c.is_scored()) {
            if let Some(score) = &cycle.score {
                snapshot.strain_score = score.strain;
            }
        }

        Ok(snapshot)
    }

    /// Fetch metrics for one calendar day (UTC midnight to midnight).
    pub async fn fetch_day(&self, date: NaiveDate) -> Result<MetricsSnapshot> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + chrono::Duration::days(1);
        self.fetch_window(start, end).await
    }

    /// Deterministic exponential backoff for 429 responses without a
    /// `Retry-After` header.
    fn rate_limit_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.retry.initial_backoff.as_millis() as f64;
        let backoff_ms = base * self.config.retry.multiplier.powi(attempt as i32 - 1);
        Duration::from_millis(
            (backoff_ms as u64).min(self.config.retry.max_backoff.as_millis() as u64),
        )
    }

    /// Jittered exponential backoff for connection failures and timeouts.
    fn transport_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.retry.initial_backoff.as_millis() as f64;
        let backoff_ms = base * self.config.retry.multiplier.powi(attempt as i32 - 1);

        // Add jitter (±25%)
        let jitter = 1.0 + (rand::random::<f64>() - 0.5) * 0.5;
        let final_ms = (backoff_ms * jitter) as u64;

        Duration::from_millis(final_ms.min(self.config.retry.max_backoff.as_millis() as u64))
    }
}

/// Advisory plausibility check for a fetched snapshot.
///
/// Out-of-band values are logged and make the result false; this never
/// blocks the write.
pub fn validate_ranges(snapshot: &MetricsSnapshot) -> bool {
    const BANDS: &[(&str, f64, f64)] = &[
        ("sleep_score", 0.0, 100.0),
        ("recovery_score", 0.0, 100.0),
        ("strain_score", 0.0, 21.0),
        ("sleep_duration", 0.0, 1440.0),
        ("hrv", 0.0, 300.0),
    ];

    let mut all_valid = true;
    for (key, min, max) in BANDS {
        if let Some(value) = snapshot.metric(key) {
            if value < *min || value > *max {
                warn!(
                    metric = key,
                    value,
                    min,
                    max,
                    "Metric is outside the expected range"
                );
                all_valid = false;
            }
        }
    }
    all_valid
}

fn window_query(start: &str, end: &str) -> Vec<(String, String)> {
    vec![
        ("start".to_string(), start.to_string()),
        ("end".to_string(), end.to_string()),
        ("limit".to_string(), WINDOW_LIMIT.to_string()),
    ]
}

fn parse_records<T: DeserializeOwned>(data: serde_json::Value, what: &str) -> Result<Vec<T>> {
    let response: CollectionResponse<T> = serde_json::from_value(data).map_err(|e| {
        SyncError::InvalidResponse(format!("failed to decode {what} records: {e}"))
    })?;
    Ok(response.records)
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() > ERROR_BODY_LIMIT {
        let truncated: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        format!("{truncated}...")
    } else {
        body.to_string()
    }
}
