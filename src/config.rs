//! Minimal runtime configuration helpers.
//! Cadences and the retention window are tunable; derivation thresholds are
//! policy constants in `rules` and deliberately not configurable.

use std::time::Duration;

pub const DEFAULT_POLL_SECS: u64 = 5;
pub const DEFAULT_SWEEP_SECS: u64 = 86_400;
pub const DEFAULT_RETENTION_DAYS: i64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote telemetry/event store, no trailing slash.
    pub store_url: String,
    /// Detection polling cadence.
    pub poll_interval: Duration,
    /// Minimum spacing between retention sweeps.
    pub sweep_interval: Duration,
    /// Maximum age of a history record before it is eligible for deletion.
    pub retention_days: i64,
    /// Upper bound on any single blocking store request.
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let store_url = match std::env::var("STORE_URL") {
            Ok(v) if !v.trim().is_empty() => v.trim().trim_end_matches('/').to_string(),
            _ => {
                return Err(
                    "Missing store URL: set STORE_URL to the telemetry store base URL".to_string(),
                );
            }
        };

        let poll_secs = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_SECS);

        let sweep_secs = std::env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SWEEP_SECS);

        let retention_days = std::env::var("RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_RETENTION_DAYS);

        let timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        Ok(Config {
            store_url,
            poll_interval: Duration::from_secs(poll_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
            retention_days,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
