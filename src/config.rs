//! Application configuration loaded from the environment

use anyhow::Result;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

use crate::ingest::scheduler::{
    DEFAULT_DISTANCE_THRESHOLD_KM, DEFAULT_MAX_DWELL, DEFAULT_PERIODIC_INTERVAL,
};
use crate::ingest::DEFAULT_NOTIFY_TIMEOUT_MS;
use crate::source::open_weather::DEFAULT_FETCH_TIMEOUT_MS;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// OpenWeather API key. Empty means the provider adapter cannot be built.
    pub api_key: String,
    /// Weather provider base URL (overridable for tests/proxies).
    pub base_url: String,
    /// Default subscriber id for CLI invocations. None means ingestion no-ops.
    pub subscriber_id: Option<String>,
    /// Directory holding feed snapshots and the notification journal.
    pub data_dir: PathBuf,
    /// Periodic trigger interval in seconds.
    pub periodic_interval_secs: u64,
    /// Location-change trigger distance threshold in kilometers.
    pub distance_threshold_km: f64,
    /// Location-change trigger maximum dwell in seconds.
    pub max_dwell_secs: u64,
    /// Weather provider request timeout in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Notification delivery timeout in milliseconds.
    pub notify_timeout_ms: u64,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let api_key = env::var("SAVIOUR_API_KEY").unwrap_or_default();
        let base_url = env::var("SAVIOUR_BASE_URL")
            .unwrap_or_else(|_| crate::source::open_weather::OPEN_WEATHER_BASE_URL.to_string());
        let subscriber_id = env::var("SAVIOUR_SUBSCRIBER").ok().filter(|s| !s.is_empty());

        let data_dir = env::var("SAVIOUR_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
                .join("saviour-alerts")
        });

        let periodic_interval_secs = env::var("SAVIOUR_PERIODIC_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PERIODIC_INTERVAL.as_secs());
        let distance_threshold_km = env::var("SAVIOUR_DISTANCE_THRESHOLD_KM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DISTANCE_THRESHOLD_KM);
        let max_dwell_secs = env::var("SAVIOUR_MAX_DWELL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_DWELL.as_secs());
        let fetch_timeout_ms = env::var("SAVIOUR_FETCH_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_MS);
        let notify_timeout_ms = env::var("SAVIOUR_NOTIFY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_NOTIFY_TIMEOUT_MS);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_key,
            base_url,
            subscriber_id,
            data_dir,
            periodic_interval_secs,
            distance_threshold_km,
            max_dwell_secs,
            fetch_timeout_ms,
            notify_timeout_ms,
            log_level,
        })
    }
}
