//! OpenWeather One Call adapter

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{RawAlert, SourceAdapter};
use crate::error::PipelineError;

pub const OPEN_WEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Default request timeout (milliseconds).
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Sender label when the provider omits one.
const DEFAULT_SENDER: &str = "Weather Service";

/// Alert entry in the One Call response.
#[derive(Debug, Deserialize)]
struct ProviderAlert {
    event: String,
    #[serde(default)]
    description: String,
    start: i64,
    end: i64,
    sender_name: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    #[serde(default)]
    alerts: Vec<ProviderAlert>,
}

pub struct OpenWeatherAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenWeatherAdapter {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: OPEN_WEATHER_BASE_URL.to_string(),
        })
    }

    /// Override the provider base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn normalize(alerts: Vec<ProviderAlert>) -> Option<Vec<RawAlert>> {
    if alerts.is_empty() {
        return None;
    }
    Some(
        alerts
            .into_iter()
            .map(|a| RawAlert {
                event: a.event,
                description: a.description,
                start: a.start,
                end: a.end,
                sender_name: a.sender_name.unwrap_or_else(|| DEFAULT_SENDER.to_string()),
                tags: a.tags,
            })
            .collect(),
    )
}

#[async_trait]
impl SourceAdapter for OpenWeatherAdapter {
    async fn fetch_alerts(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Vec<RawAlert>>, PipelineError> {
        let url = format!(
            "{}/onecall?lat={}&lon={}&exclude=minutely,hourly&units=metric&appid={}",
            self.base_url, latitude, longitude, self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "weather API status {}",
                response.status()
            )));
        }

        let body: OneCallResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("bad payload: {e}")))?;

        debug!(lat = latitude, lon = longitude, alerts = body.alerts.len(), "fetched provider alerts");
        Ok(normalize(body.alerts))
    }
}
