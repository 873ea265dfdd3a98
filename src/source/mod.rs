//! Weather provider boundary
//!
//! `SourceAdapter` is the seam between the pipeline and whatever service
//! reports hazards. Adapters normalize provider payloads into `RawAlert`s;
//! everything downstream is provider-agnostic.

pub mod open_weather;

use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One hazard notice as handed over by the provider. Ephemeral: the pipeline
/// derives a persisted `Alert` from it and never stores it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAlert {
    /// Event name, e.g. "Flood Warning". Drives identity and classification.
    pub event: String,
    pub description: String,
    /// Provider start/end times, epoch seconds.
    pub start: i64,
    pub end: i64,
    pub sender_name: String,
    pub tags: Vec<String>,
}

impl RawAlert {
    /// Human-readable area description, joined from the tag list.
    pub fn areas(&self) -> String {
        if self.tags.is_empty() {
            "Your area".to_string()
        } else {
            self.tags.join(", ")
        }
    }
}

/// A geographic position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Fetches active hazard notices for a position.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// `Ok(None)` means the provider answered but reports no active alerts.
    /// `Err(SourceUnavailable)` aborts the trigger's batch.
    async fn fetch_alerts(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Vec<RawAlert>>, PipelineError>;
}
