//! Persisted alert entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an alert came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    /// Produced by the weather ingestion pipeline.
    Weather,
    Disaster,
    /// Internally generated safety tip.
    Safety,
}

/// Severity classification, derived from the alert title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Extreme,
    Warning,
    Watch,
    Information,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Extreme => "extreme",
            Severity::Warning => "warning",
            Severity::Watch => "watch",
            Severity::Information => "information",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reconciled hazard alert.
///
/// The same record is written to the unbounded global mirror and, with
/// `user_id` set, denormalized into each subscriber's bounded feed. `is_read`
/// is meaningful only on the per-subscriber copy and survives re-ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Deterministic id, see `alert::identity`.
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub severity: Severity,
    /// Provenance label, e.g. "OpenWeather" or "Saviour App".
    pub source: String,
    /// Free-text area description.
    pub areas: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Assigned at ingestion time, not provider time. Eviction order key.
    pub created_at: DateTime<Utc>,
    pub safety_tips: Vec<String>,
    /// False on creation; flips true exactly once via mark_read.
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}
