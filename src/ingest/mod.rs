//! Ingestion coordination
//!
//! One trigger firing becomes one `sync_at` call: fetch the provider batch,
//! then for each raw alert derive identity, annotate, upsert into the global
//! mirror and the subscriber's feed, and notify on creation. Failures stay
//! local: a dead notification never rolls back a store write, a failed store
//! write skips only that alert, and committed writes are never compensated.

pub mod scheduler;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::alert::annotator::{classify_severity, safety_tips};
use crate::alert::identity::alert_id;
use crate::alert::model::{Alert, AlertType, Severity};
use crate::alert::store::AlertStore;
use crate::error::PipelineError;
use crate::notify::NotificationGateway;
use crate::source::{Coordinates, RawAlert, SourceAdapter};

/// Default notification delivery timeout (milliseconds).
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 5_000;

/// What one ingestion batch did.
#[derive(Debug, Clone, Default)]
pub struct IngestResult {
    /// Ids newly created for this subscriber (one notification each).
    pub created: Vec<String>,
    /// Ids that already existed and were refreshed in place.
    pub updated: Vec<String>,
    /// Ids evicted to hold the feed bound.
    pub evicted: Vec<String>,
}

pub struct IngestionCoordinator {
    store: Arc<AlertStore>,
    source: Arc<dyn SourceAdapter>,
    gateway: Arc<dyn NotificationGateway>,
    notify_timeout: Duration,
}

impl IngestionCoordinator {
    pub fn new(
        store: Arc<AlertStore>,
        source: Arc<dyn SourceAdapter>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            store,
            source,
            gateway,
            notify_timeout: Duration::from_millis(DEFAULT_NOTIFY_TIMEOUT_MS),
        }
    }

    pub fn with_notify_timeout(mut self, notify_timeout: Duration) -> Self {
        self.notify_timeout = notify_timeout;
        self
    }

    /// Fetch the provider batch for a position and ingest it. A provider
    /// failure aborts the whole batch; nothing was written.
    pub async fn sync_at(
        &self,
        subscriber_id: &str,
        location: Coordinates,
    ) -> Result<IngestResult, PipelineError> {
        let raw = self
            .source
            .fetch_alerts(location.latitude, location.longitude)
            .await?;

        match raw {
            Some(alerts) if !alerts.is_empty() => Ok(self.ingest(subscriber_id, &alerts).await),
            _ => {
                debug!(subscriber_id, "no active alerts for location");
                Ok(IngestResult::default())
            }
        }
    }

    /// Ingest one raw batch for a subscriber. Input order drives identity;
    /// per-alert failures skip that alert and the batch continues.
    pub async fn ingest(&self, subscriber_id: &str, raw_alerts: &[RawAlert]) -> IngestResult {
        let mut result = IngestResult::default();

        for (index, raw) in raw_alerts.iter().enumerate() {
            let id = alert_id(&raw.event, raw.start, index);
            let alert = build_alert(&id, raw);

            self.store.upsert_global(&alert).await;

            let upsert = match self.store.upsert_subscriber_feed(subscriber_id, &alert).await {
                Ok(upsert) => upsert,
                Err(e) => {
                    warn!(alert_id = %id, error = %e, "feed write failed, skipping alert");
                    continue;
                }
            };

            result.evicted.extend(upsert.evicted);
            if upsert.created {
                result.created.push(id);
                self.deliver_notification(&alert).await;
            } else {
                result.updated.push(id);
            }
        }

        debug!(
            subscriber_id,
            created = result.created.len(),
            updated = result.updated.len(),
            evicted = result.evicted.len(),
            "batch ingested"
        );
        result
    }

    /// Inject an internally produced safety tip into the subscriber's feed.
    pub async fn add_safety_tip(
        &self,
        subscriber_id: &str,
        title: &str,
        description: &str,
        tips: Vec<String>,
    ) -> Result<String, PipelineError> {
        let now = Utc::now();
        let id = format!("safety-tip-{}", now.timestamp_millis());

        let alert = Alert {
            id: id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            kind: AlertType::Safety,
            severity: Severity::Information,
            source: "Saviour App".to_string(),
            areas: "General".to_string(),
            start_time: now,
            end_time: now + chrono::Duration::days(7),
            created_at: now,
            safety_tips: tips,
            is_read: false,
            user_id: None,
        };

        self.store.upsert_subscriber_feed(subscriber_id, &alert).await?;
        self.deliver_notification(&alert).await;
        Ok(id)
    }

    /// Fire-and-forget delivery with an independent timeout. Failure is
    /// logged; the store write it follows stays committed.
    async fn deliver_notification(&self, alert: &Alert) {
        let metadata = serde_json::json!({ "alertId": alert.id });
        match timeout(
            self.notify_timeout,
            self.gateway.deliver(&alert.title, &alert.description, metadata),
        )
        .await
        {
            Ok(Ok(())) => debug!(alert_id = %alert.id, "notification delivered"),
            Ok(Err(e)) => warn!(alert_id = %alert.id, error = %e, "notification delivery failed"),
            Err(_) => warn!(
                alert_id = %alert.id,
                timeout_ms = self.notify_timeout.as_millis() as u64,
                "notification delivery timed out"
            ),
        }
    }
}

/// Canonical persisted alert from a raw provider record.
fn build_alert(id: &str, raw: &RawAlert) -> Alert {
    Alert {
        id: id.to_string(),
        title: raw.event.clone(),
        description: raw.description.clone(),
        kind: AlertType::Weather,
        severity: classify_severity(&raw.event),
        source: "OpenWeather".to_string(),
        areas: raw.areas(),
        start_time: DateTime::from_timestamp(raw.start, 0).unwrap_or_else(Utc::now),
        end_time: DateTime::from_timestamp(raw.end, 0).unwrap_or_else(Utc::now),
        created_at: Utc::now(),
        safety_tips: safety_tips(&raw.event),
        is_read: false,
        user_id: None,
    }
}
