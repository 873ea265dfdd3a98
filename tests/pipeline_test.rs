//! End-to-end pipeline behavior: idempotent ingestion, bounded retention,
//! read-state isolation, notification discipline, change-feed delivery, and
//! trigger scheduling against scripted collaborators.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use saviour_alerts::{
    AlertStore, AlertType, ChangeFeed, Coordinates, IngestionCoordinator, NotificationGateway,
    PipelineError, RawAlert, Severity, SourceAdapter, StaticLocationProvider,
    StaticSubscriberProvider, TriggerScheduler, MAX_FEED_SIZE,
};

/// Source returning a scripted batch, counting fetches, optionally failing.
struct ScriptedSource {
    alerts: Mutex<Vec<RawAlert>>,
    fetches: AtomicUsize,
    fail: AtomicBool,
}

impl ScriptedSource {
    fn new(alerts: Vec<RawAlert>) -> Self {
        Self {
            alerts: Mutex::new(alerts),
            fetches: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    async fn fetch_alerts(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> Result<Option<Vec<RawAlert>>, PipelineError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::SourceUnavailable("scripted outage".to_string()));
        }
        let alerts = self.alerts.lock().unwrap().clone();
        if alerts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(alerts))
        }
    }
}

/// Gateway recording every delivery attempt, optionally failing them all.
struct RecordingGateway {
    deliveries: Mutex<Vec<(String, String, serde_json::Value)>>,
    fail: AtomicBool,
}

impl RecordingGateway {
    fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    fn delivery_count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(
        &self,
        title: &str,
        body: &str,
        metadata: serde_json::Value,
    ) -> Result<(), PipelineError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string(), metadata));
        if self.fail.load(Ordering::SeqCst) {
            Err(PipelineError::NotificationDeliveryFailure(
                "scripted failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn raw(event: &str, start: i64) -> RawAlert {
    RawAlert {
        event: event.to_string(),
        description: format!("{event} in effect"),
        start,
        end: start + 3600,
        sender_name: "NWS".to_string(),
        tags: vec![],
    }
}

struct Pipeline {
    store: Arc<AlertStore>,
    changes: ChangeFeed,
    source: Arc<ScriptedSource>,
    gateway: Arc<RecordingGateway>,
    coordinator: Arc<IngestionCoordinator>,
}

fn pipeline_with(alerts: Vec<RawAlert>) -> Pipeline {
    let changes = ChangeFeed::new();
    let store = Arc::new(AlertStore::new(changes.clone()));
    let source = Arc::new(ScriptedSource::new(alerts));
    let gateway = Arc::new(RecordingGateway::new());
    let coordinator = Arc::new(IngestionCoordinator::new(
        store.clone(),
        source.clone(),
        gateway.clone(),
    ));
    Pipeline {
        store,
        changes,
        source,
        gateway,
        coordinator,
    }
}

#[tokio::test]
async fn test_ingestion_is_idempotent() {
    let batch = vec![
        raw("Flood Warning", 1000),
        raw("Tornado Watch", 1000),
        raw("Heat Advisory", 2000),
    ];
    let p = pipeline_with(vec![]);

    let first = p.coordinator.ingest("u1", &batch).await;
    assert_eq!(first.created.len(), 3);
    assert!(first.updated.is_empty());

    let second = p.coordinator.ingest("u1", &batch).await;
    assert!(second.created.is_empty());
    assert_eq!(second.updated, first.created);

    let listed = p.store.list("u1").await;
    assert_eq!(listed.len(), 3);
}

#[tokio::test]
async fn test_no_notification_on_update() {
    let p = pipeline_with(vec![]);
    let batch = vec![raw("Flood Warning", 1000)];

    p.coordinator.ingest("u1", &batch).await;
    assert_eq!(p.gateway.delivery_count(), 1);

    // Same batch again: update-only, no further deliveries
    p.coordinator.ingest("u1", &batch).await;
    assert_eq!(p.gateway.delivery_count(), 1);

    // A genuinely new raw item: exactly one more
    let extended = vec![raw("Flood Warning", 1000), raw("Ice Storm", 3000)];
    p.coordinator.ingest("u1", &extended).await;
    assert_eq!(p.gateway.delivery_count(), 2);
}

#[tokio::test]
async fn test_read_state_survives_reingestion() {
    let p = pipeline_with(vec![]);
    let batch = vec![raw("Flood Warning", 1000)];

    let result = p.coordinator.ingest("u1", &batch).await;
    let id = &result.created[0];

    p.store.mark_read("u1", id).await.unwrap();
    assert_eq!(p.store.count_unread("u1").await, 0);

    p.coordinator.ingest("u1", &batch).await;

    let listed = p.store.list("u1").await;
    assert!(listed[0].is_read);
    assert_eq!(p.store.count_unread("u1").await, 0);
}

#[tokio::test]
async fn test_twenty_one_alert_scenario() {
    let p = pipeline_with(vec![]);
    let batch: Vec<RawAlert> = (1..=21).map(|i| raw(&format!("a{i}"), 1000)).collect();

    let result = p.coordinator.ingest("u1", &batch).await;

    assert_eq!(result.created.len(), 21);
    assert_eq!(result.evicted, vec!["a1-1000-0".to_string()]);
    assert_eq!(p.gateway.delivery_count(), 21);

    let listed = p.store.list("u1").await;
    assert_eq!(listed.len(), MAX_FEED_SIZE);
    assert_eq!(listed[0].id, "a21-1000-20");
    assert!(!listed.iter().any(|a| a.id == "a1-1000-0"));
    assert_eq!(p.store.count_unread("u1").await, 20);

    // The mirror kept everything, including the evicted id
    assert_eq!(p.store.global_count().await, 21);
    assert!(p.store.global_alert("a1-1000-0").await.is_some());
}

#[tokio::test]
async fn test_gateway_failure_does_not_roll_back_ingestion() {
    let p = pipeline_with(vec![]);
    p.gateway.fail.store(true, Ordering::SeqCst);

    let result = p.coordinator.ingest("u1", &[raw("Flood Warning", 1000)]).await;

    assert_eq!(result.created.len(), 1);
    assert_eq!(p.gateway.delivery_count(), 1);
    assert_eq!(p.store.list("u1").await.len(), 1);
}

#[tokio::test]
async fn test_source_outage_aborts_batch() {
    let p = pipeline_with(vec![raw("Flood Warning", 1000)]);
    p.source.fail.store(true, Ordering::SeqCst);

    let location = Coordinates {
        latitude: 33.44,
        longitude: -94.04,
    };
    let err = p.coordinator.sync_at("u1", location).await.unwrap_err();
    assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    assert!(p.store.list("u1").await.is_empty());
}

#[tokio::test]
async fn test_sync_at_with_quiet_provider_is_empty() {
    let p = pipeline_with(vec![]);
    let location = Coordinates {
        latitude: 33.44,
        longitude: -94.04,
    };

    let result = p.coordinator.sync_at("u1", location).await.unwrap();
    assert!(result.created.is_empty());
    assert!(p.store.list("u1").await.is_empty());
    assert_eq!(p.source.fetch_count(), 1);
}

#[tokio::test]
async fn test_safety_tip_injection() {
    let p = pipeline_with(vec![]);

    let id = p
        .coordinator
        .add_safety_tip(
            "u1",
            "Earthquake preparedness",
            "Know your evacuation routes",
            vec!["Drop, cover, and hold on".to_string()],
        )
        .await
        .unwrap();

    let listed = p.store.list("u1").await;
    assert_eq!(listed.len(), 1);
    let tip = &listed[0];
    assert_eq!(tip.id, id);
    assert_eq!(tip.kind, AlertType::Safety);
    assert_eq!(tip.severity, Severity::Information);
    assert_eq!(tip.source, "Saviour App");
    assert_eq!(tip.areas, "General");
    assert_eq!(tip.safety_tips, vec!["Drop, cover, and hold on".to_string()]);

    let deliveries = p.gateway.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].2["alertId"], id.as_str());
}

#[tokio::test]
async fn test_change_feed_sees_each_commit_in_order() {
    let p = pipeline_with(vec![]);
    let mut subscription = p.changes.subscribe("u1").await;

    let batch = vec![raw("Flood Warning", 1000), raw("Ice Storm", 2000)];
    let result = p.coordinator.ingest("u1", &batch).await;

    // One full re-snapshot per committed upsert
    assert_eq!(subscription.recv().await.unwrap().len(), 1);
    assert_eq!(subscription.recv().await.unwrap().len(), 2);

    p.store.mark_read("u1", &result.created[0]).await.unwrap();
    let snapshot = subscription.recv().await.unwrap();
    assert_eq!(snapshot.iter().filter(|a| a.is_read).count(), 1);

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn test_change_feed_ignores_other_subscribers() {
    let p = pipeline_with(vec![]);
    let mut subscription = p.changes.subscribe("u2").await;

    p.coordinator.ingest("u1", &[raw("Flood Warning", 1000)]).await;
    p.coordinator.ingest("u2", &[raw("Ice Storm", 2000)]).await;

    let snapshot = subscription.recv().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, "ice-storm-2000-0");
}

#[tokio::test]
async fn test_scheduler_foreground_and_periodic_triggers() {
    let p = pipeline_with(vec![raw("Flood Warning", 1000)]);

    let subscribers = Arc::new(StaticSubscriberProvider::new(Some("u1".to_string())));
    let locations = Arc::new(StaticLocationProvider::new(Some(Coordinates {
        latitude: 33.44,
        longitude: -94.04,
    })));

    let scheduler = Arc::new(
        TriggerScheduler::new(p.coordinator.clone(), subscribers, locations)
            .with_periodic_interval(Duration::from_millis(50))
            .with_max_dwell(Duration::from_secs(60)),
    );

    let (foreground_tx, foreground_rx) = mpsc::unbounded_channel();
    let handles = scheduler.spawn(foreground_rx);

    foreground_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Foreground fired once, periodic at least once; feed converged to one alert
    assert!(p.source.fetch_count() >= 2);
    assert_eq!(p.store.list("u1").await.len(), 1);
    assert_eq!(p.gateway.delivery_count(), 1);

    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_scheduler_noops_without_subscriber() {
    let p = pipeline_with(vec![raw("Flood Warning", 1000)]);

    let subscribers = Arc::new(StaticSubscriberProvider::new(None));
    let locations = Arc::new(StaticLocationProvider::new(Some(Coordinates {
        latitude: 33.44,
        longitude: -94.04,
    })));

    let scheduler = Arc::new(
        TriggerScheduler::new(p.coordinator.clone(), subscribers, locations)
            .with_periodic_interval(Duration::from_millis(50))
            .with_max_dwell(Duration::from_secs(60)),
    );

    let (foreground_tx, foreground_rx) = mpsc::unbounded_channel();
    let handles = scheduler.spawn(foreground_rx);

    foreground_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(p.source.fetch_count(), 0);
    assert!(p.store.list("u1").await.is_empty());

    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_scheduler_noops_without_location() {
    let p = pipeline_with(vec![raw("Flood Warning", 1000)]);

    let subscribers = Arc::new(StaticSubscriberProvider::new(Some("u1".to_string())));
    let locations = Arc::new(StaticLocationProvider::new(None));

    let scheduler = Arc::new(
        TriggerScheduler::new(p.coordinator.clone(), subscribers, locations)
            .with_periodic_interval(Duration::from_millis(50))
            .with_max_dwell(Duration::from_secs(60)),
    );

    let (foreground_tx, foreground_rx) = mpsc::unbounded_channel();
    let handles = scheduler.spawn(foreground_rx);

    foreground_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(p.source.fetch_count(), 0);

    for handle in handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_location_trigger_honors_distance_threshold() {
    let p = pipeline_with(vec![raw("Flood Warning", 1000)]);

    let subscribers = Arc::new(StaticSubscriberProvider::new(Some("u1".to_string())));
    let locations = Arc::new(StaticLocationProvider::new(Some(Coordinates {
        latitude: 40.0,
        longitude: -70.0,
    })));

    let scheduler = Arc::new(
        TriggerScheduler::new(p.coordinator.clone(), subscribers, locations.clone())
            .with_periodic_interval(Duration::from_secs(600))
            .with_distance_threshold_km(5.0)
            .with_max_dwell(Duration::from_secs(600)),
    );

    let (_foreground_tx, foreground_rx) = mpsc::unbounded_channel::<()>();
    let handles = scheduler.spawn(foreground_rx);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // First reported position always fires
    locations.update(Coordinates {
        latitude: 40.0,
        longitude: -70.0,
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(p.source.fetch_count(), 1);

    // ~1 km shift: below threshold, no firing
    locations.update(Coordinates {
        latitude: 40.01,
        longitude: -70.0,
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(p.source.fetch_count(), 1);

    // ~11 km shift: fires
    locations.update(Coordinates {
        latitude: 40.1,
        longitude: -70.0,
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(p.source.fetch_count(), 2);

    for handle in handles {
        handle.abort();
    }
}
