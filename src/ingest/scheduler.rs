//! Trigger scheduling
//!
//! Three independent event sources drive ingestion: the app coming to the
//! foreground, a periodic tick, and subscriber movement. Each firing runs in
//! its own task; nothing here serializes triggers against each other — that
//! is the store's per-subscriber write discipline. A trigger without a
//! signed-in subscriber or a known location is a no-op, not an error.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

use super::IngestionCoordinator;
use crate::source::Coordinates;

/// Default periodic trigger interval: 15 minutes.
pub const DEFAULT_PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// Default movement threshold for the location trigger: 5 km.
pub const DEFAULT_DISTANCE_THRESHOLD_KM: f64 = 5.0;
/// Default maximum dwell before the location trigger fires anyway: 30 min.
pub const DEFAULT_MAX_DWELL: Duration = Duration::from_secs(30 * 60);

/// Which event source fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Foreground,
    Periodic,
    LocationChange,
}

/// Supplies the signed-in subscriber, if any.
pub trait SubscriberProvider: Send + Sync {
    fn current_subscriber(&self) -> Option<String>;
}

/// Supplies positions on demand and a movement stream for the location
/// trigger.
pub trait LocationProvider: Send + Sync {
    fn current_location(&self) -> Option<Coordinates>;
    fn watch_locations(&self) -> mpsc::UnboundedReceiver<Coordinates>;
}

/// Settable provider backed by plain state. Used by the CLI (fixed position,
/// configured subscriber) and by tests as a controllable stand-in.
pub struct StaticLocationProvider {
    current: StdMutex<Option<Coordinates>>,
    watchers: StdMutex<Vec<mpsc::UnboundedSender<Coordinates>>>,
}

impl StaticLocationProvider {
    pub fn new(initial: Option<Coordinates>) -> Self {
        Self {
            current: StdMutex::new(initial),
            watchers: StdMutex::new(Vec::new()),
        }
    }

    /// Set the position and feed every live watcher.
    pub fn update(&self, coords: Coordinates) {
        *self.current.lock().unwrap() = Some(coords);
        self.watchers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(coords).is_ok());
    }
}

impl LocationProvider for StaticLocationProvider {
    fn current_location(&self) -> Option<Coordinates> {
        *self.current.lock().unwrap()
    }

    fn watch_locations(&self) -> mpsc::UnboundedReceiver<Coordinates> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().unwrap().push(tx);
        rx
    }
}

pub struct StaticSubscriberProvider {
    current: StdMutex<Option<String>>,
}

impl StaticSubscriberProvider {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            current: StdMutex::new(initial),
        }
    }

    pub fn set(&self, subscriber_id: Option<String>) {
        *self.current.lock().unwrap() = subscriber_id;
    }
}

impl SubscriberProvider for StaticSubscriberProvider {
    fn current_subscriber(&self) -> Option<String> {
        self.current.lock().unwrap().clone()
    }
}

pub struct TriggerScheduler {
    coordinator: Arc<IngestionCoordinator>,
    subscribers: Arc<dyn SubscriberProvider>,
    locations: Arc<dyn LocationProvider>,
    periodic_interval: Duration,
    distance_threshold_km: f64,
    max_dwell: Duration,
}

impl TriggerScheduler {
    pub fn new(
        coordinator: Arc<IngestionCoordinator>,
        subscribers: Arc<dyn SubscriberProvider>,
        locations: Arc<dyn LocationProvider>,
    ) -> Self {
        Self {
            coordinator,
            subscribers,
            locations,
            periodic_interval: DEFAULT_PERIODIC_INTERVAL,
            distance_threshold_km: DEFAULT_DISTANCE_THRESHOLD_KM,
            max_dwell: DEFAULT_MAX_DWELL,
        }
    }

    pub fn with_periodic_interval(mut self, interval: Duration) -> Self {
        self.periodic_interval = interval;
        self
    }

    pub fn with_distance_threshold_km(mut self, km: f64) -> Self {
        self.distance_threshold_km = km;
        self
    }

    pub fn with_max_dwell(mut self, dwell: Duration) -> Self {
        self.max_dwell = dwell;
        self
    }

    /// Start the three trigger tasks. `foreground` carries "app became
    /// visible" events from the embedding surface.
    pub fn spawn(self: Arc<Self>, foreground: mpsc::UnboundedReceiver<()>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().run_foreground(foreground)),
            tokio::spawn(self.clone().run_periodic()),
            tokio::spawn(self.run_location_watch()),
        ]
    }

    async fn run_foreground(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<()>) {
        while events.recv().await.is_some() {
            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.fire(TriggerKind::Foreground).await });
        }
        debug!("foreground event stream closed, stopping foreground trigger");
    }

    async fn run_periodic(self: Arc<Self>) {
        let mut ticker = interval_at(Instant::now() + self.periodic_interval, self.periodic_interval);
        loop {
            ticker.tick().await;
            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.fire(TriggerKind::Periodic).await });
        }
    }

    async fn run_location_watch(self: Arc<Self>) {
        let mut updates = self.locations.watch_locations();
        let mut last_fired_at: Option<Coordinates> = None;
        let mut last_fire = Instant::now();

        loop {
            let remaining = self
                .max_dwell
                .checked_sub(last_fire.elapsed())
                .unwrap_or(Duration::ZERO);

            match timeout(remaining, updates.recv()).await {
                Ok(Some(coords)) => {
                    let moved = match last_fired_at {
                        Some(prev) => {
                            haversine_km(prev, coords) >= self.distance_threshold_km
                        }
                        None => true,
                    };
                    if moved {
                        last_fired_at = Some(coords);
                        last_fire = Instant::now();
                        let scheduler = self.clone();
                        tokio::spawn(async move {
                            scheduler.fire(TriggerKind::LocationChange).await
                        });
                    }
                }
                Ok(None) => {
                    debug!("location stream closed, stopping location trigger");
                    break;
                }
                Err(_) => {
                    // Dwell elapsed without qualifying movement
                    last_fire = Instant::now();
                    if let Some(coords) = self.locations.current_location() {
                        last_fired_at = Some(coords);
                    }
                    let scheduler = self.clone();
                    tokio::spawn(async move { scheduler.fire(TriggerKind::LocationChange).await });
                }
            }
        }
    }

    async fn fire(&self, trigger: TriggerKind) {
        let Some(subscriber_id) = self.subscribers.current_subscriber() else {
            debug!(?trigger, "no active subscriber, trigger is a no-op");
            return;
        };
        let Some(location) = self.locations.current_location() else {
            debug!(?trigger, "no location available, trigger is a no-op");
            return;
        };

        match self.coordinator.sync_at(&subscriber_id, location).await {
            Ok(result) => info!(
                ?trigger,
                subscriber_id = %subscriber_id,
                created = result.created.len(),
                updated = result.updated.len(),
                evicted = result.evicted.len(),
                "trigger ingestion complete"
            ),
            Err(e) => warn!(?trigger, error = %e, "trigger ingestion aborted"),
        }
    }
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two positions.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}
