//! Change feed - fan-out of committed feed mutations to live observers
//!
//! Writers publish a subscriber's full re-snapshot after each committed
//! mutation. Publishing pushes onto an internal unbounded queue and returns
//! immediately; a dispatch task forwards snapshots to observers, so a slow
//! observer never blocks the store's write path. Per subscriber, delivery
//! order equals commit order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::model::Alert;

type ObserverMap = HashMap<String, HashMap<u64, mpsc::UnboundedSender<Vec<Alert>>>>;

struct FeedUpdate {
    subscriber_id: String,
    snapshot: Vec<Alert>,
}

/// Publish/subscribe channel for per-subscriber feed snapshots.
#[derive(Clone)]
pub struct ChangeFeed {
    updates: mpsc::UnboundedSender<FeedUpdate>,
    observers: Arc<RwLock<ObserverMap>>,
    next_observer_id: Arc<AtomicU64>,
}

impl ChangeFeed {
    /// Create the feed and spawn its dispatch task. Requires a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<FeedUpdate>();
        let observers: Arc<RwLock<ObserverMap>> = Arc::new(RwLock::new(HashMap::new()));

        let dispatch = observers.clone();
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                let mut closed = Vec::new();
                {
                    let map = dispatch.read().await;
                    if let Some(subs) = map.get(&update.subscriber_id) {
                        for (observer_id, sender) in subs {
                            if sender.send(update.snapshot.clone()).is_err() {
                                closed.push(*observer_id);
                            }
                        }
                    }
                }
                // Prune observers whose receivers are gone
                if !closed.is_empty() {
                    let mut map = dispatch.write().await;
                    if let Some(subs) = map.get_mut(&update.subscriber_id) {
                        for observer_id in closed {
                            subs.remove(&observer_id);
                        }
                        if subs.is_empty() {
                            map.remove(&update.subscriber_id);
                        }
                    }
                }
            }
        });

        Self {
            updates: tx,
            observers,
            next_observer_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue a committed snapshot for delivery. Never blocks.
    pub(crate) fn publish(&self, subscriber_id: &str, snapshot: Vec<Alert>) {
        let update = FeedUpdate {
            subscriber_id: subscriber_id.to_string(),
            snapshot,
        };
        if self.updates.send(update).is_err() {
            debug!("change feed dispatch task gone, dropping update");
        }
    }

    /// Register an observer for one subscriber's feed.
    pub async fn subscribe(&self, subscriber_id: &str) -> FeedSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer_id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .write()
            .await
            .entry(subscriber_id.to_string())
            .or_default()
            .insert(observer_id, tx);

        FeedSubscription {
            observer_id,
            subscriber_id: subscriber_id.to_string(),
            updates: rx,
            observers: self.observers.clone(),
        }
    }

    /// Live observers for a subscriber.
    pub async fn observer_count(&self, subscriber_id: &str) -> usize {
        self.observers
            .read()
            .await
            .get(subscriber_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}

/// Handle returned by `subscribe`: receives snapshots, unsubscribes on demand.
pub struct FeedSubscription {
    observer_id: u64,
    subscriber_id: String,
    updates: mpsc::UnboundedReceiver<Vec<Alert>>,
    observers: Arc<RwLock<ObserverMap>>,
}

impl FeedSubscription {
    /// Next committed snapshot; `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Vec<Alert>> {
        self.updates.recv().await
    }

    /// Stop further deliveries. Idempotent; other observers are unaffected.
    pub async fn unsubscribe(&self) {
        let mut map = self.observers.write().await;
        if let Some(subs) = map.get_mut(&self.subscriber_id) {
            subs.remove(&self.observer_id);
            if subs.is_empty() {
                map.remove(&self.subscriber_id);
            }
        }
    }
}
