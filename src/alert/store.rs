//! Alert store - unbounded global mirror + bounded per-subscriber feeds
//!
//! Feed invariant: a subscriber's feed never holds more than `MAX_FEED_SIZE`
//! alerts; overflow evicts oldest-by-`created_at`. The upsert-check-evict
//! sequence runs under one per-subscriber mutex, so concurrent triggers
//! cannot corrupt the feed or double-count the bound. Distinct subscribers
//! never contend. The global mirror takes keyed insert-or-replace writes only
//! and is never evicted here.
//!
//! Durability: each subscriber's feed is snapshotted to
//! `<dir>/<subscriber>.json` (temp file + atomic rename under an exclusive
//! lock) and lazily reloaded on first touch. In-memory mode skips all of it.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::feed::ChangeFeed;
use super::model::Alert;
use crate::error::PipelineError;

/// Maximum alerts retained per subscriber.
pub const MAX_FEED_SIZE: usize = 20;

/// One feed row. `seq` is the write order, used only to break `created_at`
/// ties deterministically (same-millisecond inserts within one batch).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeedEntry {
    alert: Alert,
    seq: u64,
}

#[derive(Debug, Clone, Default)]
struct FeedState {
    entries: HashMap<String, FeedEntry>,
    next_seq: u64,
    loaded: bool,
}

/// Outcome of a feed upsert.
#[derive(Debug, Clone)]
pub struct FeedUpsert {
    /// True when the id was previously unseen for this subscriber.
    pub created: bool,
    /// Ids evicted to restore the capacity bound.
    pub evicted: Vec<String>,
}

pub struct AlertStore {
    global: RwLock<HashMap<String, Alert>>,
    feeds: RwLock<HashMap<String, Arc<Mutex<FeedState>>>>,
    changes: ChangeFeed,
    persist_dir: Option<PathBuf>,
}

impl AlertStore {
    /// In-memory store (tests, ephemeral runs).
    pub fn new(changes: ChangeFeed) -> Self {
        Self {
            global: RwLock::new(HashMap::new()),
            feeds: RwLock::new(HashMap::new()),
            changes,
            persist_dir: None,
        }
    }

    /// Store with write-through feed snapshots under `dir`.
    pub fn with_data_dir(changes: ChangeFeed, dir: impl Into<PathBuf>) -> Self {
        Self {
            global: RwLock::new(HashMap::new()),
            feeds: RwLock::new(HashMap::new()),
            changes,
            persist_dir: Some(dir.into()),
        }
    }

    /// Idempotent insert-or-replace into the global mirror.
    pub async fn upsert_global(&self, alert: &Alert) {
        let mut stored = alert.clone();
        stored.user_id = None;
        self.global.write().await.insert(stored.id.clone(), stored);
    }

    pub async fn global_alert(&self, alert_id: &str) -> Option<Alert> {
        self.global.read().await.get(alert_id).cloned()
    }

    pub async fn global_count(&self) -> usize {
        self.global.read().await.len()
    }

    /// Insert-or-replace into the subscriber's feed, preserving `is_read` on
    /// replace, then evict down to `MAX_FEED_SIZE`. Atomic per subscriber.
    pub async fn upsert_subscriber_feed(
        &self,
        subscriber_id: &str,
        alert: &Alert,
    ) -> Result<FeedUpsert, PipelineError> {
        let handle = self.feed_handle(subscriber_id).await;
        let mut state = handle.lock().await;
        self.ensure_loaded(subscriber_id, &mut state);

        let mut next = state.clone();
        let mut stored = alert.clone();
        stored.user_id = Some(subscriber_id.to_string());

        let created = match next.entries.get(&alert.id) {
            Some(existing) => {
                stored.is_read = existing.alert.is_read;
                false
            }
            None => {
                stored.is_read = false;
                true
            }
        };

        let seq = next.next_seq;
        next.next_seq += 1;
        next.entries.insert(stored.id.clone(), FeedEntry { alert: stored, seq });
        let evicted = evict_over_capacity(&mut next);

        self.persist(subscriber_id, &next)
            .map_err(|e| PipelineError::StoreWriteFailure {
                subscriber_id: subscriber_id.to_string(),
                alert_id: alert.id.clone(),
                reason: e.to_string(),
            })?;

        *state = next;
        self.changes.publish(subscriber_id, snapshot(&state));
        Ok(FeedUpsert { created, evicted })
    }

    /// Flip `is_read` to true. No-op (not an error) when the alert is absent
    /// or already read; there is no true-to-false transition.
    pub async fn mark_read(
        &self,
        subscriber_id: &str,
        alert_id: &str,
    ) -> Result<(), PipelineError> {
        let handle = self.feed_handle(subscriber_id).await;
        let mut state = handle.lock().await;
        self.ensure_loaded(subscriber_id, &mut state);

        match state.entries.get(alert_id) {
            None => {
                debug!(subscriber_id, alert_id, "mark_read on absent alert, ignoring");
                return Ok(());
            }
            Some(entry) if entry.alert.is_read => return Ok(()),
            Some(_) => {}
        }

        let mut next = state.clone();
        if let Some(entry) = next.entries.get_mut(alert_id) {
            entry.alert.is_read = true;
        }

        self.persist(subscriber_id, &next)
            .map_err(|e| PipelineError::StoreWriteFailure {
                subscriber_id: subscriber_id.to_string(),
                alert_id: alert_id.to_string(),
                reason: e.to_string(),
            })?;

        *state = next;
        self.changes.publish(subscriber_id, snapshot(&state));
        Ok(())
    }

    /// The subscriber's feed, descending by `created_at`.
    pub async fn list(&self, subscriber_id: &str) -> Vec<Alert> {
        let handle = self.feed_handle(subscriber_id).await;
        let mut state = handle.lock().await;
        self.ensure_loaded(subscriber_id, &mut state);
        snapshot(&state)
    }

    pub async fn count_unread(&self, subscriber_id: &str) -> usize {
        let handle = self.feed_handle(subscriber_id).await;
        let mut state = handle.lock().await;
        self.ensure_loaded(subscriber_id, &mut state);
        state.entries.values().filter(|e| !e.alert.is_read).count()
    }

    async fn feed_handle(&self, subscriber_id: &str) -> Arc<Mutex<FeedState>> {
        {
            let feeds = self.feeds.read().await;
            if let Some(handle) = feeds.get(subscriber_id) {
                return handle.clone();
            }
        }
        let mut feeds = self.feeds.write().await;
        feeds
            .entry(subscriber_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(FeedState::default())))
            .clone()
    }

    /// Lazy snapshot reload, once per subscriber. A corrupt or unreadable
    /// snapshot starts the feed empty rather than failing reads.
    fn ensure_loaded(&self, subscriber_id: &str, state: &mut FeedState) {
        if state.loaded {
            return;
        }
        state.loaded = true;

        let Some(path) = self.feed_path(subscriber_id) else {
            return;
        };
        if !path.exists() {
            return;
        }

        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<FeedEntry>>(&content) {
                Ok(entries) => {
                    for entry in entries {
                        state.next_seq = state.next_seq.max(entry.seq + 1);
                        state.entries.insert(entry.alert.id.clone(), entry);
                    }
                }
                Err(e) => {
                    warn!(subscriber_id, error = %e, "corrupt feed snapshot, starting empty")
                }
            },
            Err(e) => warn!(subscriber_id, error = %e, "unreadable feed snapshot, starting empty"),
        }
    }

    fn feed_path(&self, subscriber_id: &str) -> Option<PathBuf> {
        let dir = self.persist_dir.as_ref()?;
        let safe: String = subscriber_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Some(dir.join(format!("{safe}.json")))
    }

    fn persist(&self, subscriber_id: &str, state: &FeedState) -> anyhow::Result<()> {
        let Some(path) = self.feed_path(subscriber_id) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut entries: Vec<&FeedEntry> = state.entries.values().collect();
        entries.sort_by_key(|e| e.seq);

        // Lock the target, write a temp file, rename over it
        let file = OpenOptions::new().create(true).write(true).open(&path)?;
        file.lock_exclusive()?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&entries)?)?;
        fs::rename(&tmp, &path)?;
        file.unlock()?;
        Ok(())
    }
}

/// Ordered view of a feed, newest first.
fn snapshot(state: &FeedState) -> Vec<Alert> {
    let mut entries: Vec<&FeedEntry> = state.entries.values().collect();
    entries.sort_by(|a, b| (b.alert.created_at, b.seq).cmp(&(a.alert.created_at, a.seq)));
    entries.into_iter().map(|e| e.alert.clone()).collect()
}

/// Evict oldest-by-`created_at` (write order breaks ties) until the bound
/// holds. Returns evicted ids.
fn evict_over_capacity(state: &mut FeedState) -> Vec<String> {
    if state.entries.len() <= MAX_FEED_SIZE {
        return Vec::new();
    }

    let mut order: Vec<(DateTime<Utc>, u64, String)> = state
        .entries
        .values()
        .map(|e| (e.alert.created_at, e.seq, e.alert.id.clone()))
        .collect();
    order.sort();

    let excess = state.entries.len() - MAX_FEED_SIZE;
    order
        .into_iter()
        .take(excess)
        .map(|(_, _, id)| {
            state.entries.remove(&id);
            id
        })
        .collect()
}
