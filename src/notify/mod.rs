//! Local notification delivery
//!
//! The pipeline sees notifications as a fire-and-forget capability behind
//! `NotificationGateway`. The local gateway journals every delivery to a
//! JSONL file so the CLI (and tests) can read back what was surfaced to the
//! subscriber.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::error::PipelineError;

/// Delivers one local notification. Failures are reported, never retried
/// here; the coordinator logs them and moves on.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(
        &self,
        title: &str,
        body: &str,
        metadata: serde_json::Value,
    ) -> Result<(), PipelineError>;
}

/// Journaled delivery record (JSONL row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub ts: DateTime<Utc>,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

const MAX_RECORDS: usize = 200;
const KEEP_AFTER_CLEANUP: usize = 100;
const CLEANUP_CHECK_INTERVAL: usize = 10;
static WRITE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Gateway writing to a local JSONL journal.
pub struct LocalNotificationGateway {
    path: PathBuf,
}

impl LocalNotificationGateway {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default journal location under the user config directory.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("saviour-alerts")
            .join("notifications.jsonl")
    }

    fn append(&self, record: &NotificationRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;
        let mut file = file;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        file.unlock()?;

        self.maybe_cleanup();
        Ok(())
    }

    /// Most recent `n` journal rows, oldest first.
    pub fn read_recent(&self, n: usize) -> Vec<NotificationRecord> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let reader = BufReader::new(file);
        let records: Vec<NotificationRecord> = reader
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }

    fn maybe_cleanup(&self) {
        let count = WRITE_COUNT.fetch_add(1, Ordering::Relaxed);
        if count % CLEANUP_CHECK_INTERVAL != 0 {
            return;
        }

        let records = self.read_recent(usize::MAX);
        if records.len() > MAX_RECORDS {
            let _ = self.rewrite_keeping(KEEP_AFTER_CLEANUP);
        }
    }

    fn rewrite_keeping(&self, keep: usize) -> anyhow::Result<()> {
        let file = File::open(&self.path)?;
        file.lock_exclusive()?;

        let to_keep = self.read_recent(keep);
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut tmp_file = File::create(&tmp)?;
            for record in &to_keep {
                writeln!(tmp_file, "{}", serde_json::to_string(record)?)?;
            }
        }
        fs::rename(&tmp, &self.path)?;

        file.unlock()?;
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for LocalNotificationGateway {
    fn name(&self) -> &str {
        "local"
    }

    async fn deliver(
        &self,
        title: &str,
        body: &str,
        metadata: serde_json::Value,
    ) -> Result<(), PipelineError> {
        let record = NotificationRecord {
            ts: Utc::now(),
            title: title.to_string(),
            body: body.to_string(),
            metadata,
        };

        self.append(&record)
            .map_err(|e| PipelineError::NotificationDeliveryFailure(e.to_string()))?;

        debug!(gateway = "local", title, "notification journaled");
        Ok(())
    }
}
