//! Pipeline failure taxonomy
//!
//! Nothing here is fatal to the process: the pipeline is re-invoked by
//! independent triggers, so a failed attempt self-heals on the next firing.

use thiserror::Error;

/// Failures surfaced by the alert pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The weather provider could not be reached or answered with an error.
    /// Aborts the trigger's batch; nothing was ingested.
    #[error("weather source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single alert's store write failed. The batch continues; the alert
    /// is reported as neither created nor updated.
    #[error("store write failed for {subscriber_id}/{alert_id}: {reason}")]
    StoreWriteFailure {
        subscriber_id: String,
        alert_id: String,
        reason: String,
    },

    /// Local notification delivery failed or timed out. Logged only; the
    /// store write it followed stays committed.
    #[error("notification delivery failed: {0}")]
    NotificationDeliveryFailure(String),

    /// No signed-in subscriber. Entry points treat this as a no-op.
    #[error("no active subscriber")]
    NoActiveSubscriber,
}
