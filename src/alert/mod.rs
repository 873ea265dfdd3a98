//! Alert domain: model, identity, classification, bounded store, change feed

pub mod annotator;
pub mod feed;
pub mod identity;
pub mod model;
pub mod store;

pub use annotator::{classify_severity, safety_tips};
pub use feed::{ChangeFeed, FeedSubscription};
pub use identity::alert_id;
pub use model::{Alert, AlertType, Severity};
pub use store::{AlertStore, FeedUpsert, MAX_FEED_SIZE};
