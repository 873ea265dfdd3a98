//! Saviour Alerts - weather hazard alert synchronization
//!
//! Ingests hazard notices from a weather provider, reconciles them into a
//! bounded per-subscriber feed plus an unbounded global mirror, fans out
//! committed mutations to live observers, and journals local notifications.
//! Three independent triggers (foreground, periodic, location change) may
//! race on the same feed; per-subscriber serialization lives in the store.

pub mod alert;
pub mod config;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod source;

pub use alert::annotator::{classify_severity, safety_tips};
pub use alert::feed::{ChangeFeed, FeedSubscription};
pub use alert::identity::alert_id;
pub use alert::model::{Alert, AlertType, Severity};
pub use alert::store::{AlertStore, FeedUpsert, MAX_FEED_SIZE};
pub use config::AppConfig;
pub use error::PipelineError;
pub use ingest::scheduler::{
    haversine_km, LocationProvider, StaticLocationProvider, StaticSubscriberProvider,
    SubscriberProvider, TriggerKind, TriggerScheduler,
};
pub use ingest::{IngestResult, IngestionCoordinator};
pub use notify::{LocalNotificationGateway, NotificationGateway, NotificationRecord};
pub use source::open_weather::OpenWeatherAdapter;
pub use source::{Coordinates, RawAlert, SourceAdapter};
