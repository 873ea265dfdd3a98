//! Saviour Alerts CLI
//!
//! Runs the trigger scheduler as a long-lived watch process and exposes
//! one-shot maintenance commands against the local alert store.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use saviour_alerts::{
    classify_severity, safety_tips, AlertStore, AppConfig, ChangeFeed, Coordinates,
    IngestionCoordinator, LocalNotificationGateway, OpenWeatherAdapter, PipelineError,
    StaticLocationProvider, StaticSubscriberProvider, TriggerScheduler,
};

#[derive(Parser)]
#[command(name = "saviour")]
#[command(about = "Weather hazard alert synchronization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all three ingestion triggers until interrupted
    Watch {
        /// Latitude of the monitored position
        #[arg(long)]
        lat: f64,
        /// Longitude of the monitored position
        #[arg(long)]
        lon: f64,
        /// Subscriber id (defaults to SAVIOUR_SUBSCRIBER)
        #[arg(long)]
        subscriber: Option<String>,
    },
    /// Fetch and ingest one batch for a position
    Ingest {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        #[arg(long)]
        subscriber: Option<String>,
    },
    /// List the subscriber's alert feed, newest first
    List {
        #[arg(long)]
        subscriber: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the unread alert count
    Unread {
        #[arg(long)]
        subscriber: Option<String>,
    },
    /// Mark one alert as read
    MarkRead {
        alert_id: String,
        #[arg(long)]
        subscriber: Option<String>,
    },
    /// Show severity and safety tips for an event name
    Tips { event: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Watch { lat, lon, subscriber } => watch(&config, lat, lon, subscriber).await,
        Commands::Ingest { lat, lon, subscriber } => ingest_once(&config, lat, lon, subscriber).await,
        Commands::List { subscriber, json } => list(&config, subscriber, json).await,
        Commands::Unread { subscriber } => unread(&config, subscriber).await,
        Commands::MarkRead { alert_id, subscriber } => mark_read(&config, &alert_id, subscriber).await,
        Commands::Tips { event } => {
            println!("severity: {}", classify_severity(&event));
            for tip in safety_tips(&event) {
                println!("- {tip}");
            }
            Ok(())
        }
    }
}

fn resolve_subscriber(config: &AppConfig, arg: Option<String>) -> Result<String> {
    arg.or_else(|| config.subscriber_id.clone())
        .ok_or(PipelineError::NoActiveSubscriber)
        .context("set SAVIOUR_SUBSCRIBER or pass --subscriber")
}

fn open_store(config: &AppConfig) -> (ChangeFeed, Arc<AlertStore>) {
    let changes = ChangeFeed::new();
    let store = Arc::new(AlertStore::with_data_dir(
        changes.clone(),
        config.data_dir.join("feeds"),
    ));
    (changes, store)
}

fn build_coordinator(config: &AppConfig, store: Arc<AlertStore>) -> Result<Arc<IngestionCoordinator>> {
    if config.api_key.is_empty() {
        bail!("SAVIOUR_API_KEY is not set");
    }

    let source = Arc::new(
        OpenWeatherAdapter::new(
            config.api_key.clone(),
            Duration::from_millis(config.fetch_timeout_ms),
        )?
        .with_base_url(config.base_url.clone()),
    );
    let gateway = Arc::new(LocalNotificationGateway::new(
        config.data_dir.join("notifications.jsonl"),
    ));

    Ok(Arc::new(
        IngestionCoordinator::new(store, source, gateway)
            .with_notify_timeout(Duration::from_millis(config.notify_timeout_ms)),
    ))
}

async fn watch(config: &AppConfig, lat: f64, lon: f64, subscriber: Option<String>) -> Result<()> {
    let subscriber_id = resolve_subscriber(config, subscriber)?;
    let (changes, store) = open_store(config);
    let coordinator = build_coordinator(config, store)?;

    let subscribers = Arc::new(StaticSubscriberProvider::new(Some(subscriber_id.clone())));
    let locations = Arc::new(StaticLocationProvider::new(Some(Coordinates {
        latitude: lat,
        longitude: lon,
    })));

    let scheduler = Arc::new(
        TriggerScheduler::new(coordinator, subscribers, locations)
            .with_periodic_interval(Duration::from_secs(config.periodic_interval_secs))
            .with_distance_threshold_km(config.distance_threshold_km)
            .with_max_dwell(Duration::from_secs(config.max_dwell_secs)),
    );

    // Log feed changes as they commit
    let mut subscription = changes.subscribe(&subscriber_id).await;
    tokio::spawn(async move {
        while let Some(snapshot) = subscription.recv().await {
            let unread = snapshot.iter().filter(|a| !a.is_read).count();
            info!(total = snapshot.len(), unread, "alert feed updated");
        }
    });

    let (foreground_tx, foreground_rx) = mpsc::unbounded_channel();
    let handles = scheduler.spawn(foreground_rx);

    // The watch process starting is the "app became visible" moment
    let _ = foreground_tx.send(());

    info!(subscriber_id = %subscriber_id, lat, lon, "watching for weather alerts, Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

async fn ingest_once(config: &AppConfig, lat: f64, lon: f64, subscriber: Option<String>) -> Result<()> {
    let subscriber_id = resolve_subscriber(config, subscriber)?;
    let (_changes, store) = open_store(config);
    let coordinator = build_coordinator(config, store)?;

    let result = coordinator
        .sync_at(&subscriber_id, Coordinates { latitude: lat, longitude: lon })
        .await?;

    println!(
        "created {} / updated {} / evicted {}",
        result.created.len(),
        result.updated.len(),
        result.evicted.len()
    );
    Ok(())
}

async fn list(config: &AppConfig, subscriber: Option<String>, json: bool) -> Result<()> {
    let subscriber_id = resolve_subscriber(config, subscriber)?;
    let (_changes, store) = open_store(config);

    let alerts = store.list(&subscriber_id).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }

    if alerts.is_empty() {
        println!("no alerts");
        return Ok(());
    }
    for alert in alerts {
        let read = if alert.is_read { "read" } else { "unread" };
        println!(
            "[{}] {} - {} ({}, {})",
            alert.severity, alert.title, alert.areas, alert.created_at, read
        );
    }
    Ok(())
}

async fn unread(config: &AppConfig, subscriber: Option<String>) -> Result<()> {
    let subscriber_id = resolve_subscriber(config, subscriber)?;
    let (_changes, store) = open_store(config);
    println!("{}", store.count_unread(&subscriber_id).await);
    Ok(())
}

async fn mark_read(config: &AppConfig, alert_id: &str, subscriber: Option<String>) -> Result<()> {
    let subscriber_id = resolve_subscriber(config, subscriber)?;
    let (_changes, store) = open_store(config);
    store.mark_read(&subscriber_id, alert_id).await?;
    Ok(())
}
