//! Spotwatch - parking occupancy detection & reservation reconciliation
//!
//! Reconciles asynchronous sensor occupancy reports against driver
//! reservations into a consistent view of spots, sessions, and billed cost.
//!
//! Module structure:
//! - `domain/` - Core business types (Spot, Session, Reservation, Outcome)
//! - `io/` - External interfaces (HTTP API, notification, detections log)
//! - `services/` - Business logic (Engine, Matcher, Fees, Auditor, Store)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use spotwatch::infra::{Config, Metrics};
use spotwatch::io::{
    create_notify_channel, start_api_server, ApiContext, DetectionLog, DetectionSink, Notifier,
    WebhookSink,
};
use spotwatch::services::{Auditor, ReconcileEngine, Store};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Spotwatch - parking occupancy reconciliation service
#[derive(Parser, Debug)]
#[command(name = "spotwatch", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("spotwatch starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        http_bind = %config.http_bind(),
        http_port = %config.http_port(),
        audit_interval_secs = %config.audit_interval_secs(),
        zones = %config.zones().len(),
        spots = %config.spots().len(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let store = Arc::new(Store::from_config(&config));
    let metrics = Arc::new(Metrics::new());

    // Notify channel + publisher task (detections log, optional webhook)
    let (notify_sender, notify_rx) =
        create_notify_channel(config.notify_capacity(), metrics.clone());
    let mut sinks: Vec<Box<dyn DetectionSink>> = Vec::new();
    if let Some(url) = config.notify_webhook_url() {
        info!(url = %url, "webhook_sink_enabled");
        sinks.push(Box::new(WebhookSink::new(url)));
    }
    let notifier = Notifier::new(notify_rx, DetectionLog::new(config.egress_file()), sinks);
    let notifier_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        notifier.run(notifier_shutdown).await;
    });

    let engine = Arc::new(ReconcileEngine::new(
        store.clone(),
        config.tariff().clone(),
        metrics.clone(),
        Some(notify_sender),
    ));
    let auditor = Arc::new(Auditor::new(store.clone(), metrics.clone()));

    // Periodic consistency sweep
    if config.audit_interval_secs() > 0 {
        let audit_task = auditor.clone();
        let audit_shutdown = shutdown_rx.clone();
        let audit_interval = config.audit_interval_secs();
        tokio::spawn(async move {
            audit_task.run(audit_interval, audit_shutdown).await;
        });
    }

    // Periodic metrics summary log
    if config.metrics_interval_secs() > 0 {
        let metrics_clone = metrics.clone();
        let metrics_interval = config.metrics_interval_secs();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    }

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the API server - the main loop of the service
    let ctx = ApiContext {
        engine,
        store,
        auditor,
        metrics,
        site_id: Arc::new(config.site_id().to_string()),
    };
    start_api_server(config.http_bind(), config.http_port(), ctx, shutdown_rx).await?;

    info!("spotwatch shutdown complete");
    Ok(())
}
