//! Fire-and-forget outcome notification
//!
//! The engine offers every non-error outcome to a bounded channel with
//! `try_send`; a full channel drops the message (counted, logged) rather
//! than blocking a reconciliation run. A publisher task drains the channel,
//! appends each outcome to the detections log, and fans out to delivery
//! sinks. Sink failures are logged and never propagated - delivery must not
//! roll back committed state.

use crate::domain::outcome::DetectionOutcome;
use crate::infra::metrics::Metrics;
use crate::io::egress::DetectionLog;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Create the bounded notify channel
pub fn create_notify_channel(
    capacity: usize,
    metrics: Arc<Metrics>,
) -> (NotifySender, mpsc::Receiver<DetectionOutcome>) {
    let (tx, rx) = mpsc::channel(capacity);
    (NotifySender { tx, metrics }, rx)
}

/// Non-blocking sender handed to the engine
#[derive(Clone)]
pub struct NotifySender {
    tx: mpsc::Sender<DetectionOutcome>,
    metrics: Arc<Metrics>,
}

impl NotifySender {
    /// Offer an outcome for delivery; drops on overflow
    pub fn send_detection(&self, outcome: &DetectionOutcome) {
        match self.tx.try_send(outcome.clone()) {
            Ok(()) => self.metrics.record_notify_published(),
            Err(_) => {
                self.metrics.record_notify_dropped();
                warn!(
                    action = %outcome.action.as_str(),
                    spot_id = ?outcome.spot_id,
                    "notify_channel_full_dropping"
                );
            }
        }
    }
}

/// A one-way delivery target for detection outcomes
#[async_trait]
pub trait DetectionSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn publish(&self, outcome: &DetectionOutcome) -> anyhow::Result<()>;
}

/// POSTs outcomes as JSON to a configured webhook endpoint
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str) -> Self {
        Self { client: reqwest::Client::new(), url: url.to_string() }
    }
}

#[async_trait]
impl DetectionSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn publish(&self, outcome: &DetectionOutcome) -> anyhow::Result<()> {
        let response = self.client.post(&self.url).json(outcome).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("webhook returned {}", response.status());
        }
        Ok(())
    }
}

/// Publisher task: drains the channel into the log and the sinks
pub struct Notifier {
    rx: mpsc::Receiver<DetectionOutcome>,
    log: DetectionLog,
    sinks: Vec<Box<dyn DetectionSink>>,
}

impl Notifier {
    pub fn new(
        rx: mpsc::Receiver<DetectionOutcome>,
        log: DetectionLog,
        sinks: Vec<Box<dyn DetectionSink>>,
    ) -> Self {
        Self { rx, log, sinks }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    match msg {
                        Some(outcome) => self.dispatch(&outcome).await,
                        None => break, // Channel closed
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("notifier_shutdown");
                        break;
                    }
                }
            }
        }
    }

    async fn dispatch(&self, outcome: &DetectionOutcome) {
        self.log.append(outcome);
        for sink in &self.sinks {
            if let Err(e) = sink.publish(outcome).await {
                warn!(sink = %sink.name(), error = %e, "notify_delivery_failed");
            }
        }
    }
}
