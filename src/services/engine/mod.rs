//! State reconciliation engine - the core occupancy state machine
//!
//! Drives spot/session/reservation state from normalized sensor events:
//! - entry events open sessions and activate matching reservations
//! - exit events price and close sessions and complete reservations
//! - contradictory stored state is self-healed instead of propagated
//!
//! Each event is handled inside a single per-spot unit of work; a failure
//! rolls the aggregate back and surfaces as a structured `error` outcome,
//! never as an unhandled fault to the transport layer.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::outcome::{DetectionAction, DetectionOutcome};
use crate::domain::types::{Occupancy, SensorSignal};
use crate::infra::config::TariffPolicy;
use crate::infra::metrics::Metrics;
use crate::io::notify::NotifySender;
use crate::services::ingest::{self, IngestError};
use crate::services::store::Store;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Result of an administrative lot reset
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotResetSummary {
    pub spots_freed: usize,
    pub sessions_closed: usize,
}

/// Central reconciliation engine
pub struct ReconcileEngine {
    pub(crate) store: Arc<Store>,
    pub(crate) policy: TariffPolicy,
    pub(crate) metrics: Arc<Metrics>,
    /// Fire-and-forget outcome notification (None = disabled)
    pub(crate) notify: Option<NotifySender>,
}

impl ReconcileEngine {
    pub fn new(
        store: Arc<Store>,
        policy: TariffPolicy,
        metrics: Arc<Metrics>,
        notify: Option<NotifySender>,
    ) -> Self {
        Self { store, policy, metrics, notify }
    }

    /// Handle a raw detection report at the current processing time.
    ///
    /// `Err` is reserved for permanent caller errors (unknown sensor,
    /// invalid status); everything else - including internal failures -
    /// comes back as a structured outcome.
    pub fn detect(
        &self,
        sensor_id: &str,
        raw_status: &str,
        raw_timestamp: &str,
    ) -> Result<DetectionOutcome, IngestError> {
        self.detect_at(sensor_id, raw_status, raw_timestamp, Local::now().naive_local())
    }

    /// Handle a raw detection report with an explicit processing time
    pub fn detect_at(
        &self,
        sensor_id: &str,
        raw_status: &str,
        raw_timestamp: &str,
        now: NaiveDateTime,
    ) -> Result<DetectionOutcome, IngestError> {
        let process_start = Instant::now();

        let event = ingest::normalize(&self.store, sensor_id, raw_status, raw_timestamp, now)?;
        info!(
            sensor_id = %event.sensor_id,
            spot = %event.spot_id,
            signal = %event.signal.as_str(),
            observed_at = %event.observed_at,
            clock_fallback = %event.clock_fallback,
            "detection_received"
        );

        let result = match event.signal {
            SensorSignal::Entry => self.handle_entry(&event),
            SensorSignal::Exit => self.handle_exit(&event, now),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.record_error();
                tracing::error!(spot = %event.spot_id, error = %e, "reconciliation_failed");
                self.error_outcome(event.spot_id, &e)
            }
        };

        self.metrics.record_detection(process_start.elapsed().as_micros() as u64);

        // Delivery is best-effort and must never affect the committed state
        if outcome.action != DetectionAction::Error {
            if let Some(notify) = &self.notify {
                notify.send_detection(&outcome);
            }
        }

        Ok(outcome)
    }

    /// Free every spot and close anything still open. Administrative
    /// operation; closed sessions are not priced.
    pub fn reset_lot(&self, now: NaiveDateTime) -> LotResetSummary {
        let mut spots_freed = 0;
        let mut sessions_closed = 0;

        for id in self.store.spot_ids() {
            let result = self.store.with_spot(id, |agg| {
                let freed = agg.spot.occupancy == Occupancy::Occupied;
                agg.spot.occupancy = Occupancy::Free;

                let mut closed = 0usize;
                for session in agg.sessions.iter_mut().filter(|s| !s.status.is_terminal()) {
                    let cost = session.total_cost;
                    session.close(now, cost);
                    closed += 1;
                }
                Ok((freed, closed))
            });

            if let Ok((freed, closed)) = result {
                if freed {
                    spots_freed += 1;
                }
                sessions_closed += closed;
            }
        }

        info!(
            spots_freed = %spots_freed,
            sessions_closed = %sessions_closed,
            "lot_reset"
        );
        LotResetSummary { spots_freed, sessions_closed }
    }
}
