//! Consistency auditor - drift correction between flags and sessions
//!
//! The engine self-heals single-spot drift synchronously; this sweep is the
//! backstop for drift introduced by external mutation or partial failures.
//! Each spot is corrected in its own short transaction so the sweep never
//! starves concurrent detection events.

use crate::domain::types::Occupancy;
use crate::infra::metrics::Metrics;
use crate::services::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct Auditor {
    store: Arc<Store>,
    metrics: Arc<Metrics>,
}

impl Auditor {
    pub fn new(store: Arc<Store>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Run one full sweep; returns the number of corrected spots.
    ///
    /// For every spot the occupancy flag is forced to match the
    /// session-derived truth: occupied iff an active session exists.
    pub fn audit(&self) -> usize {
        let mut corrections = 0usize;

        for id in self.store.spot_ids() {
            let result = self.store.with_spot(id, |agg| {
                let expected = if agg.active_session().is_some() {
                    Occupancy::Occupied
                } else {
                    Occupancy::Free
                };
                if agg.spot.occupancy == expected {
                    return Ok(false);
                }
                let stored = agg.spot.occupancy;
                agg.spot.occupancy = expected;
                info!(
                    spot = %agg.spot.id,
                    stored = %stored,
                    corrected = %expected,
                    "occupancy_flag_corrected"
                );
                Ok(true)
            });

            match result {
                Ok(true) => corrections += 1,
                Ok(false) => {}
                Err(e) => warn!(spot = %id, error = %e, "audit_spot_failed"),
            }
        }

        self.metrics.record_audit(corrections as u64);
        if corrections > 0 {
            info!(corrections = %corrections, "audit_completed");
        }
        corrections
    }

    /// Periodic sweep task; ends when the shutdown signal flips
    pub async fn run(self: Arc<Self>, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick fires immediately; skip it so startup stays quiet
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.audit();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("auditor_shutdown");
                        return;
                    }
                }
            }
        }
    }
}
