//! Entry and exit handlers for the reconciliation engine
//!
//! Each handler runs inside one per-spot unit of work and returns the
//! structured outcome for the event. Inconsistent stored state (occupancy
//! flag disagreeing with session existence) is corrected in place and
//! reported through the outcome's action code, never as an error.

use super::ReconcileEngine;
use crate::domain::outcome::{DetectionAction, DetectionOutcome};
use crate::domain::reservation::ReservationStatus;
use crate::domain::session::Session;
use crate::domain::types::{DriverId, Occupancy, Spot, SpotId};
use crate::services::fees::{self, FeeBreakdown};
use crate::services::ingest::NormalizedEvent;
use crate::services::matcher;
use crate::services::store::StoreError;
use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info, warn};

impl ReconcileEngine {
    /// Handle an entry report for a spot.
    ///
    /// Repeated entry events for an already-active occupancy are no-ops and
    /// return the existing session's summary.
    pub(crate) fn handle_entry(
        &self,
        event: &NormalizedEvent,
    ) -> Result<DetectionOutcome, StoreError> {
        self.store.with_spot(event.spot_id, |agg| {
            if agg.spot.occupancy == Occupancy::Occupied {
                if let Some(session) = agg.active_session() {
                    self.metrics.record_duplicate_entry();
                    debug!(
                        spot = %agg.spot.id,
                        session = %session.id,
                        "duplicate_entry_ignored"
                    );
                    return Ok(self.entry_outcome(
                        &agg.spot,
                        session,
                        "spot already occupied (existing session)",
                    ));
                }
                // Flag says occupied but nothing is parked on record - reset
                // and treat the event as a fresh entry
                warn!(spot = %agg.spot.id, "occupied_flag_without_session_reset");
                agg.spot.occupancy = Occupancy::Free;
                self.metrics.record_flag_corrected();
            }

            // The flag may also lag the other way: free flag, live session.
            // Reuse the session instead of opening a second one.
            if let Some(session) = agg.active_session() {
                self.metrics.record_duplicate_entry();
                debug!(spot = %agg.spot.id, session = %session.id, "active_session_reused");
                return Ok(self.entry_outcome(&agg.spot, session, "session already active"));
            }

            let mut driver: Option<DriverId> = None;
            let mut bound_reservation = false;
            if let Some(idx) =
                matcher::select_entry_reservation(&agg.reservations, event.observed_at)
            {
                bound_reservation = true;
                let reservation = &mut agg.reservations[idx];
                if reservation.status == ReservationStatus::Active {
                    // Already activated by an earlier event; just rebind
                    debug!(
                        spot = %agg.spot.id,
                        reservation = %reservation.id,
                        "reservation_already_active"
                    );
                } else {
                    reservation.advance_to(ReservationStatus::Active);
                    info!(
                        spot = %agg.spot.id,
                        reservation = %reservation.id,
                        driver = %reservation.driver,
                        "reservation_activated"
                    );
                }
                driver = Some(reservation.driver.clone());
            }

            let session = Session::new(agg.spot.id, driver, event.observed_at);
            agg.spot.occupancy = Occupancy::Occupied;
            self.metrics.record_entry();
            info!(
                spot = %agg.spot.id,
                session = %session.id,
                driver = %DriverId::label(session.driver.as_ref()),
                has_reservation = %bound_reservation,
                start = %session.started_at,
                "entry_detected"
            );

            let message = if bound_reservation {
                "entry with reservation activated"
            } else {
                "entry without reservation"
            };
            let outcome = self.entry_outcome(&agg.spot, &session, message);
            agg.sessions.push(session);
            Ok(outcome)
        })
    }

    /// Handle an exit report for a spot
    pub(crate) fn handle_exit(
        &self,
        event: &NormalizedEvent,
        now: NaiveDateTime,
    ) -> Result<DetectionOutcome, StoreError> {
        self.store.with_spot(event.spot_id, |agg| {
            let Some(idx) = agg.active_session_index() else {
                if agg.spot.occupancy == Occupancy::Occupied {
                    // Orphaned flag - release it, bill nothing
                    agg.spot.occupancy = Occupancy::Free;
                    self.metrics.record_exit_corrected();
                    self.metrics.record_flag_corrected();
                    warn!(spot = %agg.spot.id, "occupied_flag_without_session_released");
                    return Ok(self.spot_only_outcome(
                        &agg.spot,
                        DetectionAction::ExitCorrected,
                        "spot released (no active session)",
                    ));
                }
                // Spurious exit on a free spot - never fabricate a session
                self.metrics.record_exit_ignored();
                debug!(spot = %agg.spot.id, "exit_without_session_ignored");
                return Ok(self.spot_only_outcome(
                    &agg.spot,
                    DetectionAction::ExitIgnored,
                    "no active session",
                ));
            };

            let started_at = agg.sessions[idx].started_at;
            let mut exit_time = event.observed_at;
            if exit_time < started_at {
                // Sensor clock ran behind the entry - trust our own clock
                warn!(
                    spot = %agg.spot.id,
                    exit = %exit_time,
                    start = %started_at,
                    "exit_before_entry_clock_skew"
                );
                exit_time = now;
            }

            let zone = self.store.zone(agg.spot.zone_id);
            let base_rate = fees::effective_rate(&agg.spot, zone.as_ref(), &self.policy);
            let fee = fees::price(&self.policy, started_at, exit_time, base_rate);

            agg.sessions[idx].close(exit_time, fee.total);
            let session = agg.sessions[idx].clone();

            let mut completed_reservation = false;
            if let Some(driver) = session.driver.as_ref() {
                if let Some(ridx) = matcher::find_active_for_driver(&agg.reservations, driver) {
                    let reservation = &mut agg.reservations[ridx];
                    reservation.advance_to(ReservationStatus::Completed);
                    if reservation.end_time < exit_time {
                        // Overstay: stretch the booked window to the real exit
                        reservation.end_time = exit_time;
                    }
                    completed_reservation = true;
                    info!(
                        spot = %agg.spot.id,
                        reservation = %reservation.id,
                        driver = %driver,
                        "reservation_completed"
                    );
                }
            }

            agg.spot.occupancy = Occupancy::Free;
            self.metrics.record_exit();
            info!(
                spot = %agg.spot.id,
                session = %session.id,
                minutes = %fee.duration_minutes,
                billed_hours = %fee.billed_hours,
                total = %fee.total,
                reservation_completed = %completed_reservation,
                "exit_detected"
            );

            Ok(self.exit_outcome(&agg.spot, &session, &fee))
        })
    }

    fn zone_name(&self, spot: &Spot) -> String {
        self.store
            .zone(spot.zone_id)
            .map(|z| z.name)
            .unwrap_or_else(|| "N/A".to_string())
    }

    fn entry_outcome(&self, spot: &Spot, session: &Session, message: &str) -> DetectionOutcome {
        let mut outcome = DetectionOutcome::bare(DetectionAction::EntryDetected, message);
        outcome.spot_id = Some(spot.id.0);
        outcome.spot_number = Some(spot.number.clone());
        outcome.zone_name = Some(self.zone_name(spot));
        outcome.session_id = Some(session.id.clone());
        outcome.start_time = Some(session.started_at);
        outcome.has_reservation = session.has_reservation();
        outcome.driver_id = Some(DriverId::label(session.driver.as_ref()));
        outcome.spot_status = Some(spot.occupancy);
        outcome
    }

    fn exit_outcome(
        &self,
        spot: &Spot,
        session: &Session,
        fee: &FeeBreakdown,
    ) -> DetectionOutcome {
        let mut outcome =
            DetectionOutcome::bare(DetectionAction::ExitDetected, "exit recorded");
        outcome.spot_id = Some(spot.id.0);
        outcome.spot_number = Some(spot.number.clone());
        outcome.zone_name = Some(self.zone_name(spot));
        outcome.session_id = Some(session.id.clone());
        outcome.start_time = Some(session.started_at);
        outcome.end_time = session.ended_at;
        outcome.duration_minutes = Some(fee.duration_minutes);
        outcome.hourly_rate = fee.hourly_rate.to_f64();
        outcome.total_cost = fee.total.to_f64();
        outcome.has_reservation = session.has_reservation();
        outcome.driver_id = Some(DriverId::label(session.driver.as_ref()));
        outcome.spot_status = Some(spot.occupancy);
        outcome
    }

    fn spot_only_outcome(
        &self,
        spot: &Spot,
        action: DetectionAction,
        message: &str,
    ) -> DetectionOutcome {
        let mut outcome = DetectionOutcome::bare(action, message);
        outcome.spot_id = Some(spot.id.0);
        outcome.spot_number = Some(spot.number.clone());
        outcome.zone_name = Some(self.zone_name(spot));
        outcome.spot_status = Some(spot.occupancy);
        outcome
    }

    pub(crate) fn error_outcome(&self, spot_id: SpotId, error: &StoreError) -> DetectionOutcome {
        let mut outcome = DetectionOutcome::bare(
            DetectionAction::Error,
            format!("internal error: {error}"),
        );
        outcome.spot_id = Some(spot_id.0);
        if let Some(snapshot) = self.store.snapshot(spot_id) {
            outcome.spot_number = Some(snapshot.spot.number.clone());
            outcome.zone_name = Some(self.zone_name(&snapshot.spot));
        }
        outcome
    }
}
