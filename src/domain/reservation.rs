//! Reservation model - a driver's advance booking of a spot
//!
//! Reservations are created by the booking flow outside this service; the
//! reconciliation engine only reads them and advances their status. Within a
//! reconciliation run the status may only move forward through the state
//! graph, never backwards.

use crate::domain::types::{DriverId, SpotId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new UUIDv7 reservation identifier
pub fn new_reservation_id() -> String {
    Uuid::now_v7().to_string()
}

/// Reservation lifecycle state, rank-ordered for forward-only advancement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    /// Driver has arrived; a session is bound to this reservation
    Active,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Completed => "COMPLETED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Completed | ReservationStatus::Cancelled)
    }

    /// Position in the state graph; equal ranks are alternative terminals
    fn rank(&self) -> u8 {
        match self {
            ReservationStatus::Pending => 0,
            ReservationStatus::Confirmed => 1,
            ReservationStatus::Active => 2,
            ReservationStatus::Completed | ReservationStatus::Cancelled => 3,
        }
    }
}

/// A driver's booking of a spot for a half-open time window
/// `[start_time, end_time)`
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: String,
    pub spot_id: SpotId,
    pub driver: DriverId,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: ReservationStatus,
}

impl Reservation {
    pub fn new(
        spot_id: SpotId,
        driver: DriverId,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        status: ReservationStatus,
    ) -> Self {
        Self { id: new_reservation_id(), spot_id, driver, start_time, end_time, status }
    }

    /// Whether the booked window contains the given instant
    pub fn covers(&self, at: NaiveDateTime) -> bool {
        self.start_time <= at && at < self.end_time
    }

    /// Advance the status forward through the state graph.
    ///
    /// Returns false (leaving the status untouched) when the target would be
    /// a regression or the reservation is already terminal.
    pub fn advance_to(&mut self, next: ReservationStatus) -> bool {
        if self.status.is_terminal() || next.rank() < self.status.rank() {
            return false;
        }
        self.status = next;
        true
    }
}
