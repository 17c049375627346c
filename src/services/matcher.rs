//! Reservation matching for entry and exit reconciliation
//!
//! Pure functions over a spot's reservation list. On entry the engine asks
//! which booking the arriving car should bind to; on exit it asks which
//! active booking the leaving driver should complete.
//!
//! Entry precedence: among reservations whose window contains the event
//! time, Confirmed beats Pending, and within the same status the earliest
//! start wins. When no windowed candidate exists, an already-Active
//! reservation on the spot is honored regardless of window - an arrival may
//! have activated it before a delayed or replayed event is processed.

use crate::domain::reservation::{Reservation, ReservationStatus};
use crate::domain::types::DriverId;
use chrono::NaiveDateTime;

/// Pick the reservation an entry at `at` should bind to.
///
/// Returns an index into `reservations`.
pub fn select_entry_reservation(
    reservations: &[Reservation],
    at: NaiveDateTime,
) -> Option<usize> {
    let mut best: Option<usize> = None;

    for (i, candidate) in reservations.iter().enumerate() {
        let windowed = matches!(
            candidate.status,
            ReservationStatus::Confirmed | ReservationStatus::Pending
        );
        if !windowed || !candidate.covers(at) {
            continue;
        }
        best = match best {
            None => Some(i),
            Some(j) => {
                if beats(candidate, &reservations[j]) {
                    Some(i)
                } else {
                    Some(j)
                }
            }
        };
    }

    // No windowed candidate: fall back to a reservation that is already
    // mid-stay on this spot
    best.or_else(|| reservations.iter().position(|r| r.status == ReservationStatus::Active))
}

/// Entry-precedence comparison: Confirmed over Pending, then earliest start
fn beats(a: &Reservation, b: &Reservation) -> bool {
    let a_confirmed = a.status == ReservationStatus::Confirmed;
    let b_confirmed = b.status == ReservationStatus::Confirmed;
    if a_confirmed != b_confirmed {
        return a_confirmed;
    }
    a.start_time < b.start_time
}

/// Find the Active reservation a departing driver should complete
pub fn find_active_for_driver(reservations: &[Reservation], driver: &DriverId) -> Option<usize> {
    reservations
        .iter()
        .position(|r| r.status == ReservationStatus::Active && &r.driver == driver)
}
