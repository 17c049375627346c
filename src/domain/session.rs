//! Parking session model - one continuous occupancy from entry to exit

use crate::domain::types::{DriverId, SpotId};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) session identifier
pub fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Pre-created by the reservation flow, not yet backed by a detection
    Pending,
    /// Car is currently parked
    Active,
    /// Car left, session closed and priced
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states are immutable
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

/// The record of one continuous parking occupancy on a spot
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// UUIDv7 session ID
    pub id: String,
    pub spot_id: SpotId,
    /// None = anonymous entry (no reservation matched)
    pub driver: Option<DriverId>,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub status: SessionStatus,
    /// Zero until the session is closed
    pub total_cost: Decimal,
}

impl Session {
    /// Open a new active session at the detected entry time
    pub fn new(spot_id: SpotId, driver: Option<DriverId>, started_at: NaiveDateTime) -> Self {
        Self {
            id: new_session_id(),
            spot_id,
            driver,
            started_at,
            ended_at: None,
            status: SessionStatus::Active,
            total_cost: Decimal::ZERO,
        }
    }

    /// Close the session with its priced cost.
    ///
    /// No-op on a terminal session; terminal states never mutate.
    pub fn close(&mut self, ended_at: NaiveDateTime, total_cost: Decimal) {
        if self.status.is_terminal() {
            return;
        }
        self.ended_at = Some(ended_at);
        self.total_cost = total_cost;
        self.status = SessionStatus::Completed;
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Whether this session was bound to a reservation on entry
    pub fn has_reservation(&self) -> bool {
        self.driver.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn test_new_session_is_active_with_zero_cost() {
        let session = Session::new(SpotId(7), None, ts("2025-03-01T10:00:00"));
        assert!(!session.id.is_empty());
        assert_eq!(session.id.len(), 36);
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.total_cost, Decimal::ZERO);
        assert!(session.ended_at.is_none());
        assert!(!session.has_reservation());
    }

    #[test]
    fn test_close_sets_terminal_state() {
        let mut session = Session::new(SpotId(7), None, ts("2025-03-01T10:00:00"));
        session.close(ts("2025-03-01T11:30:00"), dec!(20.00));

        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.ended_at, Some(ts("2025-03-01T11:30:00")));
        assert_eq!(session.total_cost, dec!(20.00));
    }

    #[test]
    fn test_terminal_session_is_immutable() {
        let mut session = Session::new(SpotId(7), None, ts("2025-03-01T10:00:00"));
        session.close(ts("2025-03-01T11:00:00"), dec!(10.00));
        session.close(ts("2025-03-01T12:00:00"), dec!(99.00));

        assert_eq!(session.ended_at, Some(ts("2025-03-01T11:00:00")));
        assert_eq!(session.total_cost, dec!(10.00));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
    }
}
