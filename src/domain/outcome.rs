//! Structured outcome returned for every detection event
//!
//! Sensor integrations always receive one of these - including for events
//! that corrected or ignored inconsistent state, and for internal failures.

use crate::domain::types::Occupancy;
use chrono::NaiveDateTime;
use serde::Serialize;

/// What the reconciliation engine did with the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionAction {
    EntryDetected,
    ExitDetected,
    /// Occupied flag without an active session - flag reset, nothing billed
    ExitCorrected,
    /// Spurious exit on an already-free spot - no-op
    ExitIgnored,
    Error,
}

impl DetectionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionAction::EntryDetected => "entry_detected",
            DetectionAction::ExitDetected => "exit_detected",
            DetectionAction::ExitCorrected => "exit_corrected",
            DetectionAction::ExitIgnored => "exit_ignored",
            DetectionAction::Error => "error",
        }
    }
}

/// Response payload for a detection event.
///
/// Monetary fields are converted to floats at this edge only; all internal
/// arithmetic stays in `Decimal`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionOutcome {
    pub action: DetectionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    pub has_reservation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_status: Option<Occupancy>,
    pub message: String,
}

impl DetectionOutcome {
    /// Minimal outcome carrying only an action and message; the engine's
    /// builders fill in the rest per path
    pub fn bare(action: DetectionAction, message: impl Into<String>) -> Self {
        Self {
            action,
            spot_id: None,
            spot_number: None,
            zone_name: None,
            session_id: None,
            start_time: None,
            end_time: None,
            duration_minutes: None,
            hourly_rate: None,
            total_cost: None,
            has_reservation: false,
            driver_id: None,
            spot_status: None,
            message: message.into(),
        }
    }
}
