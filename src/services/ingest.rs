//! Detection event ingestion - validation and normalization
//!
//! Turns a raw sensor report (sensor id, status string, timestamp string)
//! into a normalized event bound to a provisioned spot. Sensor clocks are
//! unreliable, so timestamp parsing is deliberately lenient: anything
//! unparseable falls back to the current processing time rather than
//! failing the request. The fallback is lossy and logged.

use crate::domain::types::{SensorSignal, SpotId};
use crate::services::store::Store;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::warn;

/// Permanent ingestion failures, surfaced to the caller
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    /// No spot is registered for the reporting sensor
    #[error("no spot registered for sensor '{0}'")]
    SensorNotFound(String),
    /// Status string is neither "occupied" nor "free"
    #[error("unsupported sensor status '{0}'")]
    InvalidStatus(String),
}

/// A validated sensor event, ready for reconciliation
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub spot_id: SpotId,
    pub sensor_id: String,
    pub signal: SensorSignal,
    pub observed_at: NaiveDateTime,
    /// True when the raw timestamp was unusable and `observed_at` is the
    /// processing time instead
    pub clock_fallback: bool,
}

/// Validate and normalize a raw detection report
pub fn normalize(
    store: &Store,
    sensor_id: &str,
    raw_status: &str,
    raw_timestamp: &str,
    now: NaiveDateTime,
) -> Result<NormalizedEvent, IngestError> {
    let spot_id = store
        .resolve_sensor(sensor_id)
        .ok_or_else(|| IngestError::SensorNotFound(sensor_id.to_string()))?;

    let signal = match raw_status.to_ascii_lowercase().as_str() {
        "occupied" => SensorSignal::Entry,
        "free" => SensorSignal::Exit,
        _ => return Err(IngestError::InvalidStatus(raw_status.to_string())),
    };

    let (observed_at, clock_fallback) = parse_timestamp(raw_timestamp, now);
    if clock_fallback {
        warn!(
            sensor_id = %sensor_id,
            raw_timestamp = %raw_timestamp,
            "timestamp_unparseable_using_now"
        );
    }

    Ok(NormalizedEvent {
        spot_id,
        sensor_id: sensor_id.to_string(),
        signal,
        observed_at,
        clock_fallback,
    })
}

/// Lenient timestamp parser.
///
/// Accepted formats, tried in order:
/// - RFC 3339 / offset-aware ISO-8601 ("2025-03-01T10:00:00Z",
///   "2025-03-01T10:00:00+02:00") - the wall-clock is kept as written, the
///   offset is dropped
/// - local ISO-8601 with fractional seconds ("2025-03-01T10:00:00.250")
/// - local ISO-8601 ("2025-03-01T10:00:00")
/// - space-separated datetime ("2025-03-01 10:00:00")
/// - bare date ("2025-03-01"), combined with the current time of day
///
/// Anything else yields `(now, true)`.
pub fn parse_timestamp(raw: &str, now: NaiveDateTime) -> (NaiveDateTime, bool) {
    let raw = raw.trim();
    if raw.is_empty() {
        return (now, true);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return (dt.naive_local(), false);
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return (dt, false);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return (date.and_time(now.time()), false);
    }

    (now, true)
}
