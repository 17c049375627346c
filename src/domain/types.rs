//! Shared types for the parking reconciliation service

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Newtype wrapper for spot IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SpotId(pub i64);

impl std::fmt::Display for SpotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for zone IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ZoneId(pub i64);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Driver identity as issued by the account provider.
///
/// A session without a driver is anonymous; the `"anonymous"` sentinel
/// only exists on the wire (see [`DriverId::label`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct DriverId(pub String);

impl DriverId {
    /// Wire sentinel used for sessions with no known driver
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wire label for an optional driver: the id, or the anonymous sentinel
    pub fn label(driver: Option<&DriverId>) -> String {
        driver.map_or_else(|| Self::ANONYMOUS.to_string(), |d| d.0.clone())
    }
}

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Spot occupancy as reported to and reconciled by the engine.
///
/// Always a named two-valued enum, never a raw boolean - the source systems
/// this replaces disagreed about which boolean value meant "free".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Occupancy {
    Free,
    Occupied,
}

impl Occupancy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Occupancy::Free => "FREE",
            Occupancy::Occupied => "OCCUPIED",
        }
    }
}

impl std::fmt::Display for Occupancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a normalized sensor event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSignal {
    /// Sensor reports the spot became occupied
    Entry,
    /// Sensor reports the spot became free
    Exit,
}

impl SensorSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorSignal::Entry => "entry",
            SensorSignal::Exit => "exit",
        }
    }
}

/// A single physical parking space monitored by one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct Spot {
    pub id: SpotId,
    /// Display number, e.g. "A-01"
    pub number: String,
    /// Identifier of the field sensor reporting for this spot
    pub sensor_id: String,
    pub occupancy: Occupancy,
    pub zone_id: ZoneId,
    /// Per-spot hourly rate override; only positive values are honored
    pub rate_override: Option<Decimal>,
}

/// A parking zone grouping spots, carrying the zone-level tariff
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    /// Current zone rate; may be changed at runtime by rate administration
    pub hourly_rate: Option<Decimal>,
}
