//! In-process aggregate store with per-spot transactional exclusivity
//!
//! Each spot's aggregate (the spot record, its session history, and its
//! reservations) lives behind its own mutex. A reconciliation run locks
//! exactly one aggregate, works on a scratch copy, and commits only on
//! success - a failing unit of work retains no partial mutation. Events for
//! different spots proceed fully in parallel; there is no global lock.

use crate::domain::types::{Occupancy, Spot, SpotId, Zone, ZoneId};
use crate::domain::{Reservation, Session};
use crate::infra::config::Config;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no spot registered with id {0}")]
    UnknownSpot(SpotId),
    #[error("aggregate update rejected: {0}")]
    Rejected(String),
}

/// Everything reconciled together for one spot
#[derive(Debug, Clone)]
pub struct SpotAggregate {
    pub spot: Spot,
    /// Session history for the spot; at most one non-terminal at a time
    pub sessions: Vec<Session>,
    pub reservations: Vec<Reservation>,
}

impl SpotAggregate {
    fn new(spot: Spot) -> Self {
        Self { spot, sessions: Vec::new(), reservations: Vec::new() }
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.sessions.iter().find(|s| s.is_active())
    }

    pub fn active_session_index(&self) -> Option<usize> {
        self.sessions.iter().position(|s| s.is_active())
    }
}

/// Aggregate store for the whole lot.
///
/// The spot and sensor indexes are fixed at provisioning time; this core
/// never creates or deletes spots, so only the aggregates themselves and the
/// zone table need synchronization.
pub struct Store {
    zones: RwLock<FxHashMap<ZoneId, Zone>>,
    by_sensor: FxHashMap<String, SpotId>,
    spots: FxHashMap<SpotId, Arc<Mutex<SpotAggregate>>>,
}

impl Store {
    pub fn new(zones: Vec<Zone>, spots: Vec<Spot>) -> Self {
        let mut zone_map = FxHashMap::default();
        for zone in zones {
            zone_map.insert(zone.id, zone);
        }

        let mut by_sensor = FxHashMap::default();
        let mut spot_map = FxHashMap::default();
        for spot in spots {
            by_sensor.insert(spot.sensor_id.clone(), spot.id);
            spot_map.insert(spot.id, Arc::new(Mutex::new(SpotAggregate::new(spot))));
        }

        Self { zones: RwLock::new(zone_map), by_sensor, spots: spot_map }
    }

    /// Provision the lot from configuration seeds
    pub fn from_config(config: &Config) -> Self {
        let zones = config
            .zones()
            .iter()
            .map(|z| Zone { id: ZoneId(z.id), name: z.name.clone(), hourly_rate: z.hourly_rate })
            .collect();
        let spots = config
            .spots()
            .iter()
            .map(|s| Spot {
                id: SpotId(s.id),
                number: s.number.clone(),
                sensor_id: s.sensor_id.clone(),
                occupancy: Occupancy::Free,
                zone_id: ZoneId(s.zone_id),
                rate_override: s.hourly_rate,
            })
            .collect();

        let store = Self::new(zones, spots);
        info!(
            spots = %store.spots.len(),
            zones = %store.zones.read().len(),
            "store_provisioned"
        );
        store
    }

    /// Resolve a sensor identifier to its spot
    pub fn resolve_sensor(&self, sensor_id: &str) -> Option<SpotId> {
        self.by_sensor.get(sensor_id).copied()
    }

    pub fn zone(&self, id: ZoneId) -> Option<Zone> {
        self.zones.read().get(&id).cloned()
    }

    /// Update a zone's current rate. Rate administration lives outside this
    /// core; this is its write boundary.
    pub fn set_zone_rate(&self, id: ZoneId, rate: Decimal) -> bool {
        match self.zones.write().get_mut(&id) {
            Some(zone) => {
                zone.hourly_rate = Some(rate);
                true
            }
            None => false,
        }
    }

    /// All provisioned spot ids, in stable order
    pub fn spot_ids(&self) -> Vec<SpotId> {
        let mut ids: Vec<SpotId> = self.spots.keys().copied().collect();
        ids.sort_by_key(|id| id.0);
        ids
    }

    /// Clone the committed state of one aggregate (for read-only views)
    pub fn snapshot(&self, id: SpotId) -> Option<SpotAggregate> {
        self.spots.get(&id).map(|cell| cell.lock().clone())
    }

    /// Run one atomic unit of work against a spot aggregate.
    ///
    /// The closure operates on a scratch copy under the spot's lock; the copy
    /// is committed only when the closure succeeds. A concurrent event for
    /// the same spot serializes behind the lock and observes committed
    /// post-state only.
    pub fn with_spot<T>(
        &self,
        id: SpotId,
        f: impl FnOnce(&mut SpotAggregate) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let cell = self.spots.get(&id).ok_or(StoreError::UnknownSpot(id))?;
        let mut guard = cell.lock();
        let mut scratch = guard.clone();
        let out = f(&mut scratch)?;
        *guard = scratch;
        Ok(out)
    }

    /// Boundary for the external reservation flow: attach a booking to its
    /// spot. Returns the reservation id.
    pub fn insert_reservation(&self, reservation: Reservation) -> Result<String, StoreError> {
        let spot_id = reservation.spot_id;
        let id = reservation.id.clone();
        self.with_spot(spot_id, |agg| {
            if reservation.spot_id != agg.spot.id {
                return Err(StoreError::Rejected(format!(
                    "reservation targets spot {}, aggregate is {}",
                    reservation.spot_id, agg.spot.id
                )));
            }
            agg.reservations.push(reservation.clone());
            Ok(())
        })?;
        Ok(id)
    }
}
