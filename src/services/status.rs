//! Read-only occupancy views over the lot
//!
//! Aggregated lot/zone summaries and per-spot listings served by the HTTP
//! surface. These read committed snapshots only and never mutate.

use crate::domain::types::Occupancy;
use crate::services::store::Store;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStatus {
    pub zone_id: i64,
    pub zone_name: String,
    pub total_spots: usize,
    pub occupied_spots: usize,
    pub free_spots: usize,
    pub occupancy_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotStatus {
    pub total_spots: usize,
    pub occupied_spots: usize,
    pub free_spots: usize,
    pub occupancy_pct: f64,
    pub zones: Vec<ZoneStatus>,
}

/// One spot with its sensor binding, as exposed to dashboards
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotStatus {
    pub spot_id: i64,
    pub spot_number: String,
    pub sensor_id: String,
    pub status: Occupancy,
    pub zone_id: i64,
    pub zone_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,
}

fn pct(occupied: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (occupied as f64) * 100.0 / (total as f64)
}

/// Lot-wide summary with a per-zone breakdown
pub fn lot_status(store: &Store) -> LotStatus {
    let mut total = 0usize;
    let mut occupied = 0usize;
    // (total, occupied) per zone, in stable zone order
    let mut per_zone: BTreeMap<i64, (usize, usize)> = BTreeMap::new();

    for id in store.spot_ids() {
        let Some(snapshot) = store.snapshot(id) else { continue };
        total += 1;
        let entry = per_zone.entry(snapshot.spot.zone_id.0).or_insert((0, 0));
        entry.0 += 1;
        if snapshot.spot.occupancy == Occupancy::Occupied {
            occupied += 1;
            entry.1 += 1;
        }
    }

    let zones = per_zone
        .into_iter()
        .map(|(zone_id, (zone_total, zone_occupied))| ZoneStatus {
            zone_id,
            zone_name: store
                .zone(crate::domain::types::ZoneId(zone_id))
                .map(|z| z.name)
                .unwrap_or_else(|| "N/A".to_string()),
            total_spots: zone_total,
            occupied_spots: zone_occupied,
            free_spots: zone_total - zone_occupied,
            occupancy_pct: pct(zone_occupied, zone_total),
        })
        .collect();

    LotStatus {
        total_spots: total,
        occupied_spots: occupied,
        free_spots: total - occupied,
        occupancy_pct: pct(occupied, total),
        zones,
    }
}

/// Per-spot listing with sensor bindings and effective zone rates
pub fn spot_statuses(store: &Store) -> Vec<SpotStatus> {
    store
        .spot_ids()
        .into_iter()
        .filter_map(|id| {
            let snapshot = store.snapshot(id)?;
            let zone = store.zone(snapshot.spot.zone_id);
            Some(SpotStatus {
                spot_id: snapshot.spot.id.0,
                spot_number: snapshot.spot.number.clone(),
                sensor_id: snapshot.spot.sensor_id.clone(),
                status: snapshot.spot.occupancy,
                zone_id: snapshot.spot.zone_id.0,
                zone_name: zone
                    .as_ref()
                    .map(|z| z.name.clone())
                    .unwrap_or_else(|| "N/A".to_string()),
                hourly_rate: snapshot
                    .spot
                    .rate_override
                    .or(zone.and_then(|z| z.hourly_rate))
                    .and_then(|r| r.to_f64()),
            })
        })
        .collect()
}
