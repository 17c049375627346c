//! Reconciliation engine tests - entry/exit state machine behavior

use super::*;
use crate::domain::reservation::{Reservation, ReservationStatus};
use crate::domain::session::SessionStatus;
use crate::domain::types::{DriverId, Occupancy, Spot, SpotId, Zone, ZoneId};
use crate::infra::config::TariffPolicy;
use crate::infra::metrics::Metrics;
use crate::services::ingest::IngestError;
use crate::services::store::Store;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
}

fn test_spot(id: i64, number: &str, sensor: &str, zone: i64, rate: Option<Decimal>) -> Spot {
    Spot {
        id: SpotId(id),
        number: number.to_string(),
        sensor_id: sensor.to_string(),
        occupancy: Occupancy::Free,
        zone_id: ZoneId(zone),
        rate_override: rate,
    }
}

fn engine_with_policy(policy: TariffPolicy) -> ReconcileEngine {
    let zones = vec![
        Zone { id: ZoneId(1), name: "Zone A".to_string(), hourly_rate: Some(dec!(8.00)) },
        Zone { id: ZoneId(2), name: "Zone B".to_string(), hourly_rate: None },
    ];
    let spots = vec![
        test_spot(101, "A-01", "sensor_001", 1, None),
        test_spot(102, "A-02", "sensor_002", 1, Some(dec!(12.00))),
        test_spot(201, "B-01", "sensor_003", 2, None),
    ];
    ReconcileEngine::new(
        Arc::new(Store::new(zones, spots)),
        policy,
        Arc::new(Metrics::new()),
        None,
    )
}

fn engine() -> ReconcileEngine {
    engine_with_policy(TariffPolicy::default())
}

fn confirmed_reservation(engine: &ReconcileEngine, driver: &str, start: &str, end: &str) -> String {
    engine
        .store
        .insert_reservation(Reservation::new(
            SpotId(101),
            DriverId(driver.to_string()),
            ts(start),
            ts(end),
            ReservationStatus::Confirmed,
        ))
        .unwrap()
}

#[test]
fn test_entry_creates_active_session_and_occupies_spot() {
    let engine = engine();
    let outcome = engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:00:00", ts("2025-03-03T10:00:05"))
        .unwrap();

    assert_eq!(outcome.action, DetectionAction::EntryDetected);
    assert_eq!(outcome.spot_id, Some(101));
    assert_eq!(outcome.spot_number.as_deref(), Some("A-01"));
    assert_eq!(outcome.zone_name.as_deref(), Some("Zone A"));
    assert_eq!(outcome.driver_id.as_deref(), Some("anonymous"));
    assert!(!outcome.has_reservation);
    assert_eq!(outcome.spot_status, Some(Occupancy::Occupied));
    assert!(outcome.session_id.is_some());

    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    assert_eq!(snapshot.spot.occupancy, Occupancy::Occupied);
    assert_eq!(snapshot.sessions.len(), 1);
    assert!(snapshot.sessions[0].is_active());
    assert_eq!(snapshot.sessions[0].started_at, ts("2025-03-03T10:00:00"));
}

#[test]
fn test_repeated_entry_is_idempotent() {
    let engine = engine();
    let first = engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:00:00", ts("2025-03-03T10:00:05"))
        .unwrap();
    let second = engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:00:30", ts("2025-03-03T10:00:35"))
        .unwrap();

    assert_eq!(second.action, DetectionAction::EntryDetected);
    assert_eq!(second.session_id, first.session_id);

    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    assert_eq!(snapshot.sessions.len(), 1);
    assert_eq!(engine.metrics.report().duplicate_entries_total, 1);
}

#[test]
fn test_entry_binds_confirmed_reservation() {
    let engine = engine();
    let reservation_id =
        confirmed_reservation(&engine, "drv_7", "2025-03-03T10:00:00", "2025-03-03T12:00:00");

    let outcome = engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:05:00", ts("2025-03-03T10:05:02"))
        .unwrap();

    assert_eq!(outcome.action, DetectionAction::EntryDetected);
    assert!(outcome.has_reservation);
    assert_eq!(outcome.driver_id.as_deref(), Some("drv_7"));

    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    let reservation = snapshot.reservations.iter().find(|r| r.id == reservation_id).unwrap();
    assert_eq!(reservation.status, ReservationStatus::Active);
    assert_eq!(snapshot.sessions[0].driver, Some(DriverId("drv_7".to_string())));
}

#[test]
fn test_entry_prefers_confirmed_over_pending() {
    let engine = engine();
    engine
        .store
        .insert_reservation(Reservation::new(
            SpotId(101),
            DriverId("pending_driver".to_string()),
            ts("2025-03-03T09:00:00"),
            ts("2025-03-03T12:00:00"),
            ReservationStatus::Pending,
        ))
        .unwrap();
    confirmed_reservation(&engine, "confirmed_driver", "2025-03-03T10:00:00", "2025-03-03T12:00:00");

    let outcome = engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:30:00", ts("2025-03-03T10:30:01"))
        .unwrap();

    assert_eq!(outcome.driver_id.as_deref(), Some("confirmed_driver"));
}

#[test]
fn test_entry_outside_window_is_anonymous() {
    let engine = engine();
    confirmed_reservation(&engine, "drv_7", "2025-03-03T10:00:00", "2025-03-03T12:00:00");

    let outcome = engine
        .detect_at("sensor_001", "occupied", "2025-03-03T09:00:00", ts("2025-03-03T09:00:01"))
        .unwrap();

    assert!(!outcome.has_reservation);
    assert_eq!(outcome.driver_id.as_deref(), Some("anonymous"));

    // The booking is left untouched for its real holder
    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    assert_eq!(snapshot.reservations[0].status, ReservationStatus::Confirmed);
}

#[test]
fn test_occupied_flag_without_session_heals_on_entry() {
    let engine = engine();
    engine
        .store
        .with_spot(SpotId(101), |agg| {
            agg.spot.occupancy = Occupancy::Occupied;
            Ok(())
        })
        .unwrap();

    let outcome = engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:00:00", ts("2025-03-03T10:00:05"))
        .unwrap();

    // Treated as a fresh entry, not a duplicate
    assert_eq!(outcome.action, DetectionAction::EntryDetected);
    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    assert_eq!(snapshot.sessions.len(), 1);
    assert_eq!(engine.metrics.report().flags_corrected_total, 1);
}

#[test]
fn test_exit_prices_session_and_completes_reservation() {
    let engine = engine();
    let reservation_id =
        confirmed_reservation(&engine, "drv_7", "2025-03-03T10:00:00", "2025-03-03T12:00:00");

    engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:05:00", ts("2025-03-03T10:05:01"))
        .unwrap();
    let outcome = engine
        .detect_at("sensor_001", "free", "2025-03-03T11:30:00", ts("2025-03-03T11:30:01"))
        .unwrap();

    assert_eq!(outcome.action, DetectionAction::ExitDetected);
    assert_eq!(outcome.duration_minutes, Some(85));
    // Zone A rate 8.00, 2 billed hours
    assert_eq!(outcome.hourly_rate, Some(8.0));
    assert_eq!(outcome.total_cost, Some(16.0));
    assert!(outcome.has_reservation);
    assert_eq!(outcome.spot_status, Some(Occupancy::Free));

    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    assert_eq!(snapshot.spot.occupancy, Occupancy::Free);
    assert_eq!(snapshot.sessions[0].status, SessionStatus::Completed);
    assert_eq!(snapshot.sessions[0].total_cost, dec!(16.00));

    let reservation = snapshot.reservations.iter().find(|r| r.id == reservation_id).unwrap();
    assert_eq!(reservation.status, ReservationStatus::Completed);
    // Exit before the booked end: the window stays as booked
    assert_eq!(reservation.end_time, ts("2025-03-03T12:00:00"));
}

#[test]
fn test_overstay_extends_reservation_end_time() {
    let engine = engine();
    confirmed_reservation(&engine, "drv_7", "2025-03-03T10:00:00", "2025-03-03T12:00:00");

    engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:05:00", ts("2025-03-03T10:05:01"))
        .unwrap();
    engine
        .detect_at("sensor_001", "free", "2025-03-03T12:45:00", ts("2025-03-03T12:45:01"))
        .unwrap();

    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    assert_eq!(snapshot.reservations[0].status, ReservationStatus::Completed);
    assert_eq!(snapshot.reservations[0].end_time, ts("2025-03-03T12:45:00"));
}

#[test]
fn test_exit_before_entry_falls_back_to_processing_time() {
    let engine = engine();
    engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:00:00", ts("2025-03-03T10:00:01"))
        .unwrap();

    // Sensor clock claims the car left before it arrived
    let outcome = engine
        .detect_at("sensor_001", "free", "2025-03-03T09:00:00", ts("2025-03-03T10:30:00"))
        .unwrap();

    assert_eq!(outcome.action, DetectionAction::ExitDetected);
    assert_eq!(outcome.end_time, Some(ts("2025-03-03T10:30:00")));
    assert_eq!(outcome.duration_minutes, Some(30));
}

#[test]
fn test_exit_on_orphan_occupied_flag_corrects() {
    let engine = engine();
    engine
        .store
        .with_spot(SpotId(101), |agg| {
            agg.spot.occupancy = Occupancy::Occupied;
            Ok(())
        })
        .unwrap();

    let outcome = engine
        .detect_at("sensor_001", "free", "2025-03-03T10:00:00", ts("2025-03-03T10:00:01"))
        .unwrap();

    assert_eq!(outcome.action, DetectionAction::ExitCorrected);
    assert_eq!(outcome.spot_status, Some(Occupancy::Free));
    assert!(outcome.session_id.is_none());
    assert!(outcome.total_cost.is_none());

    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    assert_eq!(snapshot.spot.occupancy, Occupancy::Free);
    assert!(snapshot.sessions.is_empty());
}

#[test]
fn test_exit_on_free_spot_is_ignored() {
    let engine = engine();
    let outcome = engine
        .detect_at("sensor_001", "free", "2025-03-03T10:00:00", ts("2025-03-03T10:00:01"))
        .unwrap();

    assert_eq!(outcome.action, DetectionAction::ExitIgnored);
    assert!(outcome.session_id.is_none());
    assert_eq!(engine.metrics.report().exits_ignored_total, 1);
}

#[test]
fn test_unknown_sensor_is_a_permanent_error() {
    let engine = engine();
    let err = engine
        .detect_at("sensor_999", "occupied", "2025-03-03T10:00:00", ts("2025-03-03T10:00:01"))
        .unwrap_err();
    assert_eq!(err, IngestError::SensorNotFound("sensor_999".to_string()));
}

#[test]
fn test_invalid_status_is_a_permanent_error() {
    let engine = engine();
    let err = engine
        .detect_at("sensor_001", "half-in", "2025-03-03T10:00:00", ts("2025-03-03T10:00:01"))
        .unwrap_err();
    assert_eq!(err, IngestError::InvalidStatus("half-in".to_string()));
}

#[test]
fn test_minimum_fee_floor_applies() {
    let policy = TariffPolicy {
        default_hourly_rate: dec!(3.00),
        minimum_fee: dec!(5.00),
        ..TariffPolicy::default()
    };
    let engine = engine_with_policy(policy);

    // Spot 201 has no override and Zone B no rate: the 3.00 default applies
    engine
        .detect_at("sensor_003", "occupied", "2025-03-03T10:00:00", ts("2025-03-03T10:00:01"))
        .unwrap();
    let outcome = engine
        .detect_at("sensor_003", "free", "2025-03-03T10:01:00", ts("2025-03-03T10:01:01"))
        .unwrap();

    // One billed hour at 3.00 is under the minimum
    assert_eq!(outcome.total_cost, Some(5.0));
}

#[test]
fn test_spot_rate_override_wins() {
    let engine = engine();
    engine
        .detect_at("sensor_002", "occupied", "2025-03-03T10:00:00", ts("2025-03-03T10:00:01"))
        .unwrap();
    let outcome = engine
        .detect_at("sensor_002", "free", "2025-03-03T11:01:00", ts("2025-03-03T11:01:01"))
        .unwrap();

    // Override 12.00 beats Zone A's 8.00; 61 minutes bills 2 hours
    assert_eq!(outcome.hourly_rate, Some(12.0));
    assert_eq!(outcome.total_cost, Some(24.0));
}

#[test]
fn test_unparseable_timestamp_uses_processing_time() {
    let engine = engine();
    let now = ts("2025-03-03T10:42:00");
    engine.detect_at("sensor_001", "occupied", "just now", now).unwrap();

    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    assert_eq!(snapshot.sessions[0].started_at, now);
}

#[test]
fn test_concurrent_entries_create_a_single_session() {
    let engine = Arc::new(engine());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(std::thread::spawn(move || {
            engine
                .detect_at(
                    "sensor_001",
                    "occupied",
                    "2025-03-03T10:00:00",
                    ts("2025-03-03T10:00:01"),
                )
                .unwrap()
                .session_id
                .unwrap()
        }));
    }
    let session_ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let snapshot = engine.store.snapshot(SpotId(101)).unwrap();
    assert_eq!(snapshot.sessions.len(), 1);
    for id in &session_ids {
        assert_eq!(id, &snapshot.sessions[0].id);
    }
}

#[test]
fn test_reset_lot_frees_spots_and_closes_sessions() {
    let engine = engine();
    engine
        .detect_at("sensor_001", "occupied", "2025-03-03T10:00:00", ts("2025-03-03T10:00:01"))
        .unwrap();
    engine
        .detect_at("sensor_002", "occupied", "2025-03-03T10:10:00", ts("2025-03-03T10:10:01"))
        .unwrap();

    let summary = engine.reset_lot(ts("2025-03-03T11:00:00"));
    assert_eq!(summary.spots_freed, 2);
    assert_eq!(summary.sessions_closed, 2);

    for id in engine.store.spot_ids() {
        let snapshot = engine.store.snapshot(id).unwrap();
        assert_eq!(snapshot.spot.occupancy, Occupancy::Free);
        assert!(snapshot.sessions.iter().all(|s| s.status.is_terminal()));
    }
}
