//! Fee calculation - pure pricing over a tariff policy
//!
//! Billing rules:
//! - duration is wall-clock, floored at one minute
//! - the billing unit is a full hour, rounded up (61 minutes bills 2 hours)
//! - sessions starting in the night window or on a weekend get the
//!   configured multipliers, composed multiplicatively on the base rate
//! - the total is floored at the minimum fee, then rounded to 2 decimal
//!   places half-up

use crate::domain::types::{Spot, Zone};
use crate::infra::config::TariffPolicy;
use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};

/// Priced session cost with the inputs that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct FeeBreakdown {
    pub duration_minutes: i64,
    pub billed_hours: i64,
    /// Base rate with multipliers applied
    pub hourly_rate: Decimal,
    pub total: Decimal,
}

/// Resolve the rate a spot bills at: positive per-spot override, else the
/// owning zone's current rate, else the system default
pub fn effective_rate(spot: &Spot, zone: Option<&Zone>, policy: &TariffPolicy) -> Decimal {
    if let Some(rate) = spot.rate_override {
        if rate > Decimal::ZERO {
            return rate;
        }
    }
    if let Some(rate) = zone.and_then(|z| z.hourly_rate) {
        return rate;
    }
    policy.default_hourly_rate
}

/// Price a session over `[start, end]` at the given base rate
pub fn price(
    policy: &TariffPolicy,
    start: NaiveDateTime,
    end: NaiveDateTime,
    base_rate: Decimal,
) -> FeeBreakdown {
    let duration_minutes = (end - start).num_minutes().max(1);
    let billed_hours = (duration_minutes + 59) / 60;

    let hourly_rate = base_rate * rate_multiplier(policy, start);
    let mut total = hourly_rate * Decimal::from(billed_hours);
    if total < policy.minimum_fee {
        total = policy.minimum_fee;
    }
    let total = total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    FeeBreakdown { duration_minutes, billed_hours, hourly_rate, total }
}

/// Night/weekend multipliers, judged from the session start
fn rate_multiplier(policy: &TariffPolicy, start: NaiveDateTime) -> Decimal {
    let mut multiplier = Decimal::ONE;
    if in_night_window(start.hour(), policy.night_start_hour, policy.night_end_hour) {
        multiplier *= policy.night_multiplier;
    }
    if matches!(start.weekday(), Weekday::Sat | Weekday::Sun) {
        multiplier *= policy.weekend_multiplier;
    }
    multiplier
}

/// Half-open hour window `[start, end)` that may wrap past midnight
/// (e.g. 20:00-08:00)
fn in_night_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Occupancy, SpotId, ZoneId};
    use rust_decimal_macros::dec;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    fn policy() -> TariffPolicy {
        TariffPolicy::default() // 10.00/h, 5.00 minimum, neutral multipliers
    }

    fn spot(rate_override: Option<Decimal>) -> Spot {
        Spot {
            id: SpotId(1),
            number: "A-01".to_string(),
            sensor_id: "sensor_001".to_string(),
            occupancy: Occupancy::Free,
            zone_id: ZoneId(1),
            rate_override,
        }
    }

    fn zone(hourly_rate: Option<Decimal>) -> Zone {
        Zone { id: ZoneId(1), name: "Zone A".to_string(), hourly_rate }
    }

    // 2025-03-03 is a Monday; 2025-03-01 a Saturday

    #[test]
    fn test_one_minute_bills_minimum_fee() {
        let fee = price(&policy(), ts("2025-03-03T10:00:00"), ts("2025-03-03T10:01:00"), dec!(10.00));
        assert_eq!(fee.duration_minutes, 1);
        assert_eq!(fee.billed_hours, 1);
        // ceil(1/60) * 10.00 = 10.00 > minimum, so the rate applies
        assert_eq!(fee.total, dec!(10.00));
    }

    #[test]
    fn test_minimum_fee_floor() {
        let fee = price(&policy(), ts("2025-03-03T10:00:00"), ts("2025-03-03T10:01:00"), dec!(3.00));
        // 1 hour at 3.00 is below the 5.00 minimum
        assert_eq!(fee.total, dec!(5.00));
    }

    #[test]
    fn test_sixty_one_minutes_bills_two_hours() {
        let fee = price(&policy(), ts("2025-03-03T10:00:00"), ts("2025-03-03T11:01:00"), dec!(10.00));
        assert_eq!(fee.duration_minutes, 61);
        assert_eq!(fee.billed_hours, 2);
        assert_eq!(fee.total, dec!(20.00));
    }

    #[test]
    fn test_exactly_one_hour_bills_one_hour() {
        let fee = price(&policy(), ts("2025-03-03T10:00:00"), ts("2025-03-03T11:00:00"), dec!(10.00));
        assert_eq!(fee.billed_hours, 1);
        assert_eq!(fee.total, dec!(10.00));
    }

    #[test]
    fn test_sub_minute_duration_floors_to_one_minute() {
        let fee = price(&policy(), ts("2025-03-03T10:00:00"), ts("2025-03-03T10:00:20"), dec!(10.00));
        assert_eq!(fee.duration_minutes, 1);
        assert_eq!(fee.billed_hours, 1);
    }

    #[test]
    fn test_rounds_half_up_to_two_decimals() {
        let fee = price(&policy(), ts("2025-03-03T10:00:00"), ts("2025-03-03T11:00:00"), dec!(10.125));
        assert_eq!(fee.total, dec!(10.13));
    }

    #[test]
    fn test_night_discount_applies_to_night_start() {
        let p = TariffPolicy { night_multiplier: dec!(0.5), ..policy() };
        let fee = price(&p, ts("2025-03-03T21:00:00"), ts("2025-03-03T22:00:00"), dec!(10.00));
        assert_eq!(fee.hourly_rate, dec!(5.00));
        assert_eq!(fee.total, dec!(5.00));
    }

    #[test]
    fn test_night_window_wraps_past_midnight() {
        let p = TariffPolicy { night_multiplier: dec!(0.5), ..policy() };
        // 02:00 is inside 20:00-08:00
        let fee = price(&p, ts("2025-03-03T02:00:00"), ts("2025-03-03T03:00:00"), dec!(10.00));
        assert_eq!(fee.hourly_rate, dec!(5.00));
        // 10:00 is outside
        let fee = price(&p, ts("2025-03-03T10:00:00"), ts("2025-03-03T11:00:00"), dec!(10.00));
        assert_eq!(fee.hourly_rate, dec!(10.00));
    }

    #[test]
    fn test_weekend_surcharge() {
        let p = TariffPolicy { weekend_multiplier: dec!(1.5), ..policy() };
        let fee = price(&p, ts("2025-03-01T10:00:00"), ts("2025-03-01T11:00:00"), dec!(10.00));
        assert_eq!(fee.total, dec!(15.00));
        let fee = price(&p, ts("2025-03-03T10:00:00"), ts("2025-03-03T11:00:00"), dec!(10.00));
        assert_eq!(fee.total, dec!(10.00));
    }

    #[test]
    fn test_multipliers_compose_on_base_rate() {
        let p = TariffPolicy {
            night_multiplier: dec!(0.8),
            weekend_multiplier: dec!(1.5),
            ..policy()
        };
        // Saturday night: 10.00 * 0.8 * 1.5 = 12.00
        let fee = price(&p, ts("2025-03-01T21:00:00"), ts("2025-03-01T22:00:00"), dec!(10.00));
        assert_eq!(fee.hourly_rate, dec!(12.00));
        assert_eq!(fee.total, dec!(12.00));
    }

    #[test]
    fn test_minimum_fee_floors_after_multipliers() {
        let p = TariffPolicy { night_multiplier: dec!(0.1), ..policy() };
        // 10.00 * 0.1 = 1.00/h, one hour -> below the 5.00 minimum
        let fee = price(&p, ts("2025-03-03T21:00:00"), ts("2025-03-03T22:00:00"), dec!(10.00));
        assert_eq!(fee.total, dec!(5.00));
    }

    #[test]
    fn test_effective_rate_prefers_positive_override() {
        let p = policy();
        let rate = effective_rate(&spot(Some(dec!(12.00))), Some(&zone(Some(dec!(8.00)))), &p);
        assert_eq!(rate, dec!(12.00));
    }

    #[test]
    fn test_effective_rate_ignores_non_positive_override() {
        let p = policy();
        let rate = effective_rate(&spot(Some(dec!(0))), Some(&zone(Some(dec!(8.00)))), &p);
        assert_eq!(rate, dec!(8.00));
    }

    #[test]
    fn test_effective_rate_falls_back_to_zone_then_default() {
        let p = policy();
        assert_eq!(effective_rate(&spot(None), Some(&zone(Some(dec!(8.00)))), &p), dec!(8.00));
        assert_eq!(effective_rate(&spot(None), Some(&zone(None)), &p), dec!(10.00));
        assert_eq!(effective_rate(&spot(None), None, &p), dec!(10.00));
    }
}
