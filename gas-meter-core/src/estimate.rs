use time::OffsetDateTime;

use crate::domain::{ConsumptionEstimate, ReadingLog};

/// Burn rate per hour assumed for the boiler before any average exists.
pub const DEFAULT_BOILER_RATE_PER_HOUR: f64 = 0.64153071524727;

/// Project the meter value at `at` from the newest reading.
///
/// Uses the newest known average rate, falling back to
/// `fallback_rate_per_minute` while no average has been measured.
/// The log must not be empty.
pub fn estimate_consumption(
    log: &ReadingLog,
    at: OffsetDateTime,
    active_minutes_since_reading: f64,
    fallback_rate_per_minute: f64,
) -> ConsumptionEstimate {
    let base = log.last().map(|r| r.cumulative_value).unwrap_or(0.0);
    let measured = log
        .iter()
        .rev()
        .find_map(|r| r.derived.and_then(|d| d.average_rate));

    let (rate, fallback_rate) = match measured {
        Some(rate) => (rate, false),
        None => (fallback_rate_per_minute, true),
    };

    ConsumptionEstimate {
        at,
        estimated_value: base + active_minutes_since_reading * rate,
        active_minutes_since_reading,
        rate,
        fallback_rate,
    }
}
