use crate::domain::{DerivedMetrics, ReadingLog};
use crate::error::MeterError;

/// Fill in the derived metrics of the newest reading.
///
/// `active_minutes` is the active time measured between the previous and the
/// newest reading. Cumulative values build on the previous reading's metrics,
/// so every appended reading must go through here. Returns `None` while the
/// log holds fewer than two readings.
pub fn derive_latest(log: &mut ReadingLog, active_minutes: f64) -> Result<Option<DerivedMetrics>, MeterError> {
    if log.len() < 2 {
        return Ok(None);
    }
    if !active_minutes.is_finite() || active_minutes < 0.0 {
        return Err(MeterError::InvalidInput(format!(
            "active minutes {active_minutes} must be a finite non-negative number"
        )));
    }

    let (baseline, previous, latest) = match (log.first(), log.at(-2), log.at(-1)) {
        (Some(b), Some(p), Some(l)) => (b, p, l),
        _ => return Ok(None),
    };

    let interval_rate = if active_minutes != 0.0 {
        Some((latest.cumulative_value - previous.cumulative_value) / active_minutes)
    } else {
        None
    };

    let cumulative_consumed = latest.cumulative_value - baseline.cumulative_value;

    let cumulative_active_minutes = if log.len() == 2 {
        active_minutes
    } else {
        let previous_minutes = previous
            .derived
            .map(|d| d.cumulative_active_minutes)
            .ok_or_else(|| {
                MeterError::InvalidInput(format!(
                    "reading at {} has no derived metrics to build on",
                    previous.timestamp
                ))
            })?;
        active_minutes + previous_minutes
    };

    let average_rate = if cumulative_active_minutes != 0.0 {
        Some(cumulative_consumed / cumulative_active_minutes)
    } else {
        None
    };

    let metrics = DerivedMetrics {
        interval_rate,
        cumulative_consumed,
        cumulative_active_minutes,
        average_rate,
    };

    if let Some(latest) = log.last_mut() {
        latest.derived = Some(metrics);
    }
    Ok(Some(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{macros::datetime, Duration, OffsetDateTime};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn append(log: &mut ReadingLog, ts: OffsetDateTime, value: f64, minutes: f64) -> Option<DerivedMetrics> {
        log.add_record(ts, value).unwrap();
        derive_latest(log, minutes).unwrap()
    }

    #[test]
    fn first_reading_gets_no_metrics() {
        let mut log = ReadingLog::new();
        assert!(append(&mut log, datetime!(2025-01-12 10:00:00 UTC), 100.0, 30.0).is_none());
        assert!(log.first().unwrap().derived.is_none());
    }

    #[test]
    fn two_interval_scenario() {
        let mut log = ReadingLog::new();
        append(&mut log, datetime!(2025-01-12 10:00:00 UTC), 100.0, 0.0);

        let second = append(&mut log, datetime!(2025-01-12 10:30:00 UTC), 103.0, 15.0).unwrap();
        assert!(approx(second.interval_rate.unwrap(), 0.2));
        assert!(approx(second.cumulative_consumed, 3.0));
        assert!(approx(second.cumulative_active_minutes, 15.0));
        assert!(approx(second.average_rate.unwrap(), 0.2));

        let third = append(&mut log, datetime!(2025-01-12 11:00:00 UTC), 106.0, 15.0).unwrap();
        assert!(approx(third.cumulative_consumed, 6.0));
        assert!(approx(third.cumulative_active_minutes, 30.0));
        assert!(approx(third.average_rate.unwrap(), 0.2));
        assert_eq!(log.at(-1).unwrap().derived, Some(third));
    }

    #[test]
    fn zero_active_minutes_omits_interval_rate() {
        let mut log = ReadingLog::new();
        append(&mut log, datetime!(2025-01-12 10:00:00 UTC), 100.0, 0.0);
        let second = append(&mut log, datetime!(2025-01-12 10:30:00 UTC), 101.0, 0.0).unwrap();
        assert!(second.interval_rate.is_none());
        assert!(second.average_rate.is_none());
        assert!(approx(second.cumulative_consumed, 1.0));
        assert_eq!(second.cumulative_active_minutes, 0.0);

        // Average appears once active time has accumulated.
        let third = append(&mut log, datetime!(2025-01-12 11:00:00 UTC), 103.0, 10.0).unwrap();
        assert!(approx(third.interval_rate.unwrap(), 0.2));
        assert!(approx(third.average_rate.unwrap(), 0.3));

        // A later idle interval keeps the lifetime average.
        let fourth = append(&mut log, datetime!(2025-01-12 11:30:00 UTC), 103.0, 0.0).unwrap();
        assert!(fourth.interval_rate.is_none());
        assert!(approx(fourth.average_rate.unwrap(), 0.3));
    }

    #[test]
    fn missing_previous_metrics_is_rejected() {
        let mut log = ReadingLog::new();
        log.add_record(datetime!(2025-01-12 10:00:00 UTC), 1.0).unwrap();
        log.add_record(datetime!(2025-01-12 10:30:00 UTC), 2.0).unwrap();
        log.add_record(datetime!(2025-01-12 11:00:00 UTC), 3.0).unwrap();
        let res = derive_latest(&mut log, 5.0);
        assert!(matches!(res, Err(MeterError::InvalidInput(_))));
        assert!(log.at(-1).unwrap().derived.is_none());
    }

    #[test]
    fn recurrence_matches_full_recomputation() {
        let start = datetime!(2025-01-01 00:00:00 UTC);
        let values = [10.0, 10.4, 11.9, 11.9, 12.75, 14.0, 14.1, 16.3];
        let minutes = [0.0, 12.0, 40.5, 0.0, 7.25, 33.0, 1.0, 55.0];

        let mut log = ReadingLog::new();
        for (i, (v, m)) in values.iter().zip(minutes.iter()).enumerate() {
            append(&mut log, start + Duration::hours(i as i64), *v, *m);
        }

        let baseline = values[0];
        let mut expected_minutes = 0.0;
        let mut previous_minutes = 0.0;
        for i in 1..values.len() {
            let derived = log.at(i as isize).unwrap().derived.unwrap();
            expected_minutes += minutes[i];
            assert!(approx(derived.cumulative_consumed, values[i] - baseline));
            assert!(approx(derived.cumulative_active_minutes, expected_minutes));
            assert!(derived.cumulative_active_minutes >= previous_minutes);
            previous_minutes = derived.cumulative_active_minutes;
        }
    }

    #[test]
    fn decreasing_reading_yields_negative_interval_rate() {
        let mut log = ReadingLog::new();
        append(&mut log, datetime!(2025-01-12 10:00:00 UTC), 100.0, 0.0);
        let second = append(&mut log, datetime!(2025-01-12 10:30:00 UTC), 98.0, 10.0).unwrap();
        assert!(approx(second.interval_rate.unwrap(), -0.2));
        assert!(approx(second.cumulative_consumed, -2.0));
    }

    #[test]
    fn rejects_negative_active_minutes() {
        let mut log = ReadingLog::new();
        append(&mut log, datetime!(2025-01-12 10:00:00 UTC), 100.0, 0.0);
        log.add_record(datetime!(2025-01-12 10:30:00 UTC), 101.0).unwrap();
        assert!(derive_latest(&mut log, -1.0).is_err());
    }
}
