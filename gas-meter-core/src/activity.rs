use time::OffsetDateTime;

use crate::domain::ActivityEvent;

/// Total minutes the switch spent active within `[start, end)`.
///
/// Events are expected in chronological order. Events before `start` only
/// set the state that is open at `start`; events at or after `end` are
/// ignored. When no state is known for part of the range, that part counts
/// as inactive, so an empty event list yields zero.
pub fn active_minutes(events: &[ActivityEvent], start: OffsetDateTime, end: OffsetDateTime) -> f64 {
    if end <= start {
        return 0.0;
    }

    let mut total_seconds = 0.0;
    let mut previous_active: Option<bool> = None;
    let mut previous_time = start;

    for event in events {
        if event.timestamp >= end {
            break;
        }
        if event.timestamp < start {
            previous_active = Some(event.is_active());
            continue;
        }

        if previous_active == Some(true) {
            total_seconds += (event.timestamp - previous_time).as_seconds_f64();
        }
        previous_active = Some(event.is_active());
        previous_time = event.timestamp;
    }

    if previous_active == Some(true) {
        total_seconds += (end - previous_time).as_seconds_f64();
    }

    total_seconds / 60.0
}
