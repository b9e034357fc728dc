use time::OffsetDateTime;

use super::reading::{Reading, ReadingLog};

/// Result of one successful update, for the host to publish.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReadingUpdate {
    /// The reading that was just appended, with its derived metrics.
    pub reading: Reading,
    /// Active minutes measured for the interval ending at `reading`.
    pub interval_active_minutes: Option<f64>,
    pub log: ReadingLog,
}

impl ReadingUpdate {
    pub fn latest_timestamp(&self) -> OffsetDateTime {
        self.reading.timestamp
    }

    pub fn latest_value(&self) -> f64 {
        self.reading.cumulative_value
    }

    /// Average rate, only when it was computed during this update.
    pub fn average_rate(&self) -> Option<f64> {
        self.reading.derived.and_then(|d| d.average_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConsumptionEstimate {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub at: OffsetDateTime,
    pub estimated_value: f64,
    pub active_minutes_since_reading: f64,
    pub rate: f64,
    /// True when `rate` is the configured fallback rather than a measured average.
    pub fallback_rate: bool,
}
