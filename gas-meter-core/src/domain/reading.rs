use time::OffsetDateTime;

use crate::error::MeterError;

/// Metrics derived for a reading from the interval that ends at it.
///
/// Only readings after the first carry these; the first reading is the
/// baseline every cumulative value is measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DerivedMetrics {
    /// Consumption per active minute for this interval. Absent when the
    /// boiler was never active during the interval.
    pub interval_rate: Option<f64>,
    pub cumulative_consumed: f64,
    pub cumulative_active_minutes: f64,
    /// Lifetime consumption per active minute. Absent while no active time
    /// has been accumulated.
    pub average_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reading {
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    pub cumulative_value: f64,
    pub derived: Option<DerivedMetrics>,
}

impl Reading {
    pub fn new(timestamp: OffsetDateTime, cumulative_value: f64) -> Self {
        Self {
            timestamp,
            cumulative_value,
            derived: None,
        }
    }
}

/// Append-only, strictly time-ordered log of meter readings.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(transparent))]
pub struct ReadingLog {
    readings: Vec<Reading>,
}

impl ReadingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from stored readings, re-checking the ordering and value
    /// rules `add_record` enforces.
    pub fn from_readings(readings: Vec<Reading>) -> Result<Self, MeterError> {
        let mut log = Self::new();
        for reading in readings {
            log.check_next(reading.timestamp, reading.cumulative_value)?;
            log.readings.push(reading);
        }
        Ok(log)
    }

    /// Append a bare reading. Derived metrics are filled in separately.
    pub fn add_record(
        &mut self,
        timestamp: OffsetDateTime,
        cumulative_value: f64,
    ) -> Result<(), MeterError> {
        self.check_next(timestamp, cumulative_value)?;
        self.readings.push(Reading::new(timestamp, cumulative_value));
        Ok(())
    }

    fn check_next(&self, timestamp: OffsetDateTime, cumulative_value: f64) -> Result<(), MeterError> {
        if !cumulative_value.is_finite() {
            return Err(MeterError::InvalidInput(format!(
                "cumulative value {cumulative_value} is not a finite number"
            )));
        }
        if cumulative_value < 0.0 {
            return Err(MeterError::InvalidInput(format!(
                "cumulative value {cumulative_value} must be non-negative"
            )));
        }
        if let Some(last) = self.readings.last() {
            if timestamp <= last.timestamp {
                return Err(MeterError::InvalidInput(format!(
                    "reading at {timestamp} does not follow latest reading at {}",
                    last.timestamp
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Index into the log; negative indices count back from the newest
    /// reading (`-1` is the latest).
    pub fn at(&self, index: isize) -> Option<&Reading> {
        let resolved = if index < 0 {
            self.readings.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        self.readings.get(resolved)
    }

    pub fn first(&self) -> Option<&Reading> {
        self.readings.first()
    }

    pub fn last(&self) -> Option<&Reading> {
        self.readings.last()
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Reading> {
        self.readings.last_mut()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.readings.iter()
    }

    pub fn as_slice(&self) -> &[Reading] {
        &self.readings
    }
}

impl<'a> IntoIterator for &'a ReadingLog {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}
