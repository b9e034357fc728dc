use std::sync::Arc;

use gas_meter_core::domain::{ConsumptionEstimate, ReadingLog, ReadingUpdate};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Values published for the home-automation host, keyed by entity id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishedStates {
    #[serde(rename = "gas_meter.latest_gas_update", with = "time::serde::rfc3339::option")]
    pub latest_gas_update: Option<OffsetDateTime>,
    #[serde(rename = "gas_meter.latest_gas_data")]
    pub latest_gas_data: Option<f64>,
    #[serde(rename = "gas_meter.average_m3_per_min")]
    pub average_m3_per_min: Option<f64>,
    #[serde(rename = "sensor.consumed_gas")]
    pub consumed_gas_estimate: Option<f64>,
    pub readings: ReadingLog,
}

/// Shared, overwrite-only store of published values.
#[derive(Debug, Clone, Default)]
pub struct StateBoard {
    inner: Arc<RwLock<PublishedStates>>,
}

impl StateBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the outcome of a successful update. The average rate is only
    /// overwritten when this update computed one.
    pub async fn publish(&self, update: &ReadingUpdate) {
        let mut states = self.inner.write().await;
        states.latest_gas_update = Some(update.latest_timestamp());
        states.latest_gas_data = Some(update.latest_value());
        if let Some(rate) = update.average_rate() {
            states.average_m3_per_min = Some(rate);
        }
        states.readings = update.log.clone();
    }

    pub async fn publish_estimate(&self, estimate: &ConsumptionEstimate) {
        // Three decimals, as shown on the consumed gas sensor.
        let rounded = (estimate.estimated_value * 1000.0).round() / 1000.0;
        self.inner.write().await.consumed_gas_estimate = Some(rounded);
    }

    pub async fn snapshot(&self) -> PublishedStates {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gas_meter_core::domain::{DerivedMetrics, Reading};
    use time::macros::datetime;

    fn update(ts: OffsetDateTime, value: f64, average_rate: Option<f64>) -> ReadingUpdate {
        let mut reading = Reading::new(ts, value);
        reading.derived = Some(DerivedMetrics {
            interval_rate: None,
            cumulative_consumed: 1.0,
            cumulative_active_minutes: 0.0,
            average_rate,
        });
        ReadingUpdate {
            reading,
            interval_active_minutes: Some(0.0),
            log: ReadingLog::new(),
        }
    }

    #[tokio::test]
    async fn average_is_kept_when_not_recomputed() {
        let board = StateBoard::new();
        board
            .publish(&update(datetime!(2025-01-12 10:30:00 UTC), 103.0, Some(0.2)))
            .await;
        board
            .publish(&update(datetime!(2025-01-12 11:00:00 UTC), 104.0, None))
            .await;

        let states = board.snapshot().await;
        assert_eq!(states.latest_gas_update, Some(datetime!(2025-01-12 11:00:00 UTC)));
        assert_eq!(states.latest_gas_data, Some(104.0));
        assert_eq!(states.average_m3_per_min, Some(0.2));
    }

    #[tokio::test]
    async fn serializes_with_entity_ids() {
        let board = StateBoard::new();
        board
            .publish(&update(datetime!(2025-01-12 10:30:00 UTC), 103.0, Some(0.2)))
            .await;

        let json = serde_json::to_value(board.snapshot().await).unwrap();
        assert_eq!(json["gas_meter.latest_gas_update"], "2025-01-12T10:30:00Z");
        assert_eq!(json["gas_meter.latest_gas_data"], 103.0);
        assert_eq!(json["gas_meter.average_m3_per_min"], 0.2);
        assert!(json["sensor.consumed_gas"].is_null());
    }
}
