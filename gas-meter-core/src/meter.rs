use time::{OffsetDateTime, UtcOffset};

use crate::{
    activity::active_minutes,
    derive::derive_latest,
    domain::{ActivityEvent, ConsumptionEstimate, ReadingLog, ReadingUpdate},
    error::MeterError,
    estimate::estimate_consumption,
    timestamp::{parse_reading_timestamp, parse_reading_value},
};

/// Source of the monitored switch's state changes.
#[async_trait::async_trait]
pub trait HistorySource: Send + Sync {
    /// State changes of `entity_id` within `[start, end]`, ordered by time.
    async fn query_active_intervals(
        &self,
        entity_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ActivityEvent>, MeterError>;
}

/// Durable storage for the reading log.
#[async_trait::async_trait]
pub trait LogStore: Send + Sync {
    /// Load the stored log, or an empty one when nothing has been stored yet.
    async fn load(&self) -> Result<ReadingLog, MeterError>;

    async fn save(&self, log: &ReadingLog) -> Result<(), MeterError>;
}

/// In-memory history, used for replays and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    events: Vec<(String, ActivityEvent)>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a state change. Changes must be pushed in time order per entity.
    pub fn push(&mut self, entity_id: &str, timestamp: OffsetDateTime, state: &str) {
        self.events
            .push((entity_id.to_string(), ActivityEvent::new(timestamp, state)));
    }
}

#[async_trait::async_trait]
impl HistorySource for InMemoryHistory {
    async fn query_active_intervals(
        &self,
        entity_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ActivityEvent>, MeterError> {
        let entity_events = self
            .events
            .iter()
            .filter(|(id, _)| id == entity_id)
            .map(|(_, e)| e);

        // Report the state in effect at `start` the way the recorder does.
        let opening = entity_events
            .clone()
            .filter(|e| e.timestamp < start)
            .last()
            .map(|e| ActivityEvent::new(start, e.state.clone()));

        let in_range = entity_events
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned();

        Ok(opening.into_iter().chain(in_range).collect())
    }
}

/// Applies readings to the persisted log of one gas meter.
///
/// Calls must not overlap; the caller serializes updates.
pub struct GasMeter<H, S> {
    history: H,
    store: S,
    boiler_entity: String,
    local_offset: UtcOffset,
    fallback_rate_per_minute: f64,
}

impl<H, S> GasMeter<H, S>
where
    H: HistorySource,
    S: LogStore,
{
    pub fn new(history: H, store: S, boiler_entity: impl Into<String>) -> Self {
        Self {
            history,
            store,
            boiler_entity: boiler_entity.into(),
            local_offset: UtcOffset::UTC,
            fallback_rate_per_minute: 0.0,
        }
    }

    /// Offset assumed for timestamps that carry none.
    pub fn with_local_offset(mut self, offset: UtcOffset) -> Self {
        self.local_offset = offset;
        self
    }

    /// Rate used by estimates before any average has been measured.
    pub fn with_fallback_rate_per_minute(mut self, rate: f64) -> Self {
        self.fallback_rate_per_minute = rate;
        self
    }

    pub fn boiler_entity(&self) -> &str {
        &self.boiler_entity
    }

    /// Parse and apply one reading, persisting the enriched log.
    ///
    /// Nothing is persisted unless every step succeeds.
    pub async fn apply_reading(&self, timestamp: &str, cumulative_value: &str) -> Result<ReadingUpdate, MeterError> {
        let timestamp = parse_reading_timestamp(timestamp, self.local_offset)?;
        let cumulative_value = parse_reading_value(cumulative_value)?;
        self.apply(timestamp, cumulative_value).await
    }

    /// Apply an already parsed reading.
    pub async fn apply(&self, timestamp: OffsetDateTime, cumulative_value: f64) -> Result<ReadingUpdate, MeterError> {
        let mut log = self.store.load().await?;
        log.add_record(timestamp, cumulative_value)?;

        let mut interval_active_minutes = None;
        if let Some(previous) = log.at(-2) {
            let start = previous.timestamp.to_offset(UtcOffset::UTC);
            let end = timestamp.to_offset(UtcOffset::UTC);
            let minutes = self.active_minutes_between(start, end).await?;
            derive_latest(&mut log, minutes)?;
            interval_active_minutes = Some(minutes);
        }

        self.store.save(&log).await?;

        let reading = log
            .last()
            .cloned()
            .ok_or_else(|| MeterError::InvalidInput("reading log is empty after append".to_string()))?;

        tracing::info!(
            reading_count = log.len(),
            cumulative_value = reading.cumulative_value,
            active_minutes = interval_active_minutes,
            average_rate = reading.derived.and_then(|d| d.average_rate),
            "gas reading applied"
        );

        Ok(ReadingUpdate {
            reading,
            interval_active_minutes,
            log,
        })
    }

    /// The persisted log as it currently stands.
    pub async fn read_log(&self) -> Result<ReadingLog, MeterError> {
        self.store.load().await
    }

    /// Estimate the meter value at `at` from the latest reading and the
    /// boiler's activity since then. `None` when no reading exists yet.
    pub async fn estimate(&self, at: OffsetDateTime) -> Result<Option<ConsumptionEstimate>, MeterError> {
        let log = self.store.load().await?;
        let Some(latest) = log.last() else {
            return Ok(None);
        };

        let start = latest.timestamp.to_offset(UtcOffset::UTC);
        let end = at.to_offset(UtcOffset::UTC);
        let minutes = self.active_minutes_between(start, end).await?;
        Ok(Some(estimate_consumption(
            &log,
            at,
            minutes,
            self.fallback_rate_per_minute,
        )))
    }

    async fn active_minutes_between(&self, start: OffsetDateTime, end: OffsetDateTime) -> Result<f64, MeterError> {
        let events = self
            .history
            .query_active_intervals(&self.boiler_entity, start, end)
            .await?;
        for event in &events {
            tracing::debug!(last_changed = %event.timestamp, state = %event.state, "boiler history record");
        }
        Ok(active_minutes(&events, start, end))
    }
}
