use anyhow::{anyhow, Result};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{domain::ActivityEvent, error::MeterError, meter::HistorySource};

/// One row of the recorder's `states` table, reduced to what the
/// accumulator needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StateChangeRow {
    pub state: Option<String>,
    /// Seconds since the Unix epoch, as the recorder stores it.
    pub changed_ts: f64,
}

impl StateChangeRow {
    fn into_event(self) -> Result<ActivityEvent> {
        let ts = epoch_seconds_to_datetime(self.changed_ts)?;
        Ok(ActivityEvent::new(ts, self.state.unwrap_or_else(|| "unknown".to_string())))
    }
}

fn epoch_seconds_to_datetime(secs: f64) -> Result<OffsetDateTime> {
    if !secs.is_finite() {
        return Err(anyhow!("invalid recorder timestamp {secs}"));
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as i64;
    let base = OffsetDateTime::from_unix_timestamp(whole as i64)
        .map_err(|e| anyhow!("invalid recorder timestamp {secs}: {e}"))?;
    Ok(base + time::Duration::nanoseconds(nanos))
}

fn datetime_to_epoch_seconds(ts: OffsetDateTime) -> f64 {
    ts.unix_timestamp() as f64 + f64::from(ts.nanosecond()) / 1e9
}

/// The last state change of `entity_id` strictly before `before`.
pub async fn state_before(pool: &PgPool, entity_id: &str, before: OffsetDateTime) -> Result<Option<StateChangeRow>> {
    let row = sqlx::query_as::<_, StateChangeRow>(
        r#"
        SELECT
            s.state,
            COALESCE(s.last_changed_ts, s.last_updated_ts) AS changed_ts
        FROM states s
        JOIN states_meta m ON s.metadata_id = m.metadata_id
        WHERE m.entity_id = $1
          AND s.last_updated_ts < $2
        ORDER BY s.last_updated_ts DESC
        LIMIT 1
        "#,
    )
    .bind(entity_id)
    .bind(datetime_to_epoch_seconds(before))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetch the time-ordered state changes of a single entity within
/// `[start, end]`. Attribute-only updates are skipped.
pub async fn state_changes(
    pool: &PgPool,
    entity_id: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<StateChangeRow>> {
    let rows = sqlx::query_as::<_, StateChangeRow>(
        r#"
        SELECT
            s.state,
            COALESCE(s.last_changed_ts, s.last_updated_ts) AS changed_ts
        FROM states s
        JOIN states_meta m ON s.metadata_id = m.metadata_id
        WHERE m.entity_id = $1
          AND s.last_updated_ts >= $2
          AND s.last_updated_ts <= $3
          AND (s.last_changed_ts IS NULL OR s.last_changed_ts = s.last_updated_ts)
        ORDER BY s.last_updated_ts
        "#,
    )
    .bind(entity_id)
    .bind(datetime_to_epoch_seconds(start))
    .bind(datetime_to_epoch_seconds(end))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// History source backed by the home-automation recorder database.
///
/// The state in effect at `start` is reported first, stamped at `start`.
#[derive(Debug, Clone)]
pub struct RecorderHistorySource {
    pool: PgPool,
}

impl RecorderHistorySource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn events(&self, entity_id: &str, start: OffsetDateTime, end: OffsetDateTime) -> Result<Vec<ActivityEvent>> {
        let opening = state_before(&self.pool, entity_id, start).await?;
        let changes = state_changes(&self.pool, entity_id, start, end).await?;

        let mut events = Vec::with_capacity(changes.len() + 1);
        if let Some(row) = opening {
            events.push(ActivityEvent::new(start, row.state.unwrap_or_else(|| "unknown".to_string())));
        }
        for row in changes {
            events.push(row.into_event()?);
        }
        Ok(events)
    }
}

#[async_trait::async_trait]
impl HistorySource for RecorderHistorySource {
    async fn query_active_intervals(
        &self,
        entity_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<ActivityEvent>, MeterError> {
        self.events(entity_id, start, end).await.map_err(|e| {
            tracing::error!(error = %e, entity_id, "recorder history query failed");
            MeterError::HistorySource(e.to_string())
        })
    }
}
