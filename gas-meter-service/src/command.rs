use gas_meter_core::{
    domain::{ConsumptionEstimate, Reading, ReadingLog},
    MeterError,
};
use time::OffsetDateTime;
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Result<T, MeterError>>;

/// Work items executed, one at a time, by the meter sink.
#[derive(Debug)]
pub enum ReadingCommand {
    /// Record a manual meter reading.
    Apply {
        datetime: String,
        consumed_gas: String,
        reply: Option<Reply<Reading>>,
    },
    /// Return the persisted log, logging every record.
    ReadLog { reply: Option<Reply<ReadingLog>> },
    /// Project the meter value at `at`.
    Estimate {
        at: OffsetDateTime,
        reply: Option<Reply<Option<ConsumptionEstimate>>>,
    },
}

impl ReadingCommand {
    pub fn apply(datetime: impl Into<String>, consumed_gas: impl Into<String>) -> Self {
        Self::Apply {
            datetime: datetime.into(),
            consumed_gas: consumed_gas.into(),
            reply: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Apply { .. } => "apply",
            Self::ReadLog { .. } => "read_log",
            Self::Estimate { .. } => "estimate",
        }
    }
}

/// Send `result` to the waiting caller, if any. A caller that stopped
/// waiting is not an error.
pub fn respond<T>(reply: Option<Reply<T>>, result: Result<T, MeterError>) {
    if let Some(tx) = reply {
        let _ = tx.send(result);
    }
}
