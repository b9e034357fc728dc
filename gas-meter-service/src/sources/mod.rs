pub mod http_readings;
pub mod readings_backfill_file;
pub mod readings_csv_file;

pub use http_readings::HttpReadingSource;
pub use readings_backfill_file::ReadingsBackfillFileSource;
pub use readings_csv_file::ReadingsCsvFileSource;

use crate::command::ReadingCommand;

/// A reading as submitted by the host or a backfill file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct IncomingReading {
    pub datetime: String,
    pub consumed_gas: GasValue,
}

/// Meter values arrive either as JSON numbers or as strings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(untagged)]
pub enum GasValue {
    Number(f64),
    Text(String),
}

impl GasValue {
    pub fn into_text(self) -> String {
        match self {
            Self::Number(v) => v.to_string(),
            Self::Text(s) => s,
        }
    }
}

impl From<IncomingReading> for ReadingCommand {
    fn from(i: IncomingReading) -> Self {
        ReadingCommand::apply(i.datetime, i.consumed_gas.into_text())
    }
}
