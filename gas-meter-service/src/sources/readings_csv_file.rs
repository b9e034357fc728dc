use std::{fs::File, path::PathBuf};

use csv::StringRecord;

use crate::{
    command::ReadingCommand,
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source},
};

/// Delimited-text backfill source for readings.
///
/// Expected header columns (by name):
/// - datetime (any accepted reading timestamp form)
/// - consumed_gas
///
/// Comma separated by default; `.dat` exports use `|`.
pub struct ReadingsCsvFileSource {
    path: PathBuf,
    delimiter: u8,
}

impl ReadingsCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn record_to_command(record: &StringRecord, headers: &StringRecord) -> Result<ReadingCommand, PipelineError> {
    let get = |name: &str| -> Result<&str, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV record")))
    };

    Ok(ReadingCommand::apply(get("datetime")?.trim(), get("consumed_gas")?.trim()))
}

#[async_trait::async_trait]
impl Source<ReadingCommand> for ReadingsCsvFileSource {
    async fn stream(&self) -> EnvelopeStream<ReadingCommand> {
        // Reading logs are small, so the blocking reader runs inline.
        let path = self.path.clone();
        let delimiter = self.delimiter;
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open CSV file {}: {e}", path.display())))?;
            let mut rdr = csv::ReaderBuilder::new().delimiter(delimiter).from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
                .clone();

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read CSV record: {e}"
                )))?;

                let command = match record_to_command(&record, &headers) {
                    Ok(c) => c,
                    Err(e) => {
                        metrics::counter!("backfill_readings_csv_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };

                yield Envelope::new(command, "csv");
            }
        };

        Box::pin(s)
    }
}
