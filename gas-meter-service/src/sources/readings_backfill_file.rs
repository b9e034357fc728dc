use std::path::PathBuf;

use async_stream::try_stream;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use super::IncomingReading;
use crate::{
    command::ReadingCommand,
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source},
};

/// NDJSON backfill source.
///
/// Each non-empty line is a JSON object shaped like the HTTP payload:
/// `{"datetime": "2025-01-12 14:50", "consumed_gas": 103.5}`.
pub struct ReadingsBackfillFileSource {
    path: PathBuf,
}

impl ReadingsBackfillFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn parse_line(line: &str) -> Result<IncomingReading, PipelineError> {
    serde_json::from_str(line).map_err(|e| PipelineError::Source(format!("failed to parse backfill json line: {e}")))
}

#[async_trait::async_trait]
impl Source<ReadingCommand> for ReadingsBackfillFileSource {
    async fn stream(&self) -> EnvelopeStream<ReadingCommand> {
        let path = self.path.clone();
        let s = try_stream! {
            let file = File::open(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to open backfill file {}: {e}", path.display()))
            })?;
            let mut lines = BufReader::new(file).lines();

            while let Some(line) = lines.next_line().await.map_err(|e| {
                PipelineError::Source(format!("failed to read backfill line: {e}"))
            })? {
                if line.trim().is_empty() {
                    continue;
                }
                let incoming = match parse_line(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        metrics::counter!("backfill_readings_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };
                yield Envelope::new(ReadingCommand::from(incoming), "ndjson");
            }
        };

        Box::pin(s)
    }
}
