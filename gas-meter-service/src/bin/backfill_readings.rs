use anyhow::{bail, Result};
use gas_meter_core::{db::RecorderHistorySource, GasMeter};
use gas_meter_service::{
    config::AppConfig,
    observability,
    pipeline::{Envelope, EnvelopeStream, Pipeline, PipelineError, Sink, Source},
    sinks::GasMeterSink,
    sources::{ReadingsBackfillFileSource, ReadingsCsvFileSource},
    state_board::StateBoard,
    store::JsonFileStore,
    transform, ReadingCommand,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, path::Path, sync::Arc};

enum BackfillSource {
    Ndjson(ReadingsBackfillFileSource),
    Delimited(ReadingsCsvFileSource),
}

impl BackfillSource {
    fn for_path(path: &str) -> Result<Self> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "ndjson" | "jsonl" => Ok(Self::Ndjson(ReadingsBackfillFileSource::new(path))),
            "csv" => Ok(Self::Delimited(ReadingsCsvFileSource::new(path))),
            "dat" => Ok(Self::Delimited(ReadingsCsvFileSource::new(path).with_delimiter(b'|'))),
            other => bail!("unsupported backfill file extension '{other}' (expected ndjson, jsonl, csv or dat)"),
        }
    }
}

#[async_trait::async_trait]
impl Source<ReadingCommand> for BackfillSource {
    async fn stream(&self) -> EnvelopeStream<ReadingCommand> {
        match self {
            Self::Ndjson(s) => s.stream().await,
            Self::Delimited(s) => s.stream().await,
        }
    }
}

/// Lets the pipeline drive a sink that is still inspected afterwards.
struct SharedSink<K>(Arc<K>);

#[async_trait::async_trait]
impl<K> Sink<ReadingCommand> for SharedSink<K>
where
    K: Sink<ReadingCommand>,
{
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<ReadingCommand>, PipelineError>> + Send + Unpin + 'static,
    {
        self.0.run(input).await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_readings <ndjson|csv|dat file>");
    }
    let file_path = &args[1];
    let source = BackfillSource::for_path(file_path)?;

    // GAS_METER_CONFIG may point at a backfill-specific file.
    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.recorder.max_connections)
        .connect(&cfg.recorder.uri)
        .await?;

    let meter = GasMeter::new(
        RecorderHistorySource::new(pool),
        JsonFileStore::new(&cfg.meter.data_file),
        cfg.meter.boiler_entity.clone(),
    )
    .with_local_offset(cfg.meter.local_offset()?)
    .with_fallback_rate_per_minute(cfg.meter.fallback_rate_per_minute());

    let sink = Arc::new(GasMeterSink::new(meter, StateBoard::new()));

    let pipeline: Pipeline<_, ReadingCommand, _> = Pipeline {
        name: format!("{}-backfill", cfg.readings.name),
        source,
        transforms: vec![Arc::new(transform::ReadingCommandValidation)],
        sink: SharedSink(sink.clone()),
    };

    pipeline.run().await?;

    tracing::info!(applied = sink.applied(), failed = sink.failed(), "backfill finished");
    if sink.failed() > 0 {
        bail!("{} backfill readings failed", sink.failed());
    }

    Ok(())
}
