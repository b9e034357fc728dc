use std::sync::Arc;

use anyhow::Result;
use gas_meter_core::{db::RecorderHistorySource, GasMeter};
use gas_meter_service::{
    config::AppConfig,
    metrics_server, observability,
    pipeline::Pipeline,
    sinks::GasMeterSink,
    sources::HttpReadingSource,
    state_board::StateBoard,
    store::JsonFileStore,
    transform, ReadingCommand,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    tracing::info!(boiler_entity = %cfg.meter.boiler_entity, "loading virtual gas meter");

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

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

    let board = StateBoard::new();
    let source = HttpReadingSource::new(
        &cfg.readings.source.http_bind_addr,
        cfg.readings.source.channel_capacity,
        board.clone(),
    )
    .await?;

    let pipeline: Pipeline<_, ReadingCommand, _> = Pipeline {
        name: cfg.readings.name.clone(),
        source,
        transforms: vec![Arc::new(transform::ReadingCommandValidation)],
        sink: GasMeterSink::new(meter, board),
    };

    pipeline.run().await?;

    Ok(())
}
