use anyhow::Result;
use gas_meter_core::LogStore;
use gas_meter_service::{config::AppConfig, observability, store::JsonFileStore};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let store = JsonFileStore::new(&cfg.meter.data_file);
    let log = store.load().await?;

    tracing::info!(path = %store.path().display(), readings = log.len(), "gas reading log");
    for record in &log {
        tracing::info!(record = ?record, "gas record");
    }

    Ok(())
}
