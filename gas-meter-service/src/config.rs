use gas_meter_core::estimate::DEFAULT_BOILER_RATE_PER_HOUR;
use serde::Deserialize;
use std::fs;
use time::UtcOffset;

fn default_boiler_entity() -> String {
    "switch.kociol_l1".to_string()
}

fn default_data_file() -> String {
    "gas_actualdata.json".to_string()
}

fn default_fallback_rate_per_hour() -> f64 {
    DEFAULT_BOILER_RATE_PER_HOUR
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    /// Switch entity whose "on" time drives the burn-rate metrics.
    #[serde(default = "default_boiler_entity")]
    pub boiler_entity: String,
    #[serde(default = "default_data_file")]
    pub data_file: String,
    /// Offset applied to reading timestamps sent without one.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_fallback_rate_per_hour")]
    pub fallback_rate_per_hour: f64,
}

impl MeterConfig {
    pub fn local_offset(&self) -> anyhow::Result<UtcOffset> {
        UtcOffset::from_whole_seconds(self.utc_offset_minutes * 60)
            .map_err(|e| anyhow::anyhow!("invalid meter.utc_offset_minutes {}: {e}", self.utc_offset_minutes))
    }

    pub fn fallback_rate_per_minute(&self) -> f64 {
        self.fallback_rate_per_hour / 60.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSourceConfig {
    pub http_bind_addr: String,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub source: HttpSourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub meter: MeterConfig,
    pub recorder: RecorderConfig,
    pub readings: PipelineConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("GAS_METER_CONFIG").unwrap_or_else(|_| "gas-meter.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [meter]

        [recorder]
        uri = "postgres://ha:ha@localhost/homeassistant"
        max_connections = 2

        [readings]
        name = "readings"

        [readings.source]
        http_bind_addr = "127.0.0.1:8124"
        channel_capacity = 16
    "#;

    #[test]
    fn meter_section_falls_back_to_defaults() {
        let cfg = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.meter.boiler_entity, "switch.kociol_l1");
        assert_eq!(cfg.meter.data_file, "gas_actualdata.json");
        assert_eq!(cfg.meter.local_offset().unwrap(), UtcOffset::UTC);
        assert!((cfg.meter.fallback_rate_per_minute() - 0.010692178587454502).abs() < 1e-12);
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn explicit_meter_settings_are_used() {
        let toml = MINIMAL.replace(
            "[meter]",
            "[meter]\nboiler_entity = \"switch.boiler\"\nutc_offset_minutes = 60\nfallback_rate_per_hour = 1.2",
        );
        let cfg = AppConfig::from_toml(&toml).unwrap();
        assert_eq!(cfg.meter.boiler_entity, "switch.boiler");
        assert_eq!(cfg.meter.local_offset().unwrap().whole_hours(), 1);
        assert!((cfg.meter.fallback_rate_per_minute() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let toml = MINIMAL.replace("[meter]", "[meter]\nutc_offset_minutes = 100000");
        let cfg = AppConfig::from_toml(&toml).unwrap();
        assert!(cfg.meter.local_offset().is_err());
    }
}
