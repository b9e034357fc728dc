use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use gas_meter_core::{
    domain::{DerivedMetrics, Reading, ReadingLog},
    LogStore, MeterError,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// On-disk layout of the reading log. New layouts get a new variant; old
/// ones stay readable.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "version")]
enum LogFile {
    #[serde(rename = "1")]
    V1(LogFileV1),
}

#[derive(Debug, Serialize, Deserialize)]
struct LogFileV1 {
    /// BLAKE3 digest of `readings`, hex encoded.
    checksum: String,
    readings: Vec<StoredReadingV1>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredReadingV1 {
    #[serde(with = "time::serde::rfc3339")]
    datetime: OffsetDateTime,
    consumed_gas: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    m3_per_min_interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    consumed_gas_cumulated: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_cumulated: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    average_m3_per_min: Option<f64>,
}

impl From<&Reading> for StoredReadingV1 {
    fn from(r: &Reading) -> Self {
        StoredReadingV1 {
            datetime: r.timestamp,
            consumed_gas: r.cumulative_value,
            m3_per_min_interval: r.derived.and_then(|d| d.interval_rate),
            consumed_gas_cumulated: r.derived.map(|d| d.cumulative_consumed),
            min_cumulated: r.derived.map(|d| d.cumulative_active_minutes),
            average_m3_per_min: r.derived.and_then(|d| d.average_rate),
        }
    }
}

impl TryFrom<StoredReadingV1> for Reading {
    type Error = MeterError;

    fn try_from(s: StoredReadingV1) -> Result<Self, Self::Error> {
        let derived = match (s.consumed_gas_cumulated, s.min_cumulated) {
            (Some(cumulative_consumed), Some(cumulative_active_minutes)) => Some(DerivedMetrics {
                interval_rate: s.m3_per_min_interval,
                cumulative_consumed,
                cumulative_active_minutes,
                average_rate: s.average_m3_per_min,
            }),
            (None, None) if s.m3_per_min_interval.is_none() && s.average_m3_per_min.is_none() => None,
            _ => {
                return Err(MeterError::Storage(format!(
                    "reading at {} has incomplete derived metrics",
                    s.datetime
                )))
            }
        };

        Ok(Reading {
            timestamp: s.datetime,
            cumulative_value: s.consumed_gas,
            derived,
        })
    }
}

fn hash_f64(hasher: &mut blake3::Hasher, v: f64) {
    hasher.update(&v.to_bits().to_le_bytes());
}

fn hash_opt_f64(hasher: &mut blake3::Hasher, v: Option<f64>) {
    match v {
        Some(x) => {
            hasher.update(&[1]);
            hash_f64(hasher, x);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn readings_checksum(readings: &[StoredReadingV1]) -> String {
    let mut h = blake3::Hasher::new();
    h.update(&(readings.len() as u64).to_le_bytes());
    for r in readings {
        h.update(&r.datetime.unix_timestamp_nanos().to_le_bytes());
        h.update(&r.datetime.offset().whole_seconds().to_le_bytes());
        hash_f64(&mut h, r.consumed_gas);
        hash_opt_f64(&mut h, r.m3_per_min_interval);
        hash_opt_f64(&mut h, r.consumed_gas_cumulated);
        hash_opt_f64(&mut h, r.min_cumulated);
        hash_opt_f64(&mut h, r.average_m3_per_min);
    }
    h.finalize().to_hex().to_string()
}

fn encode(log: &ReadingLog) -> Result<Vec<u8>, MeterError> {
    let readings: Vec<StoredReadingV1> = log.iter().map(StoredReadingV1::from).collect();
    let file = LogFile::V1(LogFileV1 {
        checksum: readings_checksum(&readings),
        readings,
    });
    serde_json::to_vec_pretty(&file).map_err(|e| MeterError::Storage(format!("failed to encode reading log: {e}")))
}

fn decode(bytes: &[u8]) -> Result<ReadingLog, MeterError> {
    let file: LogFile =
        serde_json::from_slice(bytes).map_err(|e| MeterError::Storage(format!("failed to decode reading log: {e}")))?;

    match file {
        LogFile::V1(v1) => {
            let expected = readings_checksum(&v1.readings);
            if expected != v1.checksum {
                return Err(MeterError::Storage(format!(
                    "reading log checksum mismatch: stored {}, computed {expected}",
                    v1.checksum
                )));
            }
            let readings = v1
                .readings
                .into_iter()
                .map(Reading::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            ReadingLog::from_readings(readings)
                .map_err(|e| MeterError::Storage(format!("stored reading log is inconsistent: {e}")))
        }
    }
}

/// Persists the reading log as a versioned JSON document.
///
/// Saves go to a sibling temporary file that is then renamed over the
/// target, so a failed save leaves the previous log in place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl LogStore for JsonFileStore {
    async fn load(&self) -> Result<ReadingLog, MeterError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => decode(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no reading log yet, starting empty");
                Ok(ReadingLog::new())
            }
            Err(e) => Err(MeterError::Storage(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, log: &ReadingLog) -> Result<(), MeterError> {
        let bytes = encode(log)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MeterError::Storage(format!("failed to create {}: {e}", parent.display())))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| MeterError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| MeterError::Storage(format!("failed to replace {}: {e}", self.path.display())))?;

        tracing::debug!(path = %self.path.display(), readings = log.len(), "reading log saved");
        Ok(())
    }
}
