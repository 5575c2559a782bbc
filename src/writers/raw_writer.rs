use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::models::{IngestionFailure, IngestionOutcome, WeatherObservation};
use crate::storage::ObjectTierStore;
use crate::utils::constants::{RAW_BATCH_PREFIX, USER_INPUT_PREFIX};
use crate::utils::filename::{failure_sidecar_key, raw_batch_key};
use crate::writers::csv_codec::{encode_records, RAW_COLUMNS};

/// Identity of a batch written to the raw tier
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatchId {
    pub key: String,
    pub failure_key: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub rows: usize,
    pub failures: usize,
}

/// Appends immutable, timestamped batches to the raw bucket.
///
/// A batch never replaces another: if the key for the run timestamp is
/// taken, the timestamp moves forward a millisecond at a time.
pub struct RawTierWriter {
    store: Arc<dyn ObjectTierStore>,
    bucket: String,
}

impl RawTierWriter {
    pub fn new(store: Arc<dyn ObjectTierStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
        }
    }

    /// Write the successes as `weather_data_<ts>.csv` and the failures as
    /// `ingest_failures_<ts>.json`
    pub async fn write(
        &self,
        outcomes: &[IngestionOutcome],
        run_timestamp: DateTime<Utc>,
    ) -> Result<RawBatchId> {
        let mut observations: Vec<&WeatherObservation> = Vec::new();
        let mut failures: Vec<&IngestionFailure> = Vec::new();
        for outcome in outcomes {
            match outcome {
                IngestionOutcome::Success(observation) => observations.push(observation),
                IngestionOutcome::Failure(failure) => failures.push(failure),
            }
        }
        observations.sort_by(|a, b| a.capital_key.cmp(&b.capital_key));
        failures.sort_by(|a, b| a.capital_key.cmp(&b.capital_key));

        let timestamp = self.free_timestamp(RAW_BATCH_PREFIX, run_timestamp, true).await?;
        let key = raw_batch_key(RAW_BATCH_PREFIX, timestamp);
        let failure_key = failure_sidecar_key(timestamp);

        let csv = encode_records(&observations, RAW_COLUMNS)?;
        self.store.put(&self.bucket, &key, csv).await?;

        let manifest = serde_json::to_vec_pretty(&failures)?;
        self.store.put(&self.bucket, &failure_key, manifest).await?;

        info!(
            "Raw batch {}/{}: {} observations, {} failures recorded in {}",
            self.bucket,
            key,
            observations.len(),
            failures.len(),
            failure_key
        );

        Ok(RawBatchId {
            key,
            failure_key: Some(failure_key),
            timestamp,
            rows: observations.len(),
            failures: failures.len(),
        })
    }

    /// Write a single ad-hoc observation as `user_input_data_<ts>.csv`
    pub async fn write_user_input(
        &self,
        observation: &WeatherObservation,
        timestamp: DateTime<Utc>,
    ) -> Result<RawBatchId> {
        let timestamp = self.free_timestamp(USER_INPUT_PREFIX, timestamp, false).await?;
        let key = raw_batch_key(USER_INPUT_PREFIX, timestamp);

        let csv = encode_records(std::slice::from_ref(observation), RAW_COLUMNS)?;
        self.store.put(&self.bucket, &key, csv).await?;
        info!("Stored observation {} as {}/{}", observation.capital_key, self.bucket, key);

        Ok(RawBatchId {
            key,
            failure_key: None,
            timestamp,
            rows: 1,
            failures: 0,
        })
    }

    async fn free_timestamp(
        &self,
        prefix: &str,
        mut timestamp: DateTime<Utc>,
        with_sidecar: bool,
    ) -> Result<DateTime<Utc>> {
        let existing: HashSet<String> = self.store.list_keys(&self.bucket).await?.into_iter().collect();

        loop {
            let taken = existing.contains(&raw_batch_key(prefix, timestamp))
                || (with_sidecar && existing.contains(&failure_sidecar_key(timestamp)));
            if !taken {
                return Ok(timestamp);
            }
            timestamp += Duration::milliseconds(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Capital, FailureCause, RawRecord};
    use crate::storage::MemoryObjectStore;
    use crate::utils::TemperatureUnit;
    use crate::writers::csv_codec::{decode_records, DecodedRows};
    use chrono::TimeZone;

    fn run_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap()
    }

    fn success(key: &str) -> IngestionOutcome {
        IngestionOutcome::Success(WeatherObservation {
            capital_key: key.to_string(),
            country_name: key.to_string(),
            capital_name: key.to_string(),
            latitude: 10.0,
            longitude: 10.0,
            temperature: 280.0,
            feels_like: None,
            temp_min: None,
            temp_max: None,
            humidity: 40.0,
            pressure: 1000.0,
            sea_level: None,
            grnd_level: None,
            wind_speed: 1.0,
            wind_direction: None,
            cloud_cover: None,
            visibility: None,
            weather_condition: "Clear".to_string(),
            weather_description: "clear sky".to_string(),
            sunrise: None,
            sunset: None,
            timezone_offset: 0,
            observed_at: run_timestamp(),
            temperature_unit: TemperatureUnit::Kelvin,
        })
    }

    fn failure(key: &str) -> IngestionOutcome {
        let capital = Capital::new(key.to_string(), key.to_string(), key.to_string(), 0.0, 0.0);
        IngestionOutcome::Failure(IngestionFailure::new(
            &capital,
            FailureCause::Timeout,
            "request timed out".to_string(),
            3,
        ))
    }

    async fn writer() -> Result<(Arc<MemoryObjectStore>, RawTierWriter)> {
        let store = Arc::new(MemoryObjectStore::new());
        store.ensure_bucket("raw").await?;
        let writer = RawTierWriter::new(store.clone(), "raw");
        Ok((store, writer))
    }

    #[tokio::test]
    async fn test_write_batch_and_sidecar() -> Result<()> {
        let (store, writer) = writer().await?;
        let outcomes = vec![success("JP"), failure("XX"), success("FR")];

        let batch = writer.write(&outcomes, run_timestamp()).await?;
        assert_eq!(batch.key, "weather_data_20240101T060000.000Z.csv");
        assert_eq!(batch.rows, 2);
        assert_eq!(batch.failures, 1);

        let decoded: DecodedRows<RawRecord> = decode_records(&store.get("raw", &batch.key).await?)?;
        let keys: Vec<_> = decoded.rows.iter().map(|r| r.capital_key.clone().unwrap()).collect();
        assert_eq!(keys, vec!["FR".to_string(), "JP".to_string()]);

        let sidecar = store
            .get("raw", "ingest_failures_20240101T060000.000Z.json")
            .await?;
        let failures: Vec<IngestionFailure> = serde_json::from_slice(&sidecar)?;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].cause, FailureCause::Timeout);
        Ok(())
    }

    #[tokio::test]
    async fn test_batches_never_overwrite() -> Result<()> {
        let (store, writer) = writer().await?;

        let first = writer.write(&[success("FR")], run_timestamp()).await?;
        let second = writer.write(&[success("JP")], run_timestamp()).await?;

        assert_ne!(first.key, second.key);
        assert_eq!(second.key, "weather_data_20240101T060000.001Z.csv");
        assert_eq!(store.list("raw").await?.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_all_failures_still_writes_header() -> Result<()> {
        let (store, writer) = writer().await?;

        let batch = writer.write(&[failure("XX")], run_timestamp()).await?;
        let bytes = store.get("raw", &batch.key).await?;
        assert_eq!(String::from_utf8(bytes).unwrap(), format!("{}\n", RAW_COLUMNS.join(",")));
        Ok(())
    }

    #[tokio::test]
    async fn test_user_input_batch() -> Result<()> {
        let (store, writer) = writer().await?;
        let observation = match success("LOC_1.0000_2.0000") {
            IngestionOutcome::Success(observation) => observation,
            IngestionOutcome::Failure(_) => unreachable!(),
        };

        let batch = writer.write_user_input(&observation, run_timestamp()).await?;
        assert_eq!(batch.key, "user_input_data_20240101T060000.000Z.csv");
        assert!(batch.failure_key.is_none());
        assert!(store.exists("raw", &batch.key).await?);
        Ok(())
    }
}
