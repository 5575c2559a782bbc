use rayon::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ProcessingError, Result};
use crate::models::{RawRecord, StagingRecord};
use crate::processors::{BatchRow, DataMerger, IntegrityChecker, IntegrityReport};
use crate::storage::ObjectTierStore;
use crate::utils::constants::STAGING_OBJECT;
use crate::utils::filename::{batch_timestamp, is_raw_batch_key};
use crate::utils::progress::ProgressReporter;
use crate::writers::csv_codec::{decode_records, encode_records, DecodedRows, STAGING_COLUMNS};

/// Result of a staging rebuild
#[derive(Debug, Clone)]
pub struct StagingOutput {
    pub records: Vec<StagingRecord>,
    pub report: IntegrityReport,
}

/// Rebuilds the staging dataset from every raw batch
pub struct StagingTransformer {
    store: Arc<dyn ObjectTierStore>,
    raw_bucket: String,
    staging_bucket: String,
    checker: IntegrityChecker,
    merger: DataMerger,
}

impl StagingTransformer {
    pub fn new(store: Arc<dyn ObjectTierStore>, raw_bucket: &str, staging_bucket: &str) -> Self {
        Self {
            store,
            raw_bucket: raw_bucket.to_string(),
            staging_bucket: staging_bucket.to_string(),
            checker: IntegrityChecker::new(),
            merger: DataMerger::new(),
        }
    }

    /// Read, normalize, validate and deduplicate all raw batches, then replace
    /// the staging object. Nothing is written when no valid rows remain.
    pub async fn rebuild(&self, progress: Option<&ProgressReporter>) -> Result<StagingOutput> {
        if let Some(p) = progress {
            p.set_message("Reading raw batches...");
        }

        let keys: Vec<String> = self
            .store
            .list_keys(&self.raw_bucket)
            .await?
            .into_iter()
            .filter(|key| is_raw_batch_key(key))
            .collect();

        let mut batches = Vec::with_capacity(keys.len());
        for key in keys {
            let bytes = self.store.get(&self.raw_bucket, &key).await?;
            batches.push((key, bytes));
        }
        info!("Loaded {} raw batches from {}", batches.len(), self.raw_bucket);

        if let Some(p) = progress {
            p.set_message("Validating rows...");
        }

        let checked: Vec<(Vec<BatchRow>, IntegrityReport)> = batches
            .par_iter()
            .map(|(key, bytes)| self.check_batch(key, bytes))
            .collect::<Result<Vec<_>>>()?;

        let mut report = IntegrityReport::default();
        let mut rows = Vec::new();
        for (batch_rows, batch_report) in checked {
            rows.extend(batch_rows);
            report.merge(batch_report);
        }

        let (records, duplicates) = self.merger.merge(rows);
        report.duplicates_removed = duplicates;

        if records.is_empty() {
            warn!("{}", self.checker.generate_summary(&report));
            return Err(ProcessingError::EmptyInput(format!(
                "{} rows read from {} raw batches, none valid",
                report.rows_read, report.batches_read
            )));
        }

        if let Some(p) = progress {
            p.set_message("Writing staging dataset...");
        }

        let csv = encode_records(&records, STAGING_COLUMNS)?;
        self.store.put(&self.staging_bucket, STAGING_OBJECT, csv).await?;
        report.rows_written = records.len();

        info!(
            "Staging dataset {}/{} rebuilt with {} rows",
            self.staging_bucket,
            STAGING_OBJECT,
            records.len()
        );
        info!("{}", self.checker.generate_summary(&report));

        Ok(StagingOutput { records, report })
    }

    fn check_batch(&self, key: &str, bytes: &[u8]) -> Result<(Vec<BatchRow>, IntegrityReport)> {
        let decoded: DecodedRows<RawRecord> =
            decode_records(bytes).map_err(|e| ProcessingError::StorageRead {
                bucket: self.raw_bucket.clone(),
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let batch = batch_timestamp(key).unwrap_or(key).to_string();
        let mut report = IntegrityReport {
            batches_read: 1,
            rows_read: decoded.rows.len() + decoded.undecodable,
            undecodable_rows: decoded.undecodable,
            ..IntegrityReport::default()
        };

        let rows = decoded
            .rows
            .into_iter()
            .filter_map(|raw| self.checker.check_row(raw, &mut report))
            .map(|record| BatchRow {
                batch: batch.clone(),
                record,
            })
            .collect();

        Ok((rows, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IngestionOutcome, WeatherObservation};
    use crate::storage::MemoryObjectStore;
    use crate::utils::TemperatureUnit;
    use crate::writers::csv_codec::decode_all;
    use crate::writers::RawTierWriter;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn observed(key: &str, humidity: f64, observed_at: DateTime<Utc>) -> IngestionOutcome {
        IngestionOutcome::Success(WeatherObservation {
            capital_key: key.to_string(),
            country_name: key.to_string(),
            capital_name: key.to_string(),
            latitude: 48.85,
            longitude: 2.35,
            temperature: 288.15,
            feels_like: None,
            temp_min: None,
            temp_max: None,
            humidity,
            pressure: 1012.0,
            sea_level: None,
            grnd_level: None,
            wind_speed: 3.0,
            wind_direction: None,
            cloud_cover: None,
            visibility: None,
            weather_condition: "Rain".to_string(),
            weather_description: "light rain".to_string(),
            sunrise: None,
            sunset: None,
            timezone_offset: 3600,
            observed_at,
            temperature_unit: TemperatureUnit::Kelvin,
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap()
    }

    async fn setup() -> Result<(Arc<MemoryObjectStore>, RawTierWriter, StagingTransformer)> {
        let store = Arc::new(MemoryObjectStore::new());
        store.ensure_bucket("raw").await?;
        store.ensure_bucket("staging").await?;
        let writer = RawTierWriter::new(store.clone(), "raw");
        let transformer = StagingTransformer::new(store.clone(), "raw", "staging");
        Ok((store, writer, transformer))
    }

    #[tokio::test]
    async fn test_rebuild_deduplicates_across_batches() -> Result<()> {
        let (store, writer, transformer) = setup().await?;
        let later = t0() + Duration::hours(1);

        writer.write(&[observed("FR", 40.0, t0())], t0()).await?;
        writer
            .write(&[observed("FR", 60.0, later), observed("JP", 70.0, later)], later)
            .await?;

        let output = transformer.rebuild(None).await?;
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].capital_key, "FR");
        assert_eq!(output.records[0].humidity, 60.0);
        assert!((output.records[0].temperature - 15.0).abs() < 1e-9);
        assert_eq!(output.report.batches_read, 2);
        assert_eq!(output.report.duplicates_removed, 1);

        let stored: Vec<StagingRecord> = decode_all(&store.get("staging", STAGING_OBJECT).await?)?;
        assert_eq!(stored, output.records);
        Ok(())
    }

    #[tokio::test]
    async fn test_range_filtering() -> Result<()> {
        let (_store, writer, transformer) = setup().await?;
        writer
            .write(&[observed("AA", 150.0, t0()), observed("BB", 50.0, t0())], t0())
            .await?;

        let output = transformer.rebuild(None).await?;
        let keys: Vec<&str> = output.records.iter().map(|r| r.capital_key.as_str()).collect();
        assert_eq!(keys, vec!["BB"]);
        assert_eq!(output.report.out_of_range.get("humidity"), Some(&1));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_input_writes_nothing() -> Result<()> {
        let (store, writer, transformer) = setup().await?;
        writer.write(&[observed("AA", 150.0, t0())], t0()).await?;

        assert!(matches!(
            transformer.rebuild(None).await,
            Err(ProcessingError::EmptyInput(_))
        ));
        assert!(store.list("staging").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_undecodable_rows_and_foreign_objects() -> Result<()> {
        let (store, writer, transformer) = setup().await?;
        writer.write(&[observed("FR", 50.0, t0())], t0()).await?;

        let manual = "capital_key,latitude,longitude,temperature,humidity,pressure,wind_speed,observed_at,temperature_unit\n\
                      JP,35.68,139.69,12.5,60,1012,3,2024-01-02T00:00:00Z,C\n\
                      KR,37.56,126.97,oops,60,1012,3,2024-01-02T00:00:00Z,C\n";
        store
            .put("raw", "user_input_data_20240102T000000.000Z.csv", manual.as_bytes().to_vec())
            .await?;
        store.put("raw", "notes.txt", b"ignored".to_vec()).await?;

        let output = transformer.rebuild(None).await?;
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[1].capital_key, "JP");
        assert_eq!(output.records[1].temperature, 12.5);
        assert_eq!(output.report.undecodable_rows, 1);
        assert_eq!(output.report.rows_read, 3);
        Ok(())
    }
}
