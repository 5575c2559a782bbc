//! Stage orchestration.
//!
//! The pipeline owns the run configuration and the store, and wires the
//! components together for each stage. Stages run strictly one after the
//! other; each one's output is durable in the store before the next starts,
//! and each can be re-run on its own after a failure.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::analyzers::{CuratedClusterer, CuratedDataset};
use crate::config::PipelineConfig;
use crate::error::{ProcessingError, Result};
use crate::models::{Capital, IngestionOutcome, IngestionSummary, WeatherObservation};
use crate::processors::{StagingOutput, StagingTransformer};
use crate::readers::{
    CapitalDirectory, OpenWeatherClient, RestCountriesDirectory, RetryPolicy, Sleeper,
    TokioSleeper, WeatherIngestor, WeatherSource,
};
use crate::storage::{BucketStatus, FsObjectStore, ObjectTierStore};
use crate::utils::coordinates::validate_coordinates;
use crate::utils::progress::ProgressReporter;
use crate::writers::{RawBatchId, RawTierWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InitBuckets,
    Ingest,
    Observe,
    Stage,
    Curate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::InitBuckets => write!(f, "init-buckets"),
            Stage::Ingest => write!(f, "ingest"),
            Stage::Observe => write!(f, "observe"),
            Stage::Stage => write!(f, "stage"),
            Stage::Curate => write!(f, "curate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub batch: RawBatchId,
    pub summary: IngestionSummary,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub buckets: Vec<(String, BucketStatus)>,
    pub ingest: IngestReport,
    pub staging: StagingOutput,
    pub curated: CuratedDataset,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn ObjectTierStore>,
    directory: Option<Arc<dyn CapitalDirectory>>,
    source: Option<Arc<dyn WeatherSource>>,
    sleeper: Arc<dyn Sleeper>,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn ObjectTierStore>) -> Self {
        Self {
            config,
            store,
            directory: None,
            source: None,
            sleeper: Arc::new(TokioSleeper),
            show_progress: false,
        }
    }

    /// Pipeline over the filesystem store at `storage.root`
    pub fn from_config(config: PipelineConfig) -> Self {
        let store = Arc::new(FsObjectStore::new(config.storage.root.clone()));
        Self::new(config, store)
    }

    pub fn with_directory(mut self, directory: Arc<dyn CapitalDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_source(mut self, source: Arc<dyn WeatherSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn ObjectTierStore> {
        Arc::clone(&self.store)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.ingest)
    }

    fn directory(&self) -> Result<Arc<dyn CapitalDirectory>> {
        match &self.directory {
            Some(directory) => Ok(Arc::clone(directory)),
            None => {
                let directory =
                    RestCountriesDirectory::from_config(&self.config.directory, self.retry_policy())?
                        .with_sleeper(Arc::clone(&self.sleeper));
                Ok(Arc::new(directory))
            }
        }
    }

    /// The configured weather source, or an OpenWeather client (which needs an API key)
    fn weather_source(&self) -> Result<Arc<dyn WeatherSource>> {
        match &self.source {
            Some(source) => Ok(Arc::clone(source)),
            None => {
                self.config.require_api_key()?;
                Ok(Arc::new(OpenWeatherClient::from_config(&self.config.ingest)?))
            }
        }
    }

    fn ingestor(&self, source: Arc<dyn WeatherSource>) -> WeatherIngestor {
        WeatherIngestor::from_config(source, &self.config.ingest)
            .with_sleeper(Arc::clone(&self.sleeper))
    }

    fn raw_writer(&self) -> RawTierWriter {
        RawTierWriter::new(self.store(), &self.config.storage.raw_bucket)
    }

    async fn timed<T, F>(&self, stage: Stage, work: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        info!("Stage {} started", stage);
        let started = Instant::now();
        let result = work.await;
        match &result {
            Ok(_) => info!("Stage {} finished in {:.2?}", stage, started.elapsed()),
            Err(e) => error!("Stage {} failed after {:.2?}: {}", stage, started.elapsed(), e),
        }
        result
    }

    /// Resolve the capital list without fetching any weather
    pub async fn capitals(&self) -> Result<Vec<Capital>> {
        self.directory()?.resolve().await
    }

    /// Create the raw, staging and curated buckets if missing
    pub async fn init_buckets(&self) -> Result<Vec<(String, BucketStatus)>> {
        self.timed(Stage::InitBuckets, async {
            let storage = &self.config.storage;
            let mut statuses = Vec::new();
            for bucket in [
                &storage.raw_bucket,
                &storage.staging_bucket,
                &storage.curated_bucket,
            ] {
                let status = self.store.ensure_bucket(bucket).await?;
                info!("Bucket '{}' {}", bucket, status);
                statuses.push((bucket.clone(), status));
            }
            Ok(statuses)
        })
        .await
    }

    /// Resolve capitals, fetch their weather and append a raw batch.
    ///
    /// The batch is written before the success floor is checked, so a failed
    /// run still leaves its failure manifest behind.
    pub async fn ingest(&self, run_timestamp: DateTime<Utc>) -> Result<IngestReport> {
        self.timed(Stage::Ingest, async {
            let source = self.weather_source()?;
            let capitals = self.directory()?.resolve().await?;

            let progress =
                ProgressReporter::new(capitals.len() as u64, "Fetching weather", !self.show_progress);
            let outcomes = self.ingestor(source).fetch(capitals, Some(&progress)).await?;

            let summary = IngestionSummary::from_outcomes(&outcomes);
            progress.finish_with_message(&summary.summary());
            info!("{}", summary.summary());

            let batch = self.raw_writer().write(&outcomes, run_timestamp).await?;

            let floor = self.config.ingest.min_success_fraction;
            if !summary.meets_floor(floor) {
                return Err(ProcessingError::SuccessFloor {
                    successes: summary.successes,
                    total: summary.total,
                    floor,
                });
            }

            Ok(IngestReport { batch, summary })
        })
        .await
    }

    /// Fetch current weather at arbitrary coordinates into a user-input raw batch
    pub async fn observe(
        &self,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(WeatherObservation, RawBatchId)> {
        self.timed(Stage::Observe, async {
            validate_coordinates(latitude, longitude)?;
            let target = Capital::at_location(latitude, longitude);
            let source = self.weather_source()?;

            let outcome = self
                .ingestor(source)
                .with_workers(1)
                .fetch(vec![target.clone()], None)
                .await?
                .into_iter()
                .next();

            let observation = match outcome {
                Some(IngestionOutcome::Success(observation)) => observation,
                Some(IngestionOutcome::Failure(failure)) => {
                    return Err(ProcessingError::FetchFailed {
                        target: target.display_name(),
                        reason: format!("{} ({})", failure.reason, failure.cause),
                    })
                }
                None => {
                    return Err(ProcessingError::FetchFailed {
                        target: target.display_name(),
                        reason: "no outcome produced".to_string(),
                    })
                }
            };

            let batch = self.raw_writer().write_user_input(&observation, timestamp).await?;
            Ok((observation, batch))
        })
        .await
    }

    /// Rebuild the staging dataset from every raw batch
    pub async fn stage(&self) -> Result<StagingOutput> {
        self.timed(Stage::Stage, async {
            let storage = &self.config.storage;
            let transformer =
                StagingTransformer::new(self.store(), &storage.raw_bucket, &storage.staging_bucket);

            let progress = ProgressReporter::new_spinner("Staging", !self.show_progress);
            let output = transformer.rebuild(Some(&progress)).await?;
            progress.finish_with_message(&format!("Staged {} rows", output.records.len()));
            Ok(output)
        })
        .await
    }

    /// Cluster the staging dataset into the curated tier
    pub async fn curate(&self) -> Result<CuratedDataset> {
        self.timed(Stage::Curate, async {
            let storage = &self.config.storage;
            let clusterer = CuratedClusterer::new(
                self.store(),
                &storage.staging_bucket,
                &storage.curated_bucket,
                self.config.clustering.clone(),
            );
            clusterer.curate().await
        })
        .await
    }

    /// All stages in order, stopping at the first failure
    pub async fn run_all(&self, run_timestamp: DateTime<Utc>) -> Result<RunReport> {
        let buckets = self.init_buckets().await?;
        let ingest = self.ingest(run_timestamp).await?;
        let staging = self.stage().await?;
        let curated = self.curate().await?;

        Ok(RunReport {
            buckets,
            ingest,
            staging,
            curated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureCause, IngestionFailure};
    use crate::readers::{FetchError, RecordingSleeper, StaticDirectory};
    use crate::storage::MemoryObjectStore;
    use crate::utils::TemperatureUnit;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct FixedSource {
        fail: bool,
    }

    #[async_trait]
    impl WeatherSource for FixedSource {
        async fn current_weather(
            &self,
            capital: &Capital,
        ) -> std::result::Result<WeatherObservation, FetchError> {
            if self.fail {
                return Err(FetchError::new(FailureCause::HttpStatus(503), "unavailable"));
            }
            Ok(WeatherObservation {
                capital_key: capital.key().to_string(),
                country_name: "Somewhere".to_string(),
                capital_name: "Somewhere City".to_string(),
                latitude: capital.latitude,
                longitude: capital.longitude,
                temperature: 285.0,
                feels_like: None,
                temp_min: None,
                temp_max: None,
                humidity: 70.0,
                pressure: 1011.0,
                sea_level: None,
                grnd_level: None,
                wind_speed: 2.5,
                wind_direction: None,
                cloud_cover: None,
                visibility: None,
                weather_condition: "Mist".to_string(),
                weather_description: "mist".to_string(),
                sunrise: None,
                sunset: None,
                timezone_offset: 0,
                observed_at: Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap(),
                temperature_unit: TemperatureUnit::Kelvin,
            })
        }
    }

    fn pipeline(fail: bool) -> (Arc<MemoryObjectStore>, Pipeline) {
        let store = Arc::new(MemoryObjectStore::new());
        let directory = StaticDirectory::new(vec![Capital::new(
            "FR".to_string(),
            "France".to_string(),
            "Paris".to_string(),
            48.85,
            2.35,
        )]);
        let pipeline = Pipeline::new(PipelineConfig::default(), store.clone())
            .with_directory(Arc::new(directory))
            .with_source(Arc::new(FixedSource { fail }))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        (store, pipeline)
    }

    fn run_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_init_buckets_twice() -> Result<()> {
        let (_store, pipeline) = pipeline(false);

        let first = pipeline.init_buckets().await?;
        assert!(first.iter().all(|(_, s)| *s == BucketStatus::Created));
        let second = pipeline.init_buckets().await?;
        assert!(second.iter().all(|(_, s)| *s == BucketStatus::AlreadyExisted));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_successes_fails_after_writing_batch() -> Result<()> {
        let (store, pipeline) = pipeline(true);
        pipeline.init_buckets().await?;

        let result = pipeline.ingest(run_timestamp()).await;
        assert!(matches!(
            result,
            Err(ProcessingError::SuccessFloor {
                successes: 0,
                total: 1,
                ..
            })
        ));

        let sidecar = store
            .get("raw", "ingest_failures_20240101T060000.000Z.json")
            .await?;
        let failures: Vec<IngestionFailure> = serde_json::from_slice(&sidecar)?;
        assert_eq!(failures[0].attempts, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_observe_writes_user_input_batch() -> Result<()> {
        let (store, pipeline) = pipeline(false);
        pipeline.init_buckets().await?;

        let (observation, batch) = pipeline.observe(35.68, 139.69, run_timestamp()).await?;
        assert_eq!(observation.capital_key, "LOC_35.6800_139.6900");
        assert_eq!(batch.key, "user_input_data_20240101T060000.000Z.csv");
        assert!(store.exists("raw", &batch.key).await?);

        assert!(matches!(
            pipeline.observe(95.0, 0.0, run_timestamp()).await,
            Err(ProcessingError::InvalidCoordinate(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_api_key_is_a_config_error() {
        let pipeline = Pipeline::new(
            PipelineConfig::default(),
            Arc::new(MemoryObjectStore::new()),
        );
        assert!(matches!(
            pipeline.ingest(run_timestamp()).await,
            Err(ProcessingError::Config(_))
        ));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::InitBuckets.to_string(), "init-buckets");
        assert_eq!(Stage::Curate.to_string(), "curate");
    }
}
