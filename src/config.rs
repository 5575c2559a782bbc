//! Run configuration.
//!
//! A [`PipelineConfig`] is assembled once at the start of a run from three
//! layers, later layers overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file,
//! 3. environment variables prefixed with `WEATHER_LAKE__`, using `__` as the
//!    section separator (`WEATHER_LAKE__INGEST__API_KEY=...`).
//!
//! The resulting value is passed by reference into every stage.

use crate::error::{ProcessingError, Result};
use crate::utils::constants::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

pub const ENV_PREFIX: &str = "WEATHER_LAKE";
pub const DEFAULT_CONFIG_FILE: &str = "weather-lake.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    #[validate(nested)]
    pub storage: StorageConfig,

    #[validate(nested)]
    pub directory: DirectoryConfig,

    #[validate(nested)]
    pub ingest: IngestConfig,

    #[validate(nested)]
    pub clustering: ClusteringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the filesystem-backed object tier
    pub root: PathBuf,

    #[validate(length(min = 1))]
    pub raw_bucket: String,

    #[validate(length(min = 1))]
    pub staging_bucket: String,

    #[validate(length(min = 1))]
    pub curated_bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DirectoryConfig {
    #[validate(url)]
    pub url: String,

    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IngestConfig {
    #[validate(url)]
    pub api_url: String,

    pub api_key: String,

    pub language: String,

    /// OpenWeather `units` parameter: "standard" (Kelvin) or "metric" (Celsius)
    pub units: String,

    #[validate(range(min = 1, max = 64))]
    pub workers: usize,

    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    pub base_delay_ms: u64,

    pub max_delay_ms: u64,

    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub min_success_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClusteringConfig {
    #[validate(range(min = 1, max = 64))]
    pub k: usize,

    pub seed: u64,

    #[validate(range(min = 1))]
    pub n_init: usize,

    #[validate(range(min = 1))]
    pub max_iterations: usize,

    #[validate(range(min = 0.0))]
    pub tolerance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            directory: DirectoryConfig::default(),
            ingest: IngestConfig::default(),
            clustering: ClusteringConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data-lake"),
            raw_bucket: RAW_BUCKET.to_string(),
            staging_bucket: STAGING_BUCKET.to_string(),
            curated_bucket: CURATED_BUCKET.to_string(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: REST_COUNTRIES_URL.to_string(),
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_url: OPENWEATHER_URL.to_string(),
            api_key: String::new(),
            language: "en".to_string(),
            units: "standard".to_string(),
            workers: DEFAULT_WORKERS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            min_success_fraction: 0.0,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_CLUSTERS,
            seed: DEFAULT_SEED,
            n_init: DEFAULT_N_INIT,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then `path` (or `weather-lake.toml` if present), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path.to_path_buf())),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: PipelineConfig = settings.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Validate field ranges and cross-field constraints
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if self.ingest.base_delay_ms > self.ingest.max_delay_ms {
            return Err(ProcessingError::Config(format!(
                "ingest.base_delay_ms ({}) exceeds ingest.max_delay_ms ({})",
                self.ingest.base_delay_ms, self.ingest.max_delay_ms
            )));
        }

        if crate::utils::TemperatureUnit::from_api_units(&self.ingest.units).is_none() {
            return Err(ProcessingError::Config(format!(
                "ingest.units must be 'standard' or 'metric', got '{}'",
                self.ingest.units
            )));
        }

        Ok(())
    }

    /// Stages that call the weather API need a key; the others do not
    pub fn require_api_key(&self) -> Result<&str> {
        let key = self.ingest.api_key.trim();
        if key.is_empty() {
            return Err(ProcessingError::Config(format!(
                "ingest.api_key is empty; set {}__INGEST__API_KEY or add it to the config file",
                ENV_PREFIX
            )));
        }
        Ok(key)
    }
}

impl IngestConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl DirectoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.storage.raw_bucket, "raw");
        assert_eq!(config.ingest.max_attempts, 3);
        assert_eq!(config.clustering.seed, 42);
    }

    #[test]
    fn test_file_layer_overrides_defaults() -> Result<()> {
        let mut file: NamedTempFile = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "[ingest]")?;
        writeln!(file, "workers = 2")?;
        writeln!(file, "api_key = \"from-file\"")?;
        writeln!(file, "[clustering]")?;
        writeln!(file, "k = 3")?;
        file.flush()?;

        let config = PipelineConfig::load(Some(file.path()))?;
        assert_eq!(config.ingest.workers, 2);
        assert_eq!(config.clustering.k, 3);
        assert_eq!(config.require_api_key()?, "from-file");
        // Untouched values keep their defaults
        assert_eq!(config.ingest.max_attempts, 3);
        assert_eq!(config.storage.curated_bucket, "curated");
        Ok(())
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = PipelineConfig::default();
        config.ingest.workers = 0;
        assert!(config.check().is_err());

        let mut config = PipelineConfig::default();
        config.ingest.min_success_fraction = 1.5;
        assert!(config.check().is_err());

        let mut config = PipelineConfig::default();
        config.ingest.base_delay_ms = 10_000;
        config.ingest.max_delay_ms = 100;
        assert!(config.check().is_err());

        let mut config = PipelineConfig::default();
        config.ingest.units = "imperial".to_string();
        assert!(config.check().is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let config = PipelineConfig::default();
        assert!(matches!(
            config.require_api_key(),
            Err(ProcessingError::Config(_))
        ));
    }
}
