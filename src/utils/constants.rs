/// Tier bucket names
pub const RAW_BUCKET: &str = "raw";
pub const STAGING_BUCKET: &str = "staging";
pub const CURATED_BUCKET: &str = "curated";

/// Object key prefixes and fixed object names
pub const RAW_BATCH_PREFIX: &str = "weather_data_";
pub const USER_INPUT_PREFIX: &str = "user_input_data_";
pub const FAILURE_SIDECAR_PREFIX: &str = "ingest_failures_";
pub const CSV_EXTENSION: &str = ".csv";
pub const JSON_EXTENSION: &str = ".json";
pub const STAGING_OBJECT: &str = "global_weather_data.csv";
pub const CURATED_OBJECT: &str = "weather_clusters.csv";
pub const CURATED_PLOT_OBJECT: &str = "weather_clusters.png";

/// Upstream endpoints
pub const REST_COUNTRIES_URL: &str =
    "https://restcountries.com/v3.1/all?fields=name,capital,capitalInfo,cca2";
pub const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Unit conversion
pub const KELVIN_OFFSET: f64 = 273.15;

/// Ingestion defaults
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Clustering defaults
pub const DEFAULT_CLUSTERS: usize = 4;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_N_INIT: usize = 10;
pub const DEFAULT_MAX_ITERATIONS: usize = 300;
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Plot size in pixels
pub const PLOT_WIDTH: u32 = 1000;
pub const PLOT_HEIGHT: u32 = 800;
