use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Capital directory unavailable at {url}: {reason}")]
    DirectoryUnavailable { url: String, reason: String },

    #[error("Malformed directory entry '{entry}': {reason}")]
    MalformedEntry { entry: String, reason: String },

    #[error("Weather fetch for {target} failed: {reason}")]
    FetchFailed { target: String, reason: String },

    #[error("Bucket '{0}' does not exist")]
    BucketNotFound(String),

    #[error("Object '{key}' not found in bucket '{bucket}'")]
    ObjectNotFound { bucket: String, key: String },

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Failed to read '{key}' from bucket '{bucket}': {reason}")]
    StorageRead {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Failed to write '{key}' to bucket '{bucket}': {reason}")]
    StorageWrite {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("No valid rows remain: {0}")]
    EmptyInput(String),

    #[error("Cannot form {k} clusters from {rows} rows")]
    InsufficientData { rows: usize, k: usize },

    #[error(
        "Ingestion success rate too low: {successes}/{total} succeeded (floor {floor:.2})"
    )]
    SuccessFloor {
        successes: usize,
        total: usize,
        floor: f64,
    },

    #[error("Rendering error: {0}")]
    Render(String),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ProcessingError {
    /// Storage failures are the ones an operator fixes by repairing the tier,
    /// as opposed to data-quality failures that resolve with new input.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            ProcessingError::BucketNotFound(_)
                | ProcessingError::ObjectNotFound { .. }
                | ProcessingError::InvalidKey { .. }
                | ProcessingError::StorageRead { .. }
                | ProcessingError::StorageWrite { .. }
        )
    }

    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            ProcessingError::EmptyInput(_)
                | ProcessingError::InsufficientData { .. }
                | ProcessingError::SuccessFloor { .. }
        )
    }
}
