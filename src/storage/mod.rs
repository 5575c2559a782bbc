//! Object tier storage.
//!
//! Every tier (raw, staging, curated) is a bucket: a flat namespace of
//! objects addressed by key. Stages only talk to the [`ObjectTierStore`]
//! trait, so the pipeline runs unchanged against the filesystem store or the
//! in-memory store used by tests.

pub mod fs_store;
pub mod memory_store;

pub use fs_store::FsObjectStore;
pub use memory_store::MemoryObjectStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::error::{ProcessingError, Result};

/// What `ensure_bucket` found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Created,
    AlreadyExisted,
}

impl fmt::Display for BucketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketStatus::Created => write!(f, "created"),
            BucketStatus::AlreadyExisted => write!(f, "already exists"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectTierStore: Send + Sync {
    /// Create the bucket if missing. Never fails because it already exists.
    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketStatus>;

    /// Bucket names in lexicographic order
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Store an object, replacing any previous one. Readers never observe a
    /// partially written object.
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<ObjectInfo>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Objects in lexicographic key order
    async fn list(&self, bucket: &str) -> Result<Vec<ObjectInfo>>;

    /// Remove an object. Returns whether it existed.
    async fn delete(&self, bucket: &str, key: &str) -> Result<bool>;

    async fn health(&self) -> Result<()>;

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        Ok(self
            .list(bucket)
            .await?
            .into_iter()
            .map(|info| info.key)
            .collect())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.list(bucket).await?.iter().any(|info| info.key == key))
    }
}

/// Object keys are flat names: non-empty, no path separators, not hidden
pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.contains('/') || key.contains('\\') {
        Some("key contains a path separator")
    } else if key.starts_with('.') {
        Some("key starts with '.'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ProcessingError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Bucket names follow the same rules as keys
pub fn validate_bucket(bucket: &str) -> Result<()> {
    validate_key(bucket).map_err(|_| ProcessingError::InvalidKey {
        key: bucket.to_string(),
        reason: "invalid bucket name".to_string(),
    })
}
