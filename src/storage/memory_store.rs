use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{ProcessingError, Result};
use crate::storage::{validate_bucket, validate_key, BucketStatus, ObjectInfo, ObjectTierStore};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn info(&self, key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size: self.bytes.len() as u64,
            last_modified: self.last_modified,
        }
    }
}

/// In-process store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn bucket_not_found(bucket: &str) -> ProcessingError {
    ProcessingError::BucketNotFound(bucket.to_string())
}

#[async_trait]
impl ObjectTierStore for MemoryObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketStatus> {
        validate_bucket(bucket)?;
        let mut buckets = self.buckets.write().await;

        if buckets.contains_key(bucket) {
            Ok(BucketStatus::AlreadyExisted)
        } else {
            buckets.insert(bucket.to_string(), BTreeMap::new());
            Ok(BucketStatus::Created)
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<ObjectInfo> {
        validate_key(key)?;
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| bucket_not_found(bucket))?;

        let object = StoredObject {
            bytes,
            last_modified: Utc::now(),
        };
        let info = object.info(key);
        objects.insert(key.to_string(), object);
        Ok(info)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| bucket_not_found(bucket))?;

        objects
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| ProcessingError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn list(&self, bucket: &str) -> Result<Vec<ObjectInfo>> {
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| bucket_not_found(bucket))?;

        Ok(objects
            .iter()
            .map(|(key, object)| object.info(key))
            .collect())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| bucket_not_found(bucket))?;

        Ok(objects.remove(key).is_some())
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}
