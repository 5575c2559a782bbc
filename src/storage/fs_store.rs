use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::storage::{validate_bucket, validate_key, BucketStatus, ObjectInfo, ObjectTierStore};

/// Filesystem-backed store: each bucket is a directory under `root`.
///
/// Writes land in a hidden temp file inside the bucket directory and are
/// renamed over the target, so a reader sees the old object or the new one.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an existing bucket directory
    async fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        validate_bucket(bucket)?;
        let dir = self.root.join(bucket);
        match tokio::fs::metadata(&dir).await {
            Ok(metadata) if metadata.is_dir() => Ok(dir),
            Ok(_) => Err(ProcessingError::BucketNotFound(bucket.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ProcessingError::BucketNotFound(bucket.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn object_info(key: String, metadata: &std::fs::Metadata) -> ObjectInfo {
    let last_modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    ObjectInfo {
        key,
        size: metadata.len(),
        last_modified,
    }
}

#[async_trait]
impl ObjectTierStore for FsObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketStatus> {
        validate_bucket(bucket)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let dir = self.root.join(bucket);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => Ok(BucketStatus::Created),
            // A concurrent caller may have won the race; both end up with the bucket
            Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {
                Ok(BucketStatus::AlreadyExisted)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut buckets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            buckets.push(name);
        }

        buckets.sort();
        Ok(buckets)
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<ObjectInfo> {
        validate_key(key)?;
        let dir = self.bucket_dir(bucket).await?;
        let target = dir.join(key);

        let write_target = target.clone();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &write_target, &bytes))
            .await?
            .map_err(|e| ProcessingError::StorageWrite {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let metadata = tokio::fs::metadata(&target).await?;
        debug!("Stored {}/{} ({} bytes)", bucket, key, metadata.len());
        Ok(object_info(key.to_string(), &metadata))
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        let dir = self.bucket_dir(bucket).await?;

        match tokio::fs::read(dir.join(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ProcessingError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(ProcessingError::StorageRead {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn list(&self, bucket: &str) -> Result<Vec<ObjectInfo>> {
        let dir = self.bucket_dir(bucket).await?;
        let mut entries = tokio::fs::read_dir(&dir).await?;

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let key = entry.file_name().to_string_lossy().to_string();
            // In-flight temp files are hidden
            if key.starts_with('.') {
                continue;
            }

            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                objects.push(object_info(key, &metadata));
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        validate_key(key)?;
        let dir = self.bucket_dir(bucket).await?;

        match tokio::fs::remove_file(dir.join(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ProcessingError::StorageWrite {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn health(&self) -> Result<()> {
        let metadata = tokio::fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(ProcessingError::Config(format!(
                "Storage root {} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_bucket_is_idempotent() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FsObjectStore::new(temp_dir.path().join("lake"));

        assert_eq!(store.ensure_bucket("raw").await?, BucketStatus::Created);
        assert_eq!(store.ensure_bucket("raw").await?, BucketStatus::AlreadyExisted);
        assert_eq!(store.list_buckets().await?, vec!["raw".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_bucket_creation() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FsObjectStore::new(temp_dir.path());

        let (first, second) = tokio::join!(store.ensure_bucket("raw"), store.ensure_bucket("raw"));
        let mut statuses = vec![first?, second?];
        statuses.sort_by_key(|s| *s == BucketStatus::AlreadyExisted);
        assert_eq!(
            statuses,
            vec![BucketStatus::Created, BucketStatus::AlreadyExisted]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_put_get_overwrite() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FsObjectStore::new(temp_dir.path());
        store.ensure_bucket("staging").await?;

        let info = store.put("staging", "data.csv", b"a,b\n1,2\n".to_vec()).await?;
        assert_eq!(info.size, 8);

        store.put("staging", "data.csv", b"a\n".to_vec()).await?;
        assert_eq!(store.get("staging", "data.csv").await?, b"a\n".to_vec());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_hides_temp_files() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FsObjectStore::new(temp_dir.path());
        store.ensure_bucket("raw").await?;

        store.put("raw", "b.csv", vec![1]).await?;
        store.put("raw", "a.csv", vec![2]).await?;
        std::fs::write(temp_dir.path().join("raw").join(".tmpXYZ"), b"partial")?;

        assert_eq!(
            store.list_keys("raw").await?,
            vec!["a.csv".to_string(), "b.csv".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_objects_and_buckets() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FsObjectStore::new(temp_dir.path());
        store.ensure_bucket("raw").await?;

        assert!(matches!(
            store.get("raw", "nothing.csv").await,
            Err(ProcessingError::ObjectNotFound { .. })
        ));
        assert!(matches!(
            store.list("curated").await,
            Err(ProcessingError::BucketNotFound(_))
        ));
        assert!(matches!(
            store.put("raw", "../escape", vec![]).await,
            Err(ProcessingError::InvalidKey { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_reports_existence() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FsObjectStore::new(temp_dir.path());
        store.ensure_bucket("raw").await?;
        store.put("raw", "x.csv", vec![0]).await?;

        assert!(store.delete("raw", "x.csv").await?);
        assert!(!store.delete("raw", "x.csv").await?);
        assert!(store.health().await.is_ok());
        Ok(())
    }
}
