//! Object store backends for raw report bytes.
//!
//! `LocalObjectStore` lays objects out as `{root}/{bucket}/{key}` with upload
//! metadata in an optional `{key}.meta.json` sidecar holding a flat string map.

use super::repository::ObjectStore;
use super::{StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const METADATA_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub metadata: HashMap<String, String>,
}

impl StoredObject {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Filesystem-backed store rooted at a directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(bucket).join(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::invalid("object key", format!("{bucket}/{key}")));
        }
        Ok(self.root.join(relative))
    }

    /// Write an object and its metadata sidecar
    pub async fn put(&self, bucket: &str, key: &str, object: &StoredObject) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &object.bytes).await?;
        if !object.metadata.is_empty() {
            let sidecar = serde_json::to_vec(&object.metadata)
                .map_err(|e| StoreError::invalid("object metadata", e.to_string()))?;
            tokio::fs::write(sidecar_path(&path), sidecar).await?;
        }
        Ok(())
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(METADATA_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        let path = self.object_path(bucket, key)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::not_found("object", format!("{bucket}/{key}"))
            } else {
                StoreError::from(e)
            }
        })?;

        let metadata = match tokio::fs::read(sidecar_path(&path)).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| StoreError::invalid("object metadata", e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(bucket = %bucket, key = %key, size = bytes.len(), "Fetched object");
        Ok(StoredObject {
            bytes: Bytes::from(bytes),
            metadata,
        })
    }
}

/// In-process store for tests and local runs
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<(String, String), StoredObject>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, object: StoredObject) {
        self.objects
            .insert((bucket.to_string(), key.to_string()), object);
    }

    pub fn remove(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found("object", format!("{bucket}/{key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_round_trips_metadata() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let object = StoredObject::new(vec![1u8, 2, 3]).with_metadata("sent", "2024-01-01T00:00:00Z");

        store.put("reports", "user/2024/abc.bin", &object).await.unwrap();
        let fetched = store.fetch("reports", "user/2024/abc.bin").await.unwrap();

        assert_eq!(&fetched.bytes[..], &[1u8, 2, 3][..]);
        assert_eq!(fetched.metadata("sent"), Some("2024-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_local_store_missing_object_and_bad_key() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let missing = store.fetch("reports", "nope.bin").await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));

        let escape = store.fetch("reports", "../secret.bin").await.unwrap_err();
        assert!(matches!(escape, StoreError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryObjectStore::new();
        store.put("b", "k.bin", StoredObject::new(vec![9u8]));
        assert_eq!(store.fetch("b", "k.bin").await.unwrap().bytes.len(), 1);
        assert!(store.remove("b", "k.bin"));
        assert!(store.fetch("b", "k.bin").await.is_err());
    }
}
