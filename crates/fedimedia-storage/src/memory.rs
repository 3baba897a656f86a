//! In-process storage backend. Used for tests and ephemeral deployments.

use crate::traits::{KeyFilter, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage implementation that keeps blobs in memory
#[derive(Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<BTreeMap<String, Bytes>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, Bytes>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of successful `put`/`put_file` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.files().keys().cloned().collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.files()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let size = data.len() as u64;
        self.files().insert(key.to_string(), data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(size)
    }

    async fn put_file(
        &self,
        key: &str,
        local_path: &Path,
        _content_type: Option<&str>,
    ) -> StorageResult<u64> {
        let data = tokio::fs::read(local_path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to read source file {}: {}",
                local_path.display(),
                e
            ))
        })?;
        self.put(key, Bytes::from(data)).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.files()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.files().contains_key(key))
    }

    async fn walk_keys(&self, filter: KeyFilter<'_>) -> StorageResult<Vec<String>> {
        Ok(self
            .files()
            .keys()
            .filter(|k| filter(k.as_str()))
            .cloned()
            .collect())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
