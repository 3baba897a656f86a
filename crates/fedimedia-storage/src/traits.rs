//! Storage abstraction trait
//!
//! This module defines the Storage trait that all blob store backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use fedimedia_core::MediaError;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<StorageError> for MediaError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => MediaError::NotFound(key),
            other => MediaError::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Predicate used to select keys while walking a store.
pub type KeyFilter<'a> = &'a (dyn Fn(&str) -> bool + Send + Sync);

/// Storage abstraction trait
///
/// Keys are relative, slash-separated paths. Every method is safe to call
/// concurrently; backends provide per-call atomicity only.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a whole blob.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Write a blob from memory, returning the bytes written.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64>;

    /// Copy a local file into the store, returning the bytes written.
    ///
    /// The returned count is what callers record as the stored size.
    async fn put_file(
        &self,
        key: &str,
        local_path: &Path,
        content_type: Option<&str>,
    ) -> StorageResult<u64>;

    /// Delete a blob. Returns `StorageError::NotFound` if it did not exist.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Whether a blob exists.
    async fn has(&self, key: &str) -> StorageResult<bool>;

    /// All keys for which `filter` returns true.
    async fn walk_keys(&self, filter: KeyFilter<'_>) -> StorageResult<Vec<String>>;

    /// A direct URL for backends that can serve without proxying.
    async fn presigned_url(&self, _key: &str, _expires_in: Duration) -> StorageResult<Option<String>> {
        Ok(None)
    }

    /// Backend housekeeping (e.g. removing empty directories).
    async fn clean(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Get the backend type
    fn backend_type(&self) -> StorageBackend;
}
