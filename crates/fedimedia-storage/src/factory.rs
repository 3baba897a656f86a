use crate::{LocalStorage, MemoryStorage, Storage, StorageBackend, StorageResult};
use fedimedia_core::MediaConfig;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &MediaConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.storage_backend {
        StorageBackend::Local => {
            let storage = LocalStorage::new(config.local_storage_path.clone()).await?;
            tracing::info!(
                base_path = %config.local_storage_path.display(),
                "Using local filesystem storage"
            );
            Ok(Arc::new(storage))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; blobs are lost on restart");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = MediaConfig {
            local_storage_path: dir.path().join("media"),
            ..Default::default()
        };
        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Local);
        assert!(dir.path().join("media").is_dir());
    }
}
