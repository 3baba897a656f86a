use crate::traits::{KeyFilter, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const PARTIAL_SUFFIX: &str = ".partial";

/// Sibling `<key>.partial` file a write goes through. Removed on drop unless
/// committed, so a failed or cancelled write leaves nothing behind.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn for_target(target: &Path) -> Self {
        let mut name = target.as_os_str().to_owned();
        name.push(PARTIAL_SUFFIX);
        Self {
            path: PathBuf::from(name),
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Make the fully written file visible under its final name.
    async fn commit(mut self, target: &Path) -> StorageResult<()> {
        fs::rename(&self.path, target).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to rename into {}: {}", target.display(), e))
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed abandoned partial file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove partial file");
            }
        }
    }
}

/// Local filesystem storage implementation
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance rooted at `base_path`
    /// (e.g. "/var/lib/fedimedia/storage").
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys that could escape the base storage directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.is_empty() || storage_key.contains("..") || storage_key.starts_with('/') {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains invalid characters: {}",
                storage_key
            )));
        }

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    fn path_to_key(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<&str> = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }



    /// Remove empty directories beneath `dir`, keeping the storage root.
    async fn prune_empty_dirs(&self, dir: PathBuf) -> StorageResult<()> {
        // Iterative post-order walk: (dir, children visited?)
        let mut stack = vec![(dir, false)];

        while let Some((current, visited)) = stack.pop() {
            if !visited {
                stack.push((current.clone(), true));
                let mut entries = fs::read_dir(&current).await?;
                while let Some(entry) = entries.next_entry().await? {
                    if entry.file_type().await?.is_dir() {
                        stack.push((entry.path(), false));
                    }
                }
                continue;
            }

            let mut entries = fs::read_dir(&current).await?;
            if entries.next_entry().await?.is_none() && current != self.base_path {
                fs::remove_dir(&current).await?;
                tracing::debug!(path = %current.display(), "Removed empty storage directory");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage read successful"
        );

        Ok(Bytes::from(data))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        let size = data.len() as u64;

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let partial = PartialFile::for_target(&path);
        let mut file = fs::File::create(partial.path()).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", partial.path().display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", partial.path().display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", partial.path().display(), e))
        })?;
        drop(file);

        partial.commit(&path).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(size)
    }

    async fn put_file(
        &self,
        key: &str,
        local_path: &Path,
        _content_type: Option<&str>,
    ) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut src = fs::File::open(local_path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to open source file {}: {}",
                local_path.display(),
                e
            ))
        })?;

        let partial = PartialFile::for_target(&path);
        let mut dst = fs::File::create(partial.path()).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", partial.path().display(), e))
        })?;

        let bytes_copied = tokio::io::copy(&mut src, &mut dst).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to copy {} to {}: {}",
                local_path.display(),
                partial.path().display(),
                e
            ))
        })?;

        dst.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", partial.path().display(), e))
        })?;
        drop(dst);

        partial.commit(&path).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = bytes_copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage file write successful"
        );

        Ok(bytes_copied)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn walk_keys(&self, filter: KeyFilter<'_>) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut dirs = vec![self.base_path.clone()];

        while let Some(dir) = dirs.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    dirs.push(path);
                    continue;
                }
                if path.as_os_str().to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                    continue;
                }
                if let Some(key) = self.path_to_key(&path) {
                    if filter(key.as_str()) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn clean(&self) -> StorageResult<()> {
        let start = std::time::Instant::now();
        self.prune_empty_dirs(self.base_path.clone()).await?;
        tracing::info!(
            base_path = %self.base_path.display(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage clean completed"
        );
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
