//! Configuration module
//!
//! Every policy constant of the media pipeline (thumbnail bound, size
//! ceilings, retention windows, sandbox binaries) is read from the
//! environment with a default, then validated.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::storage_types::StorageBackend;

const THUMB_MAX_SIZE: u32 = 512;
const EMOJI_MAX_BYTES: u64 = 50 * 1024;
const ATTACHMENT_MAX_BYTES: u64 = 40 * 1024 * 1024;
const UNUSED_LOCAL_DAYS: u32 = 3;
const REMOTE_CACHE_DAYS: u32 = 7;
const PRUNE_PAGE_SIZE: usize = 20;
const CLEANUP_INTERVAL_HOURS: u64 = 24;
const WORKER_POOL_SIZE: usize = 4;
const SANDBOX_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RUNTIME_PATHS: &str = "/usr,/lib,/lib64,/bin,/etc";
const DEFAULT_STORAGE_PATH: &str = "./data/media";
const DEFAULT_URL_BASE: &str = "http://localhost:8080/fileserver";

#[derive(Clone, Debug)]
pub struct MediaConfig {
    /// Thumbnails never exceed this in either dimension.
    pub thumb_max_size: u32,
    pub emoji_max_bytes: u64,
    pub attachment_max_bytes: u64,
    /// Grace window before an unattached local upload is pruned.
    pub unused_local_days: u32,
    /// Age after which remote media is uncached.
    pub remote_cache_days: u32,
    pub prune_page_size: usize,
    pub cleanup_enabled: bool,
    pub cleanup_interval_hours: u64,
    pub worker_pool_size: usize,
    pub temp_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Paths the sandboxed binaries may read and execute to load themselves.
    pub sandbox_runtime_paths: Vec<PathBuf>,
    pub sandbox_timeout_secs: u64,
    pub storage_backend: StorageBackend,
    pub local_storage_path: PathBuf,
    pub url_base: String,
    /// Owner segment of emoji storage paths.
    pub instance_account_id: Uuid,
    pub database_url: Option<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            thumb_max_size: THUMB_MAX_SIZE,
            emoji_max_bytes: EMOJI_MAX_BYTES,
            attachment_max_bytes: ATTACHMENT_MAX_BYTES,
            unused_local_days: UNUSED_LOCAL_DAYS,
            remote_cache_days: REMOTE_CACHE_DAYS,
            prune_page_size: PRUNE_PAGE_SIZE,
            cleanup_enabled: true,
            cleanup_interval_hours: CLEANUP_INTERVAL_HOURS,
            worker_pool_size: WORKER_POOL_SIZE,
            temp_dir: env::temp_dir(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            sandbox_runtime_paths: split_paths(DEFAULT_RUNTIME_PATHS),
            sandbox_timeout_secs: SANDBOX_TIMEOUT_SECS,
            storage_backend: StorageBackend::Local,
            local_storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            url_base: DEFAULT_URL_BASE.to_string(),
            instance_account_id: Uuid::nil(),
            database_url: None,
        }
    }
}

fn split_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl MediaConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config = MediaConfig {
            thumb_max_size: env::var("MEDIA_THUMB_MAX_SIZE")
                .unwrap_or_else(|_| THUMB_MAX_SIZE.to_string())
                .parse()
                .unwrap_or(THUMB_MAX_SIZE),
            emoji_max_bytes: env::var("MEDIA_EMOJI_MAX_BYTES")
                .unwrap_or_else(|_| EMOJI_MAX_BYTES.to_string())
                .parse()
                .unwrap_or(EMOJI_MAX_BYTES),
            attachment_max_bytes: env::var("MEDIA_ATTACHMENT_MAX_BYTES")
                .unwrap_or_else(|_| ATTACHMENT_MAX_BYTES.to_string())
                .parse()
                .unwrap_or(ATTACHMENT_MAX_BYTES),
            unused_local_days: env::var("MEDIA_UNUSED_LOCAL_DAYS")
                .unwrap_or_else(|_| UNUSED_LOCAL_DAYS.to_string())
                .parse()
                .unwrap_or(UNUSED_LOCAL_DAYS),
            remote_cache_days: env::var("MEDIA_REMOTE_CACHE_DAYS")
                .unwrap_or_else(|_| REMOTE_CACHE_DAYS.to_string())
                .parse()
                .unwrap_or(REMOTE_CACHE_DAYS),
            prune_page_size: env::var("MEDIA_PRUNE_PAGE_SIZE")
                .unwrap_or_else(|_| PRUNE_PAGE_SIZE.to_string())
                .parse()
                .unwrap_or(PRUNE_PAGE_SIZE),
            cleanup_enabled: env::var("MEDIA_CLEANUP_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            cleanup_interval_hours: env::var("MEDIA_CLEANUP_INTERVAL_HOURS")
                .unwrap_or_else(|_| CLEANUP_INTERVAL_HOURS.to_string())
                .parse()
                .unwrap_or(CLEANUP_INTERVAL_HOURS),
            worker_pool_size: env::var("MEDIA_WORKER_POOL_SIZE")
                .unwrap_or_else(|_| WORKER_POOL_SIZE.to_string())
                .parse()
                .unwrap_or(WORKER_POOL_SIZE),
            temp_dir: env::var("MEDIA_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            sandbox_runtime_paths: split_paths(
                &env::var("MEDIA_SANDBOX_RUNTIME_PATHS")
                    .unwrap_or_else(|_| DEFAULT_RUNTIME_PATHS.to_string()),
            ),
            sandbox_timeout_secs: env::var("MEDIA_SANDBOX_TIMEOUT_SECS")
                .unwrap_or_else(|_| SANDBOX_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(SANDBOX_TIMEOUT_SECS),
            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .map(|s| s.parse::<StorageBackend>())
                .transpose()?
                .unwrap_or(StorageBackend::Local),
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORAGE_PATH)),
            url_base: env::var("MEDIA_URL_BASE").unwrap_or_else(|_| DEFAULT_URL_BASE.to_string()),
            instance_account_id: env::var("MEDIA_INSTANCE_ACCOUNT_ID")
                .ok()
                .map(|s| Uuid::parse_str(&s))
                .transpose()?
                .unwrap_or_else(Uuid::nil),
            database_url: env::var("DATABASE_URL").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.thumb_max_size == 0 {
            return Err(anyhow::anyhow!("MEDIA_THUMB_MAX_SIZE must be greater than 0"));
        }

        if self.emoji_max_bytes == 0 || self.attachment_max_bytes == 0 {
            return Err(anyhow::anyhow!(
                "MEDIA_EMOJI_MAX_BYTES and MEDIA_ATTACHMENT_MAX_BYTES must be greater than 0"
            ));
        }

        if self.prune_page_size == 0 {
            return Err(anyhow::anyhow!("MEDIA_PRUNE_PAGE_SIZE must be greater than 0"));
        }

        if self.worker_pool_size == 0 {
            return Err(anyhow::anyhow!("MEDIA_WORKER_POOL_SIZE must be greater than 0"));
        }

        if self.cleanup_enabled && self.cleanup_interval_hours == 0 {
            return Err(anyhow::anyhow!(
                "MEDIA_CLEANUP_INTERVAL_HOURS must be greater than 0 when cleanup is enabled"
            ));
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }

    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MediaConfig::default();
        assert_eq!(config.thumb_max_size, 512);
        assert_eq!(config.emoji_max_bytes, 51_200);
        assert_eq!(config.unused_local_days, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_page_size() {
        let config = MediaConfig {
            prune_page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_postgres_url() {
        let config = MediaConfig {
            database_url: Some("mysql://localhost/db".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn runtime_paths_split() {
        assert_eq!(
            split_paths("/usr, /lib,,/bin"),
            vec![PathBuf::from("/usr"), PathBuf::from("/lib"), PathBuf::from("/bin")]
        );
    }
}
