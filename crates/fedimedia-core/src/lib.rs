//! Fedimedia Core Library
//!
//! Domain models, the storage path scheme, content-type allow-lists, error
//! taxonomy and configuration shared by every fedimedia crate.

pub mod allowlist;
pub mod config;
pub mod error;
pub mod models;
pub mod paths;
pub mod storage_types;

// Re-export commonly used types
pub use config::MediaConfig;
pub use error::{format_kib, ErrorCategory, LogLevel, MediaError, MultiError, SizeSource};
pub use models::{
    Account, AdditionalEmojiInfo, AdditionalMediaInfo, Emoji, FileInfo, FileMeta, FileType,
    Focus, MediaAttachment, Original, ProcessingStatus, Small, Thumbnail,
};
pub use paths::{new_id, MediaKind, SizeClass, StoragePath};
pub use storage_types::StorageBackend;
