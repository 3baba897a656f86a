//! Fedimedia Storage Library
//!
//! Blob store abstraction for derived media plus a filesystem and an
//! in-memory backend.
//!
//! # Storage key format
//!
//! Keys are relative paths of the form
//! `{owner_account_id}/{media_kind}/{size_class}/{media_id}.{extension}`
//! (see `fedimedia_core::paths`). Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod local;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use fedimedia_core::StorageBackend;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use traits::{KeyFilter, Storage, StorageError, StorageResult};
