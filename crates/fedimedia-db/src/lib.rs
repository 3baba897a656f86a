//! Fedimedia Database Library
//!
//! The relational contract the media pipeline consumes: attachment, emoji and
//! account rows plus the paged queries the prune engine walks. Paged queries
//! signal end-of-data with an empty page, never with an error.

pub mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod repository;

pub use error::{DbError, DbResult};
pub use memory::MemoryRepository;
#[cfg(feature = "postgres")]
pub use postgres::PgMediaRepository;
pub use repository::MediaRepository;
