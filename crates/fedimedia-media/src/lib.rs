//! Fedimedia Media Library
//!
//! The media lifecycle: a [`Manager`] registers attachments and emoji and
//! hands back single-flight processing futures, a [`RetryQueue`] finishes
//! runs whose callers went away, and the prune engine ([`Cleaner`],
//! [`PruneScheduler`]) keeps the blob store and the rows consistent over time.

pub mod manager;
pub mod processing;
pub mod prune;
pub mod retry;
pub mod scheduler;
pub mod source;

pub use manager::Manager;
pub use processing::{LoadOutcome, ProcessingEmoji, ProcessingMedia};
pub use prune::{Cleaner, PruneReport, Sweep, SweepResult};
pub use retry::RetryQueue;
pub use scheduler::PruneScheduler;
pub use source::{BytesSource, FileSource, MediaSource, SourceStream};
