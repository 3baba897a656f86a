//! Error types module
//!
//! `MediaError` is the pipeline-wide error. Each variant maps onto one of the
//! error categories the processing futures and prune sweeps branch on:
//! unsupported input resolves quietly, malformed input and resource limits are
//! terminal, cancellation is retried in the background, and dependent-service
//! failures propagate.

use std::fmt;
use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected outcomes like cancellation
    Debug,
    /// Warning level - for unsupported input and resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Coarse classification used to decide how a failed run is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Content type or container we do not handle. Row becomes an Unknown placeholder.
    Unsupported,
    /// Truncated, undecodable or inconsistent input. Terminal.
    Malformed,
    /// Declared or actual size above the configured ceiling. Terminal.
    ResourceLimit,
    /// Caller context went away mid-run. Not terminal.
    Cancelled,
    /// Storage or database failure.
    Dependency,
}

/// Which size a `TooLarge` error was raised on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSource {
    /// Length declared by the data source before reading.
    Reported,
    /// Byte count actually drained from the stream.
    Written,
}

impl fmt::Display for SizeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeSource::Reported => f.write_str("reported"),
            SizeSource::Written => f.write_str("written"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("unsupported media: {0}")]
    Unsupported(String),

    #[error("malformed media: {0}")]
    Malformed(String),

    #[error("multiple sets of orientation/rotation data")]
    OrientationConflict,

    #[error("{measured} size {} greater than max allowed {}", kib(.size), kib(.limit))]
    TooLarge {
        measured: SizeSource,
        size: u64,
        limit: u64,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Unsupported(_) => ErrorCategory::Unsupported,
            MediaError::Malformed(_) | MediaError::OrientationConflict => ErrorCategory::Malformed,
            MediaError::TooLarge { .. } => ErrorCategory::ResourceLimit,
            MediaError::Cancelled => ErrorCategory::Cancelled,
            MediaError::Storage(_)
            | MediaError::Database(_)
            | MediaError::NotFound(_)
            | MediaError::Internal(_) => ErrorCategory::Dependency,
        }
    }

    pub fn log_level(&self) -> LogLevel {
        match self.category() {
            ErrorCategory::Cancelled => LogLevel::Debug,
            ErrorCategory::Unsupported | ErrorCategory::ResourceLimit => LogLevel::Warn,
            ErrorCategory::Malformed | ErrorCategory::Dependency => LogLevel::Error,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MediaError::NotFound(_))
    }
}

impl From<io::Error> for MediaError {
    fn from(err: io::Error) -> Self {
        MediaError::Internal(format!("IO error: {}", err))
    }
}

impl From<anyhow::Error> for MediaError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<MediaError>() {
            Ok(media) => media,
            Err(other) => MediaError::Internal(format!("{:#}", other)),
        }
    }
}

/// Formats a byte count the way size limit errors report it, e.g. `50.0kiB`.
pub fn format_kib(bytes: u64) -> String {
    format!("{:.1}kiB", bytes as f64 / 1024.0)
}

fn kib(bytes: &u64) -> String {
    format_kib(*bytes)
}

/// Accumulates non-fatal errors across a multi-step operation.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<String>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: &str, err: impl fmt::Display) {
        self.errors.push(format!("{}: {}", context, err));
    }

    /// Absorb everything another collector gathered.
    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Ok if nothing was collected, otherwise self as the error.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s): {}", self.errors.len(), self.errors.join("; "))
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_names_the_size_source() {
        let written = MediaError::TooLarge {
            measured: SizeSource::Written,
            size: 65_740,
            limit: 51_200,
        };
        assert_eq!(
            written.to_string(),
            "written size 64.2kiB greater than max allowed 50.0kiB"
        );

        let reported = MediaError::TooLarge {
            measured: SizeSource::Reported,
            size: 102_400,
            limit: 51_200,
        };
        assert!(reported.to_string().starts_with("reported size 100.0kiB"));
        assert_eq!(reported.category(), ErrorCategory::ResourceLimit);
    }

    #[test]
    fn orientation_conflict_is_malformed() {
        let err = MediaError::OrientationConflict;
        assert_eq!(err.category(), ErrorCategory::Malformed);
        assert_eq!(err.to_string(), "multiple sets of orientation/rotation data");
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn anyhow_roundtrip_keeps_variant() {
        let err: anyhow::Error = MediaError::Cancelled.into();
        assert!(MediaError::from(err).is_cancelled());

        let other = MediaError::from(anyhow::anyhow!("socket closed"));
        assert!(matches!(other, MediaError::Internal(msg) if msg.contains("socket closed")));
    }

    #[test]
    fn multi_error_collects() {
        let mut errs = MultiError::new();
        assert!(errs.is_empty());
        errs.push("prune orphaned", "boom");
        errs.push("uncache remote", "bang");
        assert_eq!(errs.len(), 2);
        let err = errs.into_result().unwrap_err();
        assert!(err.to_string().contains("prune orphaned: boom"));
    }
}
