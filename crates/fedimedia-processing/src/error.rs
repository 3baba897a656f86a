use fedimedia_core::MediaError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("error decoding {format}: {message}")]
    Decode { format: &'static str, message: String },

    #[error("multiple sets of orientation/rotation data")]
    OrientationConflict,

    #[error("invalid orientation value {0}")]
    InvalidOrientation(i64),

    #[error("ffprobe error: {message} ({code})")]
    Probe { code: i64, message: String },

    #[error("{binary} exited with {status}: {stderr}")]
    ProcessFailed {
        binary: String,
        status: String,
        stderr: String,
    },

    #[error("{binary} did not finish within {timeout:?}")]
    Timeout { binary: String, timeout: Duration },

    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid ffprobe output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blurhash encoding failed: {0}")]
    Blurhash(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    pub(crate) fn decode(format: &'static str, message: impl Into<String>) -> Self {
        ProcessingError::Decode {
            format,
            message: message.into(),
        }
    }
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;

impl From<ProcessingError> for MediaError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Unsupported(what) => MediaError::Unsupported(what),
            ProcessingError::OrientationConflict => MediaError::OrientationConflict,
            ProcessingError::Decode { .. }
            | ProcessingError::InvalidOrientation(_)
            | ProcessingError::Probe { .. }
            | ProcessingError::ProcessFailed { .. }
            | ProcessingError::Image(_)
            | ProcessingError::Json(_)
            | ProcessingError::Blurhash(_) => MediaError::Malformed(err.to_string()),
            ProcessingError::Timeout { .. }
            | ProcessingError::Spawn { .. }
            | ProcessingError::Io(_) => MediaError::Internal(err.to_string()),
        }
    }
}
