//! Deferred data sources and the bounded drain to local disk.

use async_trait::async_trait;
use bytes::Bytes;
use fedimedia_core::{MediaError, SizeSource};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// An opened byte stream plus the length its origin claimed, if any.
pub struct SourceStream {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub declared_len: Option<u64>,
}

/// Lazily opened media bytes. `open` is called from inside the processing
/// future, never at registration time.
///
/// A source is opened at most once per completed drain: once its bytes are
/// staged, joined loads, retries and later loads all reuse the staged copy.
/// A drain interrupted by cancellation is discarded and the source is opened
/// again by the background retry, so implementations must tolerate a second
/// `open` after a cancelled one.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn open(&self, cancel: &CancellationToken) -> anyhow::Result<SourceStream>;
}

/// In-memory bytes, mostly for uploads already buffered by the caller.
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: Bytes,
    declared_len: Option<u64>,
}

impl BytesSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let declared_len = Some(data.len() as u64);
        Self { data, declared_len }
    }

    /// Override the declared length, e.g. `None` for a chunked response.
    pub fn with_declared_len(mut self, declared_len: Option<u64>) -> Self {
        self.declared_len = declared_len;
        self
    }
}

#[async_trait]
impl MediaSource for BytesSource {
    async fn open(&self, _cancel: &CancellationToken) -> anyhow::Result<SourceStream> {
        Ok(SourceStream {
            reader: Box::new(std::io::Cursor::new(self.data.clone())),
            declared_len: self.declared_len,
        })
    }
}

/// A file on local disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MediaSource for FileSource {
    async fn open(&self, _cancel: &CancellationToken) -> anyhow::Result<SourceStream> {
        let file = tokio::fs::File::open(&self.path).await?;
        let declared_len = file.metadata().await.ok().map(|m| m.len());
        Ok(SourceStream {
            reader: Box::new(file),
            declared_len,
        })
    }
}

/// Copy `stream` into `dest`, returning the number of bytes actually written.
///
/// A declared length above `max` is rejected before reading. The drained
/// count is authoritative in both directions: reading more than `max` fails
/// regardless of what was declared.
pub(crate) async fn drain(
    stream: SourceStream,
    dest: &Path,
    max: u64,
    cancel: &CancellationToken,
) -> Result<u64, MediaError> {
    if let Some(declared) = stream.declared_len.filter(|len| *len > max) {
        return Err(MediaError::TooLarge {
            measured: SizeSource::Reported,
            size: declared,
            limit: max,
        });
    }

    let mut file = tokio::fs::File::create(dest).await?;
    // One byte past the ceiling is enough to tell an oversized stream apart.
    let mut reader = stream.reader.take(max.saturating_add(1));

    let written = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(MediaError::Cancelled),
        copied = tokio::io::copy(&mut reader, &mut file) => copied?,
    };
    file.flush().await?;

    if written > max {
        return Err(MediaError::TooLarge {
            measured: SizeSource::Written,
            size: written,
            limit: max,
        });
    }

    if let Some(declared) = stream.declared_len.filter(|len| *len != written) {
        tracing::debug!(declared, written, "Declared length did not match drained bytes");
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain_bytes(source: BytesSource, max: u64) -> Result<u64, MediaError> {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let stream = source.open(&cancel).await.unwrap();
        drain(stream, &dir.path().join("staged"), max, &cancel).await
    }

    #[tokio::test]
    async fn counts_actual_bytes() {
        let source = BytesSource::new(vec![7u8; 100]).with_declared_len(Some(10));
        assert_eq!(drain_bytes(source, 1000).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn declared_length_over_limit() {
        let source = BytesSource::new(vec![0u8; 10]).with_declared_len(Some(5000));
        let err = drain_bytes(source, 1024).await.unwrap_err();
        assert!(err.to_string().starts_with("reported size"), "{err}");
    }

    #[tokio::test]
    async fn undeclared_oversize_uses_written_count() {
        let source = BytesSource::new(vec![0u8; 2048]).with_declared_len(None);
        let err = drain_bytes(source, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            MediaError::TooLarge {
                measured: SizeSource::Written,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancelled_before_read() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let stream = BytesSource::new(vec![1u8; 16]).open(&cancel).await.unwrap();
        cancel.cancel();
        let err = drain(stream, &dir.path().join("staged"), 1024, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn file_source_declares_its_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input");
        std::fs::write(&path, b"hello").unwrap();
        let stream = FileSource::new(&path)
            .open(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.declared_len, Some(5));
    }
}
