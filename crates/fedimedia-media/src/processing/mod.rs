//! Single-flight processing futures for attachments and emoji.
//!
//! A processing future wraps one row and its deferred source. The first
//! `try_load` drives the derivation while later callers wait on the same
//! run lock and then read the memoized result. Success and permanent errors
//! are memoized forever. A cancelled run memoizes nothing and can be run
//! again; `load` hands such runs to the [`RetryQueue`] with a fresh token.

pub(crate) mod emoji;
pub(crate) mod media;

pub use emoji::ProcessingEmoji;
pub use media::ProcessingMedia;

use async_trait::async_trait;
use fedimedia_core::{LogLevel, MediaConfig, MediaError};
use fedimedia_db::MediaRepository;
use fedimedia_processing::Ffmpeg;
use fedimedia_storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::retry::RetryQueue;
use crate::source::{drain, MediaSource};

/// Outcome of one `try_load` call.
#[derive(Debug, Clone)]
pub enum LoadOutcome<T> {
    Success(T),
    PermanentError(Arc<MediaError>),
    /// The run was cancelled before it finished; nothing was memoized.
    Retryable,
}

impl<T> LoadOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, LoadOutcome::Success(_))
    }
}

impl<T> From<Result<T, Arc<MediaError>>> for LoadOutcome<T> {
    fn from(result: Result<T, Arc<MediaError>>) -> Self {
        match result {
            Ok(row) => LoadOutcome::Success(row),
            Err(err) => LoadOutcome::PermanentError(err),
        }
    }
}

/// Collaborators every processing run needs.
pub(crate) struct Pipeline {
    pub repo: Arc<dyn MediaRepository>,
    pub storage: Arc<dyn Storage>,
    pub ffmpeg: Ffmpeg,
    pub config: MediaConfig,
    pub retry: RetryQueue,
}

impl Pipeline {
    /// Delete blobs, treating not-found as success. Other failures are logged
    /// and skipped so one stuck key does not strand the rest.
    pub(crate) async fn delete_blobs<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            match self.storage.delete(key).await {
                Ok(()) => tracing::debug!(key = %key, "Deleted blob"),
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::error!(error = %e, key = %key, "Failed to delete blob"),
            }
        }
    }
}

/// The drained source on local disk. Dropping it removes the staging
/// directory along with anything derived into it.
pub(crate) struct Staged {
    _dir: TempDir,
    pub path: PathBuf,
    pub size: u64,
}

/// Mutable state of one processing future, guarded by the run lock.
pub(crate) struct RunState<R> {
    pub row: R,
    pub staged: Option<Staged>,
    /// Keys written by the current run, removed again on rollback.
    pub written: Vec<String>,
    result: Option<Result<R, Arc<MediaError>>>,
}

impl<R> RunState<R> {
    fn new(row: R) -> Self {
        Self {
            row,
            staged: None,
            written: Vec::new(),
            result: None,
        }
    }
}

/// The derivation body a [`Flight`] drives.
#[async_trait]
pub(crate) trait Derivation: Send + Sync + 'static {
    type Row: Clone + Send + Sync + 'static;

    const LABEL: &'static str;

    fn row_id(row: &Self::Row) -> Uuid;

    fn pipeline(&self) -> &Pipeline;

    /// Run the body to a terminal row. Returning `MediaError::Cancelled`
    /// leaves the state re-runnable.
    async fn execute(
        &self,
        state: &mut RunState<Self::Row>,
        cancel: &CancellationToken,
    ) -> Result<Self::Row, MediaError>;

    /// Undo a failed run: delete what it wrote and persist a placeholder.
    async fn rollback(&self, state: &mut RunState<Self::Row>);
}

pub(crate) struct Flight<D: Derivation> {
    job: D,
    id: Uuid,
    state: Mutex<RunState<D::Row>>,
}

impl<D: Derivation> Flight<D> {
    pub(crate) fn new(job: D, row: D::Row) -> Self {
        Self {
            job,
            id: D::row_id(&row),
            state: Mutex::new(RunState::new(row)),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) async fn try_load(&self, cancel: &CancellationToken) -> LoadOutcome<D::Row> {
        let mut state = tokio::select! {
            biased;
            state = self.state.lock() => state,
            _ = cancel.cancelled() => return LoadOutcome::Retryable,
        };

        if let Some(result) = &state.result {
            return result.clone().into();
        }

        let start = std::time::Instant::now();
        let result = self.job.execute(&mut *state, cancel).await;

        match result {
            Ok(row) => {
                tracing::info!(
                    kind = D::LABEL,
                    id = %self.id,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Processing completed"
                );
                state.staged = None;
                state.written.clear();
                state.row = row.clone();
                state.result = Some(Ok(row.clone()));
                LoadOutcome::Success(row)
            }
            Err(err) if err.is_cancelled() => {
                tracing::debug!(kind = D::LABEL, id = %self.id, "Processing cancelled");
                LoadOutcome::Retryable
            }
            Err(err) => {
                log_failure(D::LABEL, self.id, &err);
                self.job.rollback(&mut *state).await;
                state.staged = None;
                state.written.clear();
                let err = Arc::new(err);
                state.result = Some(Err(err.clone()));
                LoadOutcome::PermanentError(err)
            }
        }
    }
}

/// Drain the source into a fresh staging directory unless an earlier,
/// cancelled run already did.
pub(crate) async fn stage<'s, R>(
    pipeline: &Pipeline,
    source: &dyn MediaSource,
    state: &'s mut RunState<R>,
    max_bytes: u64,
    cancel: &CancellationToken,
) -> Result<&'s Staged, MediaError> {
    if state.staged.is_none() {
        let dir = tempfile::Builder::new()
            .prefix("fedimedia-")
            .tempdir_in(&pipeline.config.temp_dir)?;
        let path = dir.path().join("original");
        let stream = source.open(cancel).await?;
        let size = drain(stream, &path, max_bytes, cancel).await?;
        state.staged = Some(Staged {
            _dir: dir,
            path,
            size,
        });
    }
    state
        .staged
        .as_ref()
        .ok_or_else(|| MediaError::Internal("staged file missing".to_string()))
}

/// Shared `load` behaviour: resolve a `try_load`, re-submitting retryable
/// runs in the background with a token nobody else holds.
pub(crate) async fn load<D: Derivation>(
    flight: &Arc<Flight<D>>,
    cancel: &CancellationToken,
) -> Result<D::Row, Arc<MediaError>> {
    match flight.try_load(cancel).await {
        LoadOutcome::Success(row) => Ok(row),
        LoadOutcome::PermanentError(err) => Err(err),
        LoadOutcome::Retryable => {
            let background = flight.clone();
            let queued = flight.job.pipeline().retry.submit(async move {
                let cancel = CancellationToken::new();
                let id = background.id;
                match background.try_load(&cancel).await {
                    LoadOutcome::Success(_) => {
                        tracing::debug!(kind = D::LABEL, id = %id, "Background retry completed");
                    }
                    LoadOutcome::PermanentError(err) => {
                        tracing::warn!(kind = D::LABEL, id = %id, error = %err, "Background retry failed");
                    }
                    LoadOutcome::Retryable => {
                        tracing::warn!(kind = D::LABEL, id = %id, "Background retry was cancelled");
                    }
                }
            });
            if !queued {
                tracing::warn!(kind = D::LABEL, id = %flight.id, "Retry queue closed, run dropped");
            }
            Err(Arc::new(MediaError::Cancelled))
        }
    }
}

/// Stop early if the caller has gone away.
pub(crate) fn checkpoint(cancel: &CancellationToken) -> Result<(), MediaError> {
    if cancel.is_cancelled() {
        Err(MediaError::Cancelled)
    } else {
        Ok(())
    }
}

fn log_failure(kind: &'static str, id: Uuid, err: &MediaError) {
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(kind, id = %id, error = %err, "Processing failed"),
        LogLevel::Warn => tracing::warn!(kind, id = %id, error = %err, "Processing failed"),
        LogLevel::Error => tracing::error!(kind, id = %id, error = %err, "Processing failed"),
    }
}
