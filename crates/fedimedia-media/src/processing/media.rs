use async_trait::async_trait;
use chrono::Utc;
use fedimedia_core::allowlist::attachment_allowed;
use fedimedia_core::{
    ErrorCategory, FileType, MediaAttachment, MediaError, Original, ProcessingStatus, SizeClass,
    Small, StoragePath,
};
use fedimedia_processing::{generate_thumbnail, probe, strip_metadata, ProbeResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{checkpoint, load, stage, Derivation, Flight, LoadOutcome, Pipeline, RunState};
use crate::source::MediaSource;

/// Processing future for one attachment. Cheap to clone; clones share the
/// same run.
#[derive(Clone)]
pub struct ProcessingMedia {
    flight: Arc<Flight<MediaJob>>,
}

impl ProcessingMedia {
    pub(crate) fn new(
        pipeline: Arc<Pipeline>,
        source: Arc<dyn MediaSource>,
        media: MediaAttachment,
    ) -> Self {
        Self {
            flight: Arc::new(Flight::new(MediaJob { pipeline, source }, media)),
        }
    }

    /// Id of the attachment row, available before anything is processed.
    pub fn id(&self) -> Uuid {
        self.flight.id()
    }

    /// Run (or join) the derivation and report how it ended.
    pub async fn try_load(&self, cancel: &CancellationToken) -> LoadOutcome<MediaAttachment> {
        self.flight.try_load(cancel).await
    }

    /// Like [`try_load`](Self::try_load), but a cancelled run is finished in
    /// the background and reported here as `MediaError::Cancelled`.
    pub async fn load(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MediaAttachment, Arc<MediaError>> {
        load(&self.flight, cancel).await
    }
}

pub(crate) struct MediaJob {
    pipeline: Arc<Pipeline>,
    source: Arc<dyn MediaSource>,
}

impl MediaJob {
    /// Resolve the row as a servable placeholder with nothing cached.
    async fn placeholder(
        &self,
        state: &mut RunState<MediaAttachment>,
    ) -> Result<MediaAttachment, MediaError> {
        self.pipeline
            .delete_blobs(state.written.iter().map(String::as_str))
            .await;
        let stale: Vec<String> = state
            .row
            .blob_paths()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.pipeline.delete_blobs(stale.iter().map(String::as_str)).await;
        state.written.clear();

        let media = &mut state.row;
        media.clear_derived();
        media.kind = FileType::Unknown;
        media.processing = ProcessingStatus::Processed;
        self.pipeline.repo.update_attachment(media).await?;
        Ok(media.clone())
    }

    /// Map declined formats to `None`; malformed input stays an error.
    fn probe_supported(
        media_id: Uuid,
        probe_result: Result<ProbeResult, MediaError>,
    ) -> Result<Option<ProbeResult>, MediaError> {
        let result = match probe_result {
            Ok(result) => result,
            Err(err) if err.category() == ErrorCategory::Unsupported => {
                tracing::warn!(
                    media_id = %media_id,
                    error = %err,
                    "Unsupported media, keeping placeholder"
                );
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        match result.mime {
            Some(mime) if result.kind != FileType::Unknown && attachment_allowed(mime) => {
                Ok(Some(result))
            }
            mime => {
                tracing::warn!(
                    media_id = %media_id,
                    container = %result.container,
                    mime = mime.unwrap_or("none"),
                    "Media type not allowed, keeping placeholder"
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Derivation for MediaJob {
    type Row = MediaAttachment;

    const LABEL: &'static str = "media";

    fn row_id(row: &MediaAttachment) -> Uuid {
        row.id
    }

    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    async fn execute(
        &self,
        state: &mut RunState<MediaAttachment>,
        cancel: &CancellationToken,
    ) -> Result<MediaAttachment, MediaError> {
        let pipeline = &*self.pipeline;
        let config = &pipeline.config;
        state.row.processing = ProcessingStatus::Processing;

        let (path, staged_size) = {
            let max = config.attachment_max_bytes;
            let staged = stage(pipeline, &*self.source, state, max, cancel).await?;
            (staged.path.clone(), staged.size)
        };
        checkpoint(cancel)?;

        let probed = probe(&path, &pipeline.ffmpeg).await.map_err(MediaError::from);
        let Some(probed) = Self::probe_supported(state.row.id, probed)? else {
            return self.placeholder(state).await;
        };

        match probed.kind {
            FileType::Image | FileType::Video | FileType::Gifv => {
                strip_metadata(&path, &probed, &pipeline.ffmpeg).await?;
            }
            FileType::Audio => {
                tracing::debug!(media_id = %state.row.id, "Audio keeps its tags, scrub skipped");
            }
            FileType::Unknown => return self.placeholder(state).await,
        }
        checkpoint(cancel)?;

        let thumbnail = if probed.has_geometry() {
            let with_blurhash = state.row.blurhash.is_empty();
            let thumb = generate_thumbnail(
                &path,
                &probed,
                config.thumb_max_size,
                with_blurhash,
                &pipeline.ffmpeg,
            )
            .await?;
            Some(thumb)
        } else {
            tracing::debug!(media_id = %state.row.id, "No geometry, skipping thumbnail");
            None
        };
        checkpoint(cancel)?;

        // Extensions and content types are known by now since the allow-list
        // check passed.
        let (mime, extension) = match (probed.mime, probed.extension) {
            (Some(mime), Some(ext)) => (mime, ext),
            _ => return Err(MediaError::Unsupported(probed.container.clone())),
        };

        let (owner, kind, id) = (state.row.account_id, state.row.media_kind(), state.row.id);
        let original_path = StoragePath::new(owner, kind, SizeClass::Original, id, extension);
        let original_key = original_path.key();
        state.written.push(original_key.clone());
        let original_size = pipeline
            .storage
            .put_file(&original_key, &path, Some(mime))
            .await?;
        if original_size != staged_size {
            tracing::debug!(
                media_id = %state.row.id,
                staged = staged_size,
                stored = original_size,
                "Stored size differs from drained size after scrub"
            );
        }

        let now = Utc::now();
        let url_base = &config.url_base;
        let media = &mut state.row;
        media.kind = probed.kind;
        media.url = original_path.url(url_base);
        media.file.path = original_key;
        media.file.content_type = mime.to_string();
        media.file.file_size = original_size;
        media.file.updated_at = Some(now);
        media.file_meta.original = Original {
            duration: probed.duration,
            framerate: probed.framerate,
            bitrate: probed.bitrate,
            ..Original::from_dimensions(probed.width, probed.height)
        };

        if let Some(thumb) = thumbnail {
            let small_path = StoragePath::new(owner, kind, SizeClass::Small, id, thumb.extension);
            let small_key = small_path.key();
            state.written.push(small_key.clone());
            let small_size = pipeline
                .storage
                .put_file(&small_key, &thumb.path, Some(thumb.content_type))
                .await?;

            let media = &mut state.row;
            media.thumbnail.url = small_path.url(url_base);
            media.thumbnail.path = small_key;
            media.thumbnail.content_type = thumb.content_type.to_string();
            media.thumbnail.file_size = small_size;
            media.thumbnail.updated_at = Some(now);
            media.file_meta.small = Small::from_dimensions(thumb.width, thumb.height);
            if let Some(hash) = thumb.blurhash {
                media.blurhash = hash;
            }
        }

        let media = &mut state.row;
        media.cached = true;
        media.processing = ProcessingStatus::Processed;
        pipeline.repo.update_attachment(media).await?;

        tracing::debug!(
            media_id = %media.id,
            kind = media.kind.as_str(),
            content_type = %media.file.content_type,
            file_size = media.file.file_size,
            "Media stored"
        );
        Ok(media.clone())
    }

    async fn rollback(&self, state: &mut RunState<MediaAttachment>) {
        if let Err(err) = self.placeholder(state).await {
            tracing::error!(
                media_id = %state.row.id,
                error = %err,
                "Failed to persist rolled back attachment"
            );
        }
    }
}
