use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use fedimedia_core::allowlist::{emoji_allowed, MIME_GIF, MIME_PNG, MIME_WEBP};
use fedimedia_core::{Emoji, MediaError, MediaKind, SizeClass, StoragePath};
use fedimedia_processing::{derive_static_emoji, sniff_emoji_type};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{checkpoint, load, stage, Derivation, Flight, LoadOutcome, Pipeline, RunState};
use crate::source::MediaSource;

/// Processing future for one emoji. Cheap to clone; clones share the same
/// run.
#[derive(Clone)]
pub struct ProcessingEmoji {
    flight: Arc<Flight<EmojiJob>>,
}

impl ProcessingEmoji {
    pub(crate) fn new(
        pipeline: Arc<Pipeline>,
        source: Arc<dyn MediaSource>,
        emoji: Emoji,
        refresh: Option<Refresh>,
    ) -> Self {
        let job = EmojiJob {
            pipeline,
            source,
            refresh,
        };
        Self {
            flight: Arc::new(Flight::new(job, emoji)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.flight.id()
    }

    pub async fn try_load(&self, cancel: &CancellationToken) -> LoadOutcome<Emoji> {
        self.flight.try_load(cancel).await
    }

    pub async fn load(&self, cancel: &CancellationToken) -> Result<Emoji, Arc<MediaError>> {
        load(&self.flight, cancel).await
    }
}

/// What a refresh replaces: the blobs of the previous revision, deleted once
/// the new ones are stored and the row points at them.
pub(crate) struct Refresh {
    pub superseded: Vec<String>,
}

pub(crate) struct EmojiJob {
    pipeline: Arc<Pipeline>,
    source: Arc<dyn MediaSource>,
    refresh: Option<Refresh>,
}

fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        MIME_PNG => Some("png"),
        MIME_GIF => Some("gif"),
        MIME_WEBP => Some("webp"),
        _ => None,
    }
}

#[async_trait]
impl Derivation for EmojiJob {
    type Row = Emoji;

    const LABEL: &'static str = "emoji";

    fn row_id(row: &Emoji) -> Uuid {
        row.id
    }

    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    async fn execute(
        &self,
        state: &mut RunState<Emoji>,
        cancel: &CancellationToken,
    ) -> Result<Emoji, MediaError> {
        let pipeline = &*self.pipeline;
        let config = &pipeline.config;

        let path = {
            let max = config.emoji_max_bytes;
            let staged = stage(pipeline, &*self.source, state, max, cancel).await?;
            staged.path.clone()
        };
        checkpoint(cancel)?;

        let data = Bytes::from(tokio::fs::read(&path).await?);
        let mime = sniff_emoji_type(&data)
            .ok_or_else(|| MediaError::Unsupported("unrecognised emoji image".to_string()))?;
        let extension = extension_for(mime)
            .filter(|_| emoji_allowed(mime))
            .ok_or_else(|| MediaError::Unsupported(format!("{mime} is not a valid emoji type")))?;

        let static_png = tokio::task::spawn_blocking(move || derive_static_emoji(&data, mime))
            .await
            .map_err(|e| MediaError::Internal(format!("static emoji task failed: {e}")))??;
        checkpoint(cancel)?;

        let owner = config.instance_account_id;
        let path_id = state.row.path_id;
        let emoji_path =
            |size: SizeClass, ext: &str| StoragePath::new(owner, MediaKind::Emoji, size, path_id, ext);
        let original_path = emoji_path(SizeClass::Original, extension);
        let static_path = emoji_path(SizeClass::Static, "png");

        let original_key = original_path.key();
        state.written.push(original_key.clone());
        let original_size = pipeline
            .storage
            .put_file(&original_key, &path, Some(mime))
            .await?;

        let static_key = static_path.key();
        state.written.push(static_key.clone());
        let static_size = pipeline.storage.put(&static_key, Bytes::from(static_png)).await?;

        let emoji = &mut state.row;
        emoji.image_url = original_path.url(&config.url_base);
        emoji.image_static_url = static_path.url(&config.url_base);
        emoji.image_path = original_key;
        emoji.image_static_path = static_key;
        emoji.image_content_type = mime.to_string();
        emoji.image_static_content_type = MIME_PNG.to_string();
        emoji.image_file_size = original_size;
        emoji.image_static_file_size = static_size;
        emoji.image_updated_at = Some(Utc::now());
        emoji.cached = true;
        pipeline.repo.update_emoji(emoji).await?;

        if let Some(refresh) = &self.refresh {
            let current = [emoji.image_path.as_str(), emoji.image_static_path.as_str()];
            let superseded: Vec<&str> = refresh
                .superseded
                .iter()
                .map(String::as_str)
                .filter(|key| !current.contains(key))
                .collect();
            pipeline.delete_blobs(superseded).await;
        }

        tracing::debug!(
            emoji_id = %emoji.id,
            shortcode = %emoji.shortcode,
            content_type = %emoji.image_content_type,
            file_size = emoji.image_file_size,
            "Emoji stored"
        );
        Ok(emoji.clone())
    }

    async fn rollback(&self, state: &mut RunState<Emoji>) {
        self.pipeline
            .delete_blobs(state.written.iter().map(String::as_str))
            .await;
        state.written.clear();

        // A failed refresh leaves the previous revision in place.
        if self.refresh.is_some() {
            return;
        }

        let emoji = &mut state.row;
        emoji.clear_derived();
        if let Err(err) = self.pipeline.repo.update_emoji(emoji).await {
            tracing::error!(
                emoji_id = %emoji.id,
                error = %err,
                "Failed to persist rolled back emoji"
            );
        }
    }
}
