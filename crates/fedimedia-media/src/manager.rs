//! Entry point for registering attachments and emoji.
//!
//! Every operation writes or loads the row, wraps it with its deferred
//! source and returns a processing future. No bytes are read until the
//! future is loaded.

use fedimedia_core::{
    new_id, AdditionalEmojiInfo, AdditionalMediaInfo, Emoji, MediaAttachment, MediaConfig,
    MediaError,
};
use fedimedia_db::MediaRepository;
use fedimedia_processing::Ffmpeg;
use fedimedia_storage::Storage;
use std::sync::Arc;
use uuid::Uuid;

use crate::processing::emoji::Refresh;
use crate::processing::{Pipeline, ProcessingEmoji, ProcessingMedia};
use crate::prune::Cleaner;
use crate::retry::RetryQueue;
use crate::source::MediaSource;

pub struct Manager {
    pipeline: Arc<Pipeline>,
}

impl Manager {
    /// Must be called from within a tokio runtime; the retry pool is spawned
    /// here.
    pub fn new(
        repo: Arc<dyn MediaRepository>,
        storage: Arc<dyn Storage>,
        config: MediaConfig,
    ) -> Self {
        let ffmpeg = Ffmpeg::from_config(&config);
        let retry = RetryQueue::new(config.worker_pool_size);
        Self {
            pipeline: Arc::new(Pipeline {
                repo,
                storage,
                ffmpeg,
                config,
                retry,
            }),
        }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.pipeline.config
    }

    /// Prune engine over the same repository and storage.
    pub fn cleaner(&self) -> Cleaner {
        Cleaner::new(
            self.pipeline.repo.clone(),
            self.pipeline.storage.clone(),
            self.pipeline.config.clone(),
        )
    }

    /// Register a new attachment owned by `account_id`. The placeholder row
    /// is stored before this returns.
    pub async fn create_media(
        &self,
        source: impl MediaSource + 'static,
        account_id: Uuid,
        info: AdditionalMediaInfo,
    ) -> Result<ProcessingMedia, MediaError> {
        let mut media = MediaAttachment::placeholder(new_id(), account_id);
        media.apply_info(info);
        self.pipeline.repo.put_attachment(&media).await?;

        tracing::debug!(media_id = %media.id, account_id = %account_id, "Registered media attachment");
        Ok(ProcessingMedia::new(self.pipeline.clone(), Arc::new(source), media))
    }

    /// Re-fetch the bytes of an existing (typically uncached) attachment.
    pub async fn recache_media(
        &self,
        source: impl MediaSource + 'static,
        id: Uuid,
    ) -> Result<ProcessingMedia, MediaError> {
        let media = self
            .pipeline
            .repo
            .get_attachment(id)
            .await?
            .ok_or_else(|| MediaError::NotFound(format!("media attachment {id}")))?;

        tracing::debug!(media_id = %id, "Recaching media attachment");
        Ok(ProcessingMedia::new(self.pipeline.clone(), Arc::new(source), media))
    }

    /// Register a new emoji. The placeholder row is stored before this
    /// returns.
    pub async fn create_emoji(
        &self,
        source: impl MediaSource + 'static,
        shortcode: &str,
        id: Uuid,
        uri: &str,
        info: AdditionalEmojiInfo,
    ) -> Result<ProcessingEmoji, MediaError> {
        let mut emoji = Emoji::placeholder(id, shortcode, uri);
        emoji.apply_info(info);
        self.pipeline.repo.put_emoji(&emoji).await?;

        tracing::debug!(emoji_id = %id, shortcode = %shortcode, "Registered emoji");
        Ok(ProcessingEmoji::new(self.pipeline.clone(), Arc::new(source), emoji, None))
    }

    /// Replace the image of an existing emoji. The row keeps its id but gets
    /// a fresh path id so the new blobs never share a URL with the old ones.
    /// The old blobs are removed only after the new row is stored; if
    /// processing fails the existing row is left untouched.
    pub async fn refresh_emoji(
        &self,
        source: impl MediaSource + 'static,
        existing: Emoji,
        info: AdditionalEmojiInfo,
    ) -> Result<ProcessingEmoji, MediaError> {
        let superseded = existing
            .blob_paths()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut emoji = existing;
        emoji.apply_info(info);
        emoji.path_id = new_id();
        emoji.clear_derived();

        tracing::debug!(emoji_id = %emoji.id, path_id = %emoji.path_id, "Refreshing emoji");
        Ok(ProcessingEmoji::new(
            self.pipeline.clone(),
            Arc::new(source),
            emoji,
            Some(Refresh { superseded }),
        ))
    }

    /// Re-fetch the bytes of an existing (typically uncached) emoji.
    pub async fn recache_emoji(
        &self,
        source: impl MediaSource + 'static,
        id: Uuid,
    ) -> Result<ProcessingEmoji, MediaError> {
        let emoji = self
            .pipeline
            .repo
            .get_emoji(id)
            .await?
            .ok_or_else(|| MediaError::NotFound(format!("emoji {id}")))?;

        tracing::debug!(emoji_id = %id, "Recaching emoji");
        Ok(ProcessingEmoji::new(self.pipeline.clone(), Arc::new(source), emoji, None))
    }

    /// Finish background retries and stop the retry pool.
    pub async fn shutdown(&self) {
        self.pipeline.retry.shutdown().await;
    }
}
