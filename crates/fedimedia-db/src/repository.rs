//! Repository trait consumed by the media manager and the prune engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fedimedia_core::{Account, Emoji, MediaAttachment};
use uuid::Uuid;

use crate::DbResult;

/// Row storage for attachments, emoji and the account fields media depends on.
///
/// Paged queries take a cursor (an exclusive upper bound on id or timestamp)
/// and return rows in descending cursor order. An empty vector means there is
/// nothing further to read.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    // Attachments

    async fn put_attachment(&self, media: &MediaAttachment) -> DbResult<()>;

    /// Overwrite every column of an existing attachment.
    async fn update_attachment(&self, media: &MediaAttachment) -> DbResult<()>;

    async fn get_attachment(&self, id: Uuid) -> DbResult<Option<MediaAttachment>>;

    /// Returns `DbError::NotFound` when no row was deleted.
    async fn delete_attachment(&self, id: Uuid) -> DbResult<()>;

    /// Avatar or header attachments with id < `max_id`.
    async fn get_avatars_and_headers(
        &self,
        max_id: Option<Uuid>,
        limit: usize,
    ) -> DbResult<Vec<MediaAttachment>>;

    /// Cached remote attachments created before `older_than`, newest first.
    async fn get_remote_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> DbResult<Vec<MediaAttachment>>;

    async fn count_remote_older_than(&self, older_than: DateTime<Utc>) -> DbResult<usize>;

    /// Cached local attachments with no status, scheduled status, avatar or
    /// header use, created before `older_than`, with id < `max_id`.
    async fn get_local_unattached_older_than(
        &self,
        older_than: DateTime<Utc>,
        max_id: Option<Uuid>,
        limit: usize,
    ) -> DbResult<Vec<MediaAttachment>>;

    /// Every attachment with id < `max_id`.
    async fn get_attachments(
        &self,
        max_id: Option<Uuid>,
        limit: usize,
    ) -> DbResult<Vec<MediaAttachment>>;

    // Emoji

    async fn put_emoji(&self, emoji: &Emoji) -> DbResult<()>;

    async fn update_emoji(&self, emoji: &Emoji) -> DbResult<()>;

    async fn get_emoji(&self, id: Uuid) -> DbResult<Option<Emoji>>;

    async fn get_emoji_by_static_url(&self, url: &str) -> DbResult<Option<Emoji>>;

    async fn delete_emoji(&self, id: Uuid) -> DbResult<()>;

    /// Remote emoji with id < `max_id`.
    async fn get_remote_emojis(&self, max_id: Option<Uuid>, limit: usize) -> DbResult<Vec<Emoji>>;

    /// Cached remote emoji last updated before `older_than`, newest first.
    async fn get_cached_emojis_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> DbResult<Vec<Emoji>>;

    // Accounts

    async fn get_account(&self, id: Uuid) -> DbResult<Option<Account>>;

    async fn put_account(&self, account: &Account) -> DbResult<()>;
}
