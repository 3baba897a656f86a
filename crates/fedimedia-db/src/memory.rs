//! In-memory repository with the same paging semantics as the PostgreSQL one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fedimedia_core::{Account, Emoji, MediaAttachment};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::{DbError, DbResult, MediaRepository};

#[derive(Default)]
struct Tables {
    attachments: BTreeMap<Uuid, MediaAttachment>,
    emojis: BTreeMap<Uuid, Emoji>,
    accounts: HashMap<Uuid, Account>,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn attachment_count(&self) -> usize {
        self.read().attachments.len()
    }

    pub fn emoji_count(&self) -> usize {
        self.read().emojis.len()
    }
}

/// Descending by id, strictly below `max_id`.
fn page_by_id<'a, T: Clone + 'a>(
    rows: impl DoubleEndedIterator<Item = (&'a Uuid, &'a T)>,
    max_id: Option<Uuid>,
    limit: usize,
    keep: impl Fn(&T) -> bool,
) -> Vec<T> {
    rows.rev()
        .filter(|(id, _)| max_id.map_or(true, |max| **id < max))
        .filter(|(_, row)| keep(*row))
        .take(limit)
        .map(|(_, row)| row.clone())
        .collect()
}

#[async_trait]
impl MediaRepository for MemoryRepository {
    async fn put_attachment(&self, media: &MediaAttachment) -> DbResult<()> {
        self.write().attachments.insert(media.id, media.clone());
        Ok(())
    }

    async fn update_attachment(&self, media: &MediaAttachment) -> DbResult<()> {
        let mut tables = self.write();
        match tables.attachments.get_mut(&media.id) {
            Some(row) => {
                *row = media.clone();
                row.updated_at = Utc::now();
                Ok(())
            }
            None => Err(DbError::NotFound(format!("media attachment {}", media.id))),
        }
    }

    async fn get_attachment(&self, id: Uuid) -> DbResult<Option<MediaAttachment>> {
        Ok(self.read().attachments.get(&id).cloned())
    }

    async fn delete_attachment(&self, id: Uuid) -> DbResult<()> {
        self.write()
            .attachments
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DbError::NotFound(format!("media attachment {}", id)))
    }

    async fn get_avatars_and_headers(
        &self,
        max_id: Option<Uuid>,
        limit: usize,
    ) -> DbResult<Vec<MediaAttachment>> {
        let tables = self.read();
        Ok(page_by_id(tables.attachments.iter(), max_id, limit, |m| {
            m.avatar || m.header
        }))
    }

    async fn get_remote_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> DbResult<Vec<MediaAttachment>> {
        let tables = self.read();
        let mut rows: Vec<MediaAttachment> = tables
            .attachments
            .values()
            .filter(|m| m.cached && m.is_remote() && m.created_at < older_than)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count_remote_older_than(&self, older_than: DateTime<Utc>) -> DbResult<usize> {
        Ok(self
            .read()
            .attachments
            .values()
            .filter(|m| m.cached && m.is_remote() && m.created_at < older_than)
            .count())
    }

    async fn get_local_unattached_older_than(
        &self,
        older_than: DateTime<Utc>,
        max_id: Option<Uuid>,
        limit: usize,
    ) -> DbResult<Vec<MediaAttachment>> {
        let tables = self.read();
        Ok(page_by_id(tables.attachments.iter(), max_id, limit, |m| {
            m.cached
                && !m.is_remote()
                && !m.avatar
                && !m.header
                && m.status_id.is_none()
                && m.scheduled_status_id.is_none()
                && m.created_at < older_than
        }))
    }

    async fn get_attachments(
        &self,
        max_id: Option<Uuid>,
        limit: usize,
    ) -> DbResult<Vec<MediaAttachment>> {
        let tables = self.read();
        Ok(page_by_id(tables.attachments.iter(), max_id, limit, |_| true))
    }

    async fn put_emoji(&self, emoji: &Emoji) -> DbResult<()> {
        self.write().emojis.insert(emoji.id, emoji.clone());
        Ok(())
    }

    async fn update_emoji(&self, emoji: &Emoji) -> DbResult<()> {
        let mut tables = self.write();
        match tables.emojis.get_mut(&emoji.id) {
            Some(row) => {
                *row = emoji.clone();
                row.updated_at = Utc::now();
                Ok(())
            }
            None => Err(DbError::NotFound(format!("emoji {}", emoji.id))),
        }
    }

    async fn get_emoji(&self, id: Uuid) -> DbResult<Option<Emoji>> {
        Ok(self.read().emojis.get(&id).cloned())
    }

    async fn get_emoji_by_static_url(&self, url: &str) -> DbResult<Option<Emoji>> {
        Ok(self
            .read()
            .emojis
            .values()
            .find(|e| e.image_static_url == url)
            .cloned())
    }

    async fn delete_emoji(&self, id: Uuid) -> DbResult<()> {
        self.write()
            .emojis
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DbError::NotFound(format!("emoji {}", id)))
    }

    async fn get_remote_emojis(&self, max_id: Option<Uuid>, limit: usize) -> DbResult<Vec<Emoji>> {
        let tables = self.read();
        Ok(page_by_id(tables.emojis.iter(), max_id, limit, |e| !e.is_local()))
    }

    async fn get_cached_emojis_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> DbResult<Vec<Emoji>> {
        let tables = self.read();
        let mut rows: Vec<Emoji> = tables
            .emojis
            .values()
            .filter(|e| e.cached && !e.is_local() && e.updated_at < older_than)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn get_account(&self, id: Uuid) -> DbResult<Option<Account>> {
        Ok(self.read().accounts.get(&id).cloned())
    }

    async fn put_account(&self, account: &Account) -> DbResult<()> {
        self.write().accounts.insert(account.id, account.clone());
        Ok(())
    }
}
