//! media_attachments table rows.

use chrono::{DateTime, Utc};
use fedimedia_core::{FileInfo, FileMeta, FileType, MediaAttachment, ProcessingStatus, Thumbnail};
use sqlx::types::Json;
use uuid::Uuid;

use crate::{DbError, DbResult};

pub(crate) const ATTACHMENT_COLUMNS: &str = r#"
    id, created_at, updated_at, status_id, url, remote_url, kind, file_meta,
    account_id, description, scheduled_status_id, blurhash, processing,
    file_path, file_content_type, file_size, file_updated_at,
    thumbnail_path, thumbnail_content_type, thumbnail_size, thumbnail_updated_at,
    thumbnail_url, thumbnail_remote_url, avatar, header, cached
"#;

/// Row type for media_attachments table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AttachmentRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_id: Option<Uuid>,
    pub url: String,
    pub remote_url: Option<String>,
    pub kind: String,
    pub file_meta: Json<FileMeta>,
    pub account_id: Uuid,
    pub description: Option<String>,
    pub scheduled_status_id: Option<Uuid>,
    pub blurhash: String,
    pub processing: String,
    pub file_path: String,
    pub file_content_type: String,
    pub file_size: i64,
    pub file_updated_at: Option<DateTime<Utc>>,
    pub thumbnail_path: String,
    pub thumbnail_content_type: String,
    pub thumbnail_size: i64,
    pub thumbnail_updated_at: Option<DateTime<Utc>>,
    pub thumbnail_url: String,
    pub thumbnail_remote_url: Option<String>,
    pub avatar: bool,
    pub header: bool,
    pub cached: bool,
}

impl AttachmentRow {
    pub fn to_domain(self) -> DbResult<MediaAttachment> {
        let kind = FileType::parse(&self.kind)
            .ok_or_else(|| DbError::Decode(format!("unknown media kind '{}'", self.kind)))?;
        let processing = ProcessingStatus::parse(&self.processing).ok_or_else(|| {
            DbError::Decode(format!("unknown processing status '{}'", self.processing))
        })?;

        Ok(MediaAttachment {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            status_id: self.status_id,
            url: self.url,
            remote_url: self.remote_url,
            kind,
            file_meta: self.file_meta.0,
            account_id: self.account_id,
            description: self.description,
            scheduled_status_id: self.scheduled_status_id,
            blurhash: self.blurhash,
            processing,
            file: FileInfo {
                path: self.file_path,
                content_type: self.file_content_type,
                file_size: to_u64(self.file_size),
                updated_at: self.file_updated_at,
            },
            thumbnail: Thumbnail {
                path: self.thumbnail_path,
                content_type: self.thumbnail_content_type,
                file_size: to_u64(self.thumbnail_size),
                updated_at: self.thumbnail_updated_at,
                url: self.thumbnail_url,
                remote_url: self.thumbnail_remote_url,
            },
            avatar: self.avatar,
            header: self.header,
            cached: self.cached,
        })
    }
}

pub(crate) fn to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

pub(crate) fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

pub(crate) fn collect(rows: Vec<AttachmentRow>) -> DbResult<Vec<MediaAttachment>> {
    rows.into_iter().map(AttachmentRow::to_domain).collect()
}
