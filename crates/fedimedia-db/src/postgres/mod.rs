//! PostgreSQL implementation of [`MediaRepository`].

mod account;
mod attachment;
mod emoji;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fedimedia_core::{Account, Emoji, MediaAttachment};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;

use crate::{DbError, DbResult, MediaRepository};
use account::AccountRow;
use attachment::{to_i64, AttachmentRow, ATTACHMENT_COLUMNS};
use emoji::{EmojiRow, EMOJI_COLUMNS};

#[derive(Clone)]
pub struct PgMediaRepository {
    pool: PgPool,
}

impl PgMediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> DbResult<Self> {
        tracing::info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "Database connected successfully");
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Binds $1..$26 in ATTACHMENT_COLUMNS order.
fn bind_attachment<'q>(
    query: Query<'q, Postgres, PgArguments>,
    m: &'q MediaAttachment,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(m.id)
        .bind(m.created_at)
        .bind(m.updated_at)
        .bind(m.status_id)
        .bind(&m.url)
        .bind(&m.remote_url)
        .bind(m.kind.as_str())
        .bind(Json(&m.file_meta))
        .bind(m.account_id)
        .bind(&m.description)
        .bind(m.scheduled_status_id)
        .bind(&m.blurhash)
        .bind(m.processing.as_str())
        .bind(&m.file.path)
        .bind(&m.file.content_type)
        .bind(to_i64(m.file.file_size))
        .bind(m.file.updated_at)
        .bind(&m.thumbnail.path)
        .bind(&m.thumbnail.content_type)
        .bind(to_i64(m.thumbnail.file_size))
        .bind(m.thumbnail.updated_at)
        .bind(&m.thumbnail.url)
        .bind(&m.thumbnail.remote_url)
        .bind(m.avatar)
        .bind(m.header)
        .bind(m.cached)
}

/// Binds $1..$22 in EMOJI_COLUMNS order.
fn bind_emoji<'q>(
    query: Query<'q, Postgres, PgArguments>,
    e: &'q Emoji,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(e.id)
        .bind(e.created_at)
        .bind(e.updated_at)
        .bind(&e.shortcode)
        .bind(&e.domain)
        .bind(e.path_id)
        .bind(&e.image_remote_url)
        .bind(&e.image_static_remote_url)
        .bind(&e.image_url)
        .bind(&e.image_static_url)
        .bind(&e.image_path)
        .bind(&e.image_static_path)
        .bind(&e.image_content_type)
        .bind(&e.image_static_content_type)
        .bind(to_i64(e.image_file_size))
        .bind(to_i64(e.image_static_file_size))
        .bind(e.image_updated_at)
        .bind(e.disabled)
        .bind(&e.uri)
        .bind(e.visible_in_picker)
        .bind(e.category_id)
        .bind(e.cached)
}

const UPDATE_ATTACHMENT: &str = r#"
    UPDATE media_attachments SET
        created_at = $2, updated_at = GREATEST($3, NOW()), status_id = $4, url = $5, remote_url = $6,
        kind = $7, file_meta = $8, account_id = $9, description = $10,
        scheduled_status_id = $11, blurhash = $12, processing = $13,
        file_path = $14, file_content_type = $15, file_size = $16, file_updated_at = $17,
        thumbnail_path = $18, thumbnail_content_type = $19, thumbnail_size = $20,
        thumbnail_updated_at = $21, thumbnail_url = $22, thumbnail_remote_url = $23,
        avatar = $24, header = $25, cached = $26
    WHERE id = $1
"#;

const UPDATE_EMOJI: &str = r#"
    UPDATE emojis SET
        created_at = $2, updated_at = GREATEST($3, NOW()), shortcode = $4, domain = $5, path_id = $6,
        image_remote_url = $7, image_static_remote_url = $8, image_url = $9,
        image_static_url = $10, image_path = $11, image_static_path = $12,
        image_content_type = $13, image_static_content_type = $14,
        image_file_size = $15, image_static_file_size = $16, image_updated_at = $17,
        disabled = $18, uri = $19, visible_in_picker = $20, category_id = $21, cached = $22
    WHERE id = $1
"#;

#[async_trait]
impl MediaRepository for PgMediaRepository {
    #[tracing::instrument(skip(self, media), fields(db.table = "media_attachments", db.operation = "insert", media_id = %media.id))]
    async fn put_attachment(&self, media: &MediaAttachment) -> DbResult<()> {
        let sql = format!(
            "INSERT INTO media_attachments ({ATTACHMENT_COLUMNS}) VALUES \
             ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26)"
        );
        bind_attachment(sqlx::query(&sql), media)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, media), fields(db.table = "media_attachments", db.operation = "update", media_id = %media.id))]
    async fn update_attachment(&self, media: &MediaAttachment) -> DbResult<()> {
        let result = bind_attachment(sqlx::query(UPDATE_ATTACHMENT), media)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("media attachment {}", media.id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_attachments", db.operation = "select"))]
    async fn get_attachment(&self, id: Uuid) -> DbResult<Option<MediaAttachment>> {
        let sql = format!("SELECT {ATTACHMENT_COLUMNS} FROM media_attachments WHERE id = $1");
        let row = sqlx::query_as::<Postgres, AttachmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AttachmentRow::to_domain).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_attachments", db.operation = "delete"))]
    async fn delete_attachment(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM media_attachments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("media attachment {}", id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_attachments", db.operation = "select"))]
    async fn get_avatars_and_headers(
        &self,
        max_id: Option<Uuid>,
        limit_rows: usize,
    ) -> DbResult<Vec<MediaAttachment>> {
        let sql = format!(
            r#"SELECT {ATTACHMENT_COLUMNS} FROM media_attachments
               WHERE (avatar OR header) AND ($1::uuid IS NULL OR id < $1)
               ORDER BY id DESC LIMIT $2"#
        );
        let rows = sqlx::query_as::<Postgres, AttachmentRow>(&sql)
            .bind(max_id)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await?;
        attachment::collect(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_attachments", db.operation = "select"))]
    async fn get_remote_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit_rows: usize,
    ) -> DbResult<Vec<MediaAttachment>> {
        let sql = format!(
            r#"SELECT {ATTACHMENT_COLUMNS} FROM media_attachments
               WHERE cached AND remote_url IS NOT NULL AND created_at < $1
               ORDER BY created_at DESC LIMIT $2"#
        );
        let rows = sqlx::query_as::<Postgres, AttachmentRow>(&sql)
            .bind(older_than)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await?;
        attachment::collect(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_attachments", db.operation = "count"))]
    async fn count_remote_older_than(&self, older_than: DateTime<Utc>) -> DbResult<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM media_attachments
               WHERE cached AND remote_url IS NOT NULL AND created_at < $1"#,
        )
        .bind(older_than)
        .fetch_one(&self.pool)
        .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_attachments", db.operation = "select"))]
    async fn get_local_unattached_older_than(
        &self,
        older_than: DateTime<Utc>,
        max_id: Option<Uuid>,
        limit_rows: usize,
    ) -> DbResult<Vec<MediaAttachment>> {
        let sql = format!(
            r#"SELECT {ATTACHMENT_COLUMNS} FROM media_attachments
               WHERE cached AND remote_url IS NULL
                 AND NOT avatar AND NOT header
                 AND status_id IS NULL AND scheduled_status_id IS NULL
                 AND created_at < $1
                 AND ($2::uuid IS NULL OR id < $2)
               ORDER BY id DESC LIMIT $3"#
        );
        let rows = sqlx::query_as::<Postgres, AttachmentRow>(&sql)
            .bind(older_than)
            .bind(max_id)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await?;
        attachment::collect(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_attachments", db.operation = "select"))]
    async fn get_attachments(
        &self,
        max_id: Option<Uuid>,
        limit_rows: usize,
    ) -> DbResult<Vec<MediaAttachment>> {
        let sql = format!(
            r#"SELECT {ATTACHMENT_COLUMNS} FROM media_attachments
               WHERE ($1::uuid IS NULL OR id < $1)
               ORDER BY id DESC LIMIT $2"#
        );
        let rows = sqlx::query_as::<Postgres, AttachmentRow>(&sql)
            .bind(max_id)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await?;
        attachment::collect(rows)
    }

    #[tracing::instrument(skip(self, emoji), fields(db.table = "emojis", db.operation = "insert", emoji_id = %emoji.id))]
    async fn put_emoji(&self, emoji: &Emoji) -> DbResult<()> {
        let sql = format!(
            "INSERT INTO emojis ({EMOJI_COLUMNS}) VALUES \
             ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)"
        );
        bind_emoji(sqlx::query(&sql), emoji)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, emoji), fields(db.table = "emojis", db.operation = "update", emoji_id = %emoji.id))]
    async fn update_emoji(&self, emoji: &Emoji) -> DbResult<()> {
        let result = bind_emoji(sqlx::query(UPDATE_EMOJI), emoji)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("emoji {}", emoji.id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "emojis", db.operation = "select"))]
    async fn get_emoji(&self, id: Uuid) -> DbResult<Option<Emoji>> {
        let sql = format!("SELECT {EMOJI_COLUMNS} FROM emojis WHERE id = $1");
        let row = sqlx::query_as::<Postgres, EmojiRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(EmojiRow::to_domain))
    }

    #[tracing::instrument(skip(self), fields(db.table = "emojis", db.operation = "select"))]
    async fn get_emoji_by_static_url(&self, url: &str) -> DbResult<Option<Emoji>> {
        let sql = format!("SELECT {EMOJI_COLUMNS} FROM emojis WHERE image_static_url = $1 LIMIT 1");
        let row = sqlx::query_as::<Postgres, EmojiRow>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(EmojiRow::to_domain))
    }

    #[tracing::instrument(skip(self), fields(db.table = "emojis", db.operation = "delete"))]
    async fn delete_emoji(&self, id: Uuid) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM emojis WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("emoji {}", id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "emojis", db.operation = "select"))]
    async fn get_remote_emojis(&self, max_id: Option<Uuid>, limit_rows: usize) -> DbResult<Vec<Emoji>> {
        let sql = format!(
            r#"SELECT {EMOJI_COLUMNS} FROM emojis
               WHERE domain IS NOT NULL AND ($1::uuid IS NULL OR id < $1)
               ORDER BY id DESC LIMIT $2"#
        );
        let rows = sqlx::query_as::<Postgres, EmojiRow>(&sql)
            .bind(max_id)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await?;
        emoji::collect(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "emojis", db.operation = "select"))]
    async fn get_cached_emojis_older_than(
        &self,
        older_than: DateTime<Utc>,
        limit_rows: usize,
    ) -> DbResult<Vec<Emoji>> {
        let sql = format!(
            r#"SELECT {EMOJI_COLUMNS} FROM emojis
               WHERE cached AND domain IS NOT NULL AND updated_at < $1
               ORDER BY updated_at DESC LIMIT $2"#
        );
        let rows = sqlx::query_as::<Postgres, EmojiRow>(&sql)
            .bind(older_than)
            .bind(limit(limit_rows))
            .fetch_all(&self.pool)
            .await?;
        emoji::collect(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "accounts", db.operation = "select"))]
    async fn get_account(&self, id: Uuid) -> DbResult<Option<Account>> {
        let row = sqlx::query_as::<Postgres, AccountRow>(
            r#"SELECT id, domain, avatar_media_attachment_id, header_media_attachment_id
               FROM accounts WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AccountRow::to_domain))
    }

    #[tracing::instrument(skip(self, account), fields(db.table = "accounts", db.operation = "upsert"))]
    async fn put_account(&self, account: &Account) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO accounts (id, domain, avatar_media_attachment_id, header_media_attachment_id)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (id) DO UPDATE SET
                   domain = EXCLUDED.domain,
                   avatar_media_attachment_id = EXCLUDED.avatar_media_attachment_id,
                   header_media_attachment_id = EXCLUDED.header_media_attachment_id"#,
        )
        .bind(account.id)
        .bind(&account.domain)
        .bind(account.avatar_media_attachment_id)
        .bind(account.header_media_attachment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
