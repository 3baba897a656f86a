//! emojis table rows.

use chrono::{DateTime, Utc};
use fedimedia_core::Emoji;
use uuid::Uuid;

use super::attachment::to_u64;
use crate::DbResult;

pub(crate) const EMOJI_COLUMNS: &str = r#"
    id, created_at, updated_at, shortcode, domain, path_id,
    image_remote_url, image_static_remote_url, image_url, image_static_url,
    image_path, image_static_path, image_content_type, image_static_content_type,
    image_file_size, image_static_file_size, image_updated_at,
    disabled, uri, visible_in_picker, category_id, cached
"#;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EmojiRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shortcode: String,
    pub domain: Option<String>,
    pub path_id: Uuid,
    pub image_remote_url: Option<String>,
    pub image_static_remote_url: Option<String>,
    pub image_url: String,
    pub image_static_url: String,
    pub image_path: String,
    pub image_static_path: String,
    pub image_content_type: String,
    pub image_static_content_type: String,
    pub image_file_size: i64,
    pub image_static_file_size: i64,
    pub image_updated_at: Option<DateTime<Utc>>,
    pub disabled: bool,
    pub uri: String,
    pub visible_in_picker: bool,
    pub category_id: Option<Uuid>,
    pub cached: bool,
}

impl EmojiRow {
    pub fn to_domain(self) -> Emoji {
        Emoji {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            shortcode: self.shortcode,
            domain: self.domain,
            path_id: self.path_id,
            image_remote_url: self.image_remote_url,
            image_static_remote_url: self.image_static_remote_url,
            image_url: self.image_url,
            image_static_url: self.image_static_url,
            image_path: self.image_path,
            image_static_path: self.image_static_path,
            image_content_type: self.image_content_type,
            image_static_content_type: self.image_static_content_type,
            image_file_size: to_u64(self.image_file_size),
            image_static_file_size: to_u64(self.image_static_file_size),
            image_updated_at: self.image_updated_at,
            disabled: self.disabled,
            uri: self.uri,
            visible_in_picker: self.visible_in_picker,
            category_id: self.category_id,
            cached: self.cached,
        }
    }
}

pub(crate) fn collect(rows: Vec<EmojiRow>) -> DbResult<Vec<Emoji>> {
    Ok(rows.into_iter().map(EmojiRow::to_domain).collect())
}
