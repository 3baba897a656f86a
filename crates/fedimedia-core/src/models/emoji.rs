use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A server-wide custom emoji, local or remote.
///
/// `path_id` is the media-id segment of the current blob paths. It starts out
/// equal to `id` and changes on every refresh so clients caching by URL never
/// get stale bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emoji {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shortcode: String,
    /// `None` for local emoji.
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
    pub image_file_size: u64,
    pub image_static_file_size: u64,
    pub image_updated_at: Option<DateTime<Utc>>,
    pub disabled: bool,
    pub uri: String,
    pub visible_in_picker: bool,
    pub category_id: Option<Uuid>,
    pub cached: bool,
}

impl Emoji {
    pub fn placeholder(id: Uuid, shortcode: impl Into<String>, uri: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            shortcode: shortcode.into(),
            domain: None,
            path_id: id,
            image_remote_url: None,
            image_static_remote_url: None,
            image_url: String::new(),
            image_static_url: String::new(),
            image_path: String::new(),
            image_static_path: String::new(),
            image_content_type: String::new(),
            image_static_content_type: String::new(),
            image_file_size: 0,
            image_static_file_size: 0,
            image_updated_at: None,
            disabled: false,
            uri: uri.into(),
            visible_in_picker: true,
            category_id: None,
            cached: false,
        }
    }

    pub fn apply_info(&mut self, info: AdditionalEmojiInfo) {
        if let Some(created_at) = info.created_at {
            self.created_at = created_at;
        }
        if info.domain.is_some() {
            self.domain = info.domain;
        }
        if info.image_remote_url.is_some() {
            self.image_remote_url = info.image_remote_url;
        }
        if info.image_static_remote_url.is_some() {
            self.image_static_remote_url = info.image_static_remote_url;
        }
        if let Some(disabled) = info.disabled {
            self.disabled = disabled;
        }
        if let Some(visible) = info.visible_in_picker {
            self.visible_in_picker = visible;
        }
        if info.category_id.is_some() {
            self.category_id = info.category_id;
        }
    }

    pub fn is_local(&self) -> bool {
        self.domain.is_none()
    }

    /// Zero every field derived by processing.
    pub fn clear_derived(&mut self) {
        self.image_url.clear();
        self.image_static_url.clear();
        self.image_path.clear();
        self.image_static_path.clear();
        self.image_content_type.clear();
        self.image_static_content_type.clear();
        self.image_file_size = 0;
        self.image_static_file_size = 0;
        self.image_updated_at = None;
        self.cached = false;
    }

    pub fn blob_paths(&self) -> Vec<&str> {
        [self.image_path.as_str(), self.image_static_path.as_str()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect()
    }
}

/// Optional fields a caller may set when registering or refreshing an emoji.
#[derive(Debug, Clone, Default)]
pub struct AdditionalEmojiInfo {
    pub created_at: Option<DateTime<Utc>>,
    pub domain: Option<String>,
    pub image_remote_url: Option<String>,
    pub image_static_remote_url: Option<String>,
    pub disabled: Option<bool>,
    pub visible_in_picker: Option<bool>,
    pub category_id: Option<Uuid>,
}
