use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::paths::MediaKind;

/// Coarse processing state of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Received,
    Processing,
    Processed,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Received => "received",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(ProcessingStatus::Received),
            "processing" => Some(ProcessingStatus::Processing),
            "processed" => Some(ProcessingStatus::Processed),
            "error" => Some(ProcessingStatus::Error),
            _ => None,
        }
    }
}

/// What kind of media an attachment resolved to. `Unknown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Unknown,
    Image,
    Gifv,
    Video,
    Audio,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Unknown => "unknown",
            FileType::Image => "image",
            FileType::Gifv => "gifv",
            FileType::Video => "video",
            FileType::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(FileType::Unknown),
            "image" => Some(FileType::Image),
            "gifv" => Some(FileType::Gifv),
            "video" => Some(FileType::Video),
            "audio" => Some(FileType::Audio),
            _ => None,
        }
    }
}

/// Geometry of the original file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Original {
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub aspect: f32,
    pub duration: Option<f32>,
    pub framerate: Option<f32>,
    pub bitrate: Option<u64>,
}

impl Original {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            size: u64::from(width) * u64::from(height),
            aspect: aspect(width, height),
            ..Default::default()
        }
    }
}

/// Geometry of the thumbnail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Small {
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub aspect: f32,
}

impl Small {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            size: u64::from(width) * u64::from(height),
            aspect: aspect(width, height),
        }
    }
}

/// Crop focus point, both axes in [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Focus {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub original: Original,
    pub small: Small,
    pub focus: Focus,
}

fn aspect(width: u32, height: u32) -> f32 {
    if height == 0 {
        0.0
    } else {
        width as f32 / height as f32
    }
}

/// Stored original file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub content_type: String,
    pub file_size: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Stored thumbnail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub path: String,
    pub content_type: String,
    pub file_size: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub url: String,
    pub remote_url: Option<String>,
}

/// A user-uploaded or remotely fetched image, video or audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_id: Option<Uuid>,
    pub url: String,
    pub remote_url: Option<String>,
    pub kind: FileType,
    pub file_meta: FileMeta,
    pub account_id: Uuid,
    pub description: Option<String>,
    pub scheduled_status_id: Option<Uuid>,
    pub blurhash: String,
    pub processing: ProcessingStatus,
    pub file: FileInfo,
    pub thumbnail: Thumbnail,
    pub avatar: bool,
    pub header: bool,
    pub cached: bool,
}

impl MediaAttachment {
    /// Placeholder row for a freshly registered source.
    pub fn placeholder(id: Uuid, account_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            status_id: None,
            url: String::new(),
            remote_url: None,
            kind: FileType::Unknown,
            file_meta: FileMeta::default(),
            account_id,
            description: None,
            scheduled_status_id: None,
            blurhash: String::new(),
            processing: ProcessingStatus::Received,
            file: FileInfo::default(),
            thumbnail: Thumbnail::default(),
            avatar: false,
            header: false,
            cached: false,
        }
    }

    /// Apply caller-supplied fields on top of the placeholder.
    pub fn apply_info(&mut self, info: AdditionalMediaInfo) {
        if let Some(created_at) = info.created_at {
            self.created_at = created_at;
        }
        if info.status_id.is_some() {
            self.status_id = info.status_id;
        }
        if info.remote_url.is_some() {
            self.remote_url = info.remote_url;
        }
        if info.description.is_some() {
            self.description = info.description;
        }
        if info.scheduled_status_id.is_some() {
            self.scheduled_status_id = info.scheduled_status_id;
        }
        if let Some(blurhash) = info.blurhash {
            self.blurhash = blurhash;
        }
        if let Some(avatar) = info.avatar {
            self.avatar = avatar;
        }
        if let Some(header) = info.header {
            self.header = header;
        }
        if let Some(x) = info.focus_x {
            self.file_meta.focus.x = x;
        }
        if let Some(y) = info.focus_y {
            self.file_meta.focus.y = y;
        }
    }

    /// Whether this attachment was fetched from a remote instance.
    pub fn is_remote(&self) -> bool {
        self.remote_url.is_some()
    }

    /// Path segment used when storing this attachment's blobs.
    pub fn media_kind(&self) -> MediaKind {
        if self.avatar {
            MediaKind::Avatar
        } else if self.header {
            MediaKind::Header
        } else {
            MediaKind::Attachment
        }
    }

    /// Zero every field the processing run derives. Identity, ownership,
    /// description, focus and remote URLs survive. The caller supplied
    /// blurhash is dropped too since it described bytes we no longer hold.
    pub fn clear_derived(&mut self) {
        let focus = self.file_meta.focus;
        let thumb_remote = self.thumbnail.remote_url.take();
        self.file_meta = FileMeta {
            focus,
            ..FileMeta::default()
        };
        self.file = FileInfo::default();
        self.thumbnail = Thumbnail {
            remote_url: thumb_remote,
            ..Thumbnail::default()
        };
        self.url.clear();
        self.blurhash.clear();
        self.cached = false;
    }

    /// Non-empty blob paths owned by this row.
    pub fn blob_paths(&self) -> Vec<&str> {
        [self.file.path.as_str(), self.thumbnail.path.as_str()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect()
    }
}

/// Optional fields a caller may set when registering media.
#[derive(Debug, Clone, Default)]
pub struct AdditionalMediaInfo {
    pub created_at: Option<DateTime<Utc>>,
    pub status_id: Option<Uuid>,
    pub remote_url: Option<String>,
    pub description: Option<String>,
    pub scheduled_status_id: Option<Uuid>,
    pub blurhash: Option<String>,
    pub avatar: Option<bool>,
    pub header: Option<bool>,
    pub focus_x: Option<f32>,
    pub focus_y: Option<f32>,
}
