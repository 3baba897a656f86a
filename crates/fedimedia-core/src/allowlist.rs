//! Content types accepted at each entry point.

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_GIF: &str = "image/gif";
pub const MIME_PNG: &str = "image/png";
pub const MIME_APNG: &str = "image/apng";
pub const MIME_WEBP: &str = "image/webp";
pub const MIME_MP4: &str = "video/mp4";
pub const MIME_QUICKTIME: &str = "video/quicktime";
pub const MIME_M4A: &str = "audio/mp4";

/// Content types permitted for attachments, avatars and headers.
pub const ATTACHMENT_TYPES: &[&str] = &[
    MIME_JPEG,
    MIME_GIF,
    MIME_PNG,
    MIME_APNG,
    MIME_WEBP,
    MIME_MP4,
    MIME_QUICKTIME,
    MIME_M4A,
];

/// Content types permitted for custom emoji.
pub const EMOJI_TYPES: &[&str] = &[MIME_GIF, MIME_PNG, MIME_WEBP];

pub fn attachment_allowed(content_type: &str) -> bool {
    ATTACHMENT_TYPES.contains(&content_type)
}

pub fn emoji_allowed(content_type: &str) -> bool {
    EMOJI_TYPES.contains(&content_type)
}
