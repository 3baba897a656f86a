//! Container/codec to (kind, content type, extension) table.

use fedimedia_core::allowlist::{MIME_APNG, MIME_GIF, MIME_JPEG, MIME_M4A, MIME_MP4, MIME_PNG, MIME_WEBP};
use fedimedia_core::FileType;

/// Soundless-or-short MP4 video at or under this many seconds is a gifv.
const GIFV_MAX_SECONDS: f32 = 30.0;

const MP4_FAMILY: &str = "mov,mp4,m4a,3gp,3g2,mj2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerType {
    pub kind: FileType,
    pub mime: Option<&'static str>,
    pub extension: Option<&'static str>,
}

impl ContainerType {
    const fn new(kind: FileType, mime: &'static str, extension: &'static str) -> Self {
        Self {
            kind,
            mime: Some(mime),
            extension: Some(extension),
        }
    }

    pub const UNKNOWN: Self = Self {
        kind: FileType::Unknown,
        mime: None,
        extension: None,
    };
}

fn image(mime: &'static str, ext: &'static str) -> ContainerType {
    ContainerType::new(FileType::Image, mime, ext)
}

fn video(mime: &'static str, ext: &'static str) -> ContainerType {
    ContainerType::new(FileType::Video, mime, ext)
}

fn audio(mime: &'static str, ext: &'static str) -> ContainerType {
    ContainerType::new(FileType::Audio, mime, ext)
}

/// Classify a probed container. Unmatched combinations are `UNKNOWN`,
/// which is a normal outcome rather than an error.
pub fn classify(
    format_name: &str,
    video_codec: Option<&str>,
    audio_codec: Option<&str>,
    duration: Option<f32>,
) -> ContainerType {
    match format_name {
        "jpeg_pipe" | "mjpeg" => image(MIME_JPEG, "jpg"),
        "png_pipe" => image(MIME_PNG, "png"),
        "apng" => image(MIME_APNG, "apng"),
        "gif" => image(MIME_GIF, "gif"),
        "webp_pipe" => image(MIME_WEBP, "webp"),
        "image2" => match video_codec {
            Some("mjpeg") => image(MIME_JPEG, "jpg"),
            Some("png") => image(MIME_PNG, "png"),
            Some("webp") => image(MIME_WEBP, "webp"),
            Some("gif") => image(MIME_GIF, "gif"),
            _ => ContainerType::UNKNOWN,
        },

        MP4_FAMILY => match (video_codec, audio_codec) {
            (Some(_), None) => ContainerType::new(FileType::Gifv, MIME_MP4, "mp4"),
            (Some(_), Some(_)) if duration.is_some_and(|d| d <= GIFV_MAX_SECONDS) => {
                ContainerType::new(FileType::Gifv, MIME_MP4, "mp4")
            }
            (Some(_), Some(_)) => video(MIME_MP4, "mp4"),
            (None, Some("aac")) => audio(MIME_M4A, "m4a"),
            _ => ContainerType::UNKNOWN,
        },

        "mp3" => match audio_codec {
            Some("mp2") => audio("audio/mpeg", "mp2"),
            Some(_) => audio("audio/mpeg", "mp3"),
            None => ContainerType::UNKNOWN,
        },

        "asf" => match (video_codec, audio_codec) {
            (Some(_), _) => video("video/x-ms-wmv", "wmv"),
            (None, Some(_)) => audio("audio/x-ms-wma", "wma"),
            _ => ContainerType::UNKNOWN,
        },

        "ogg" => match (video_codec, audio_codec) {
            (Some("theora" | "dirac"), _) => video("video/ogg", "ogv"),
            (None, Some("opus")) => audio("audio/ogg", "opus"),
            (None, Some("vorbis")) => audio("audio/ogg", "ogg"),
            _ => ContainerType::UNKNOWN,
        },

        "matroska,webm" => {
            let webm_audio = matches!(audio_codec, None | Some("vorbis" | "opus"));
            match video_codec {
                Some("vp8" | "vp9" | "av1") if webm_audio => video("video/webm", "webm"),
                Some(_) => video("video/x-matroska", "mkv"),
                None if audio_codec.is_some() && webm_audio => audio("audio/webm", "webm"),
                None if audio_codec.is_some() => audio("audio/x-matroska", "mka"),
                None => ContainerType::UNKNOWN,
            }
        }

        "avi" => match video_codec {
            Some(_) => video("video/x-msvideo", "avi"),
            None => ContainerType::UNKNOWN,
        },

        "flac" => audio("audio/flac", "flac"),

        _ => ContainerType::UNKNOWN,
    }
}
