//! Static (single-frame PNG) derivation for custom emoji.

use fedimedia_core::allowlist::{MIME_GIF, MIME_PNG, MIME_WEBP};
use image::{ImageFormat, ImageReader, Limits};
use std::io::Cursor;

use super::thumbnail::MAX_DECODE_DIMENSION;
use crate::{ProcessingError, ProcessingResult};

/// Content type of an emoji image, sniffed from its magic bytes. Formats
/// the `image` crate cannot identify yield `None`.
pub fn sniff_emoji_type(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data).ok()? {
        ImageFormat::Png => Some(MIME_PNG),
        ImageFormat::Gif => Some(MIME_GIF),
        ImageFormat::WebP => Some(MIME_WEBP),
        ImageFormat::Jpeg => Some(fedimedia_core::allowlist::MIME_JPEG),
        _ => None,
    }
}

/// Decode the first frame of an emoji image and re-encode it as PNG.
pub fn derive_static_emoji(data: &[u8], mime: &str) -> ProcessingResult<Vec<u8>> {
    let format = match mime {
        MIME_PNG => ImageFormat::Png,
        MIME_GIF => ImageFormat::Gif,
        MIME_WEBP => ImageFormat::WebP,
        other => {
            return Err(ProcessingError::Unsupported(format!(
                "{other} is not a valid emoji type"
            )))
        }
    };

    let mut reader = ImageReader::with_format(Cursor::new(data), format);
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    reader.limits(limits);
    let img = reader.decode()?;

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
