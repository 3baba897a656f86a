//! Metadata scrubbing for staged originals.
//!
//! JPEG, PNG and WebP are rewritten natively with EXIF and text chunks
//! dropped (ICC profiles are kept). Anything else, or a native failure, is
//! re-muxed by ffmpeg with container metadata stripped; sample-level
//! metadata inside codec streams may survive that path.

use bytes::Bytes;
use fedimedia_core::allowlist::{MIME_JPEG, MIME_PNG, MIME_WEBP};
use img_parts::jpeg::{markers, Jpeg};
use img_parts::png::Png;
use img_parts::webp::WebP;
use img_parts::ImageEXIF;
use std::path::Path;

use super::thumbnail::run_blocking;
use crate::probe::ProbeResult;
use crate::{Ffmpeg, ProcessingError, ProcessingResult};

const PNG_TEXT_CHUNKS: [[u8; 4]; 4] = [*b"tEXt", *b"zTXt", *b"iTXt", *b"tIME"];

pub async fn strip_metadata(path: &Path, probe: &ProbeResult, ffmpeg: &Ffmpeg) -> ProcessingResult<()> {
    if let Some(mime) = probe.mime.filter(|m| [MIME_JPEG, MIME_PNG, MIME_WEBP].contains(m)) {
        match strip_native(path, mime).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::debug!(error = %err, mime, "Native metadata strip failed, falling back to ffmpeg");
            }
        }
    }

    let extension = probe
        .extension
        .ok_or_else(|| ProcessingError::Unsupported(probe.container.clone()))?;
    ffmpeg.clear_metadata(path, extension).await
}

async fn strip_native(path: &Path, mime: &'static str) -> ProcessingResult<()> {
    let data = Bytes::from(tokio::fs::read(path).await?);
    let before = data.len();
    let stripped = run_blocking(move || strip_bytes(data, mime)).await?;

    let mut tmp = path.as_os_str().to_os_string();
    tmp.push("_stripped");
    tokio::fs::write(&tmp, &stripped).await?;
    tokio::fs::rename(&tmp, path).await?;

    tracing::debug!(mime, before, after = stripped.len(), "Stripped metadata");
    Ok(())
}

/// Rewrite an encoded image without EXIF or textual metadata.
pub fn strip_bytes(data: Bytes, mime: &str) -> ProcessingResult<Bytes> {
    let malformed = |e: img_parts::Error| ProcessingError::decode("image metadata", e.to_string());
    match mime {
        MIME_JPEG => {
            let mut jpeg = Jpeg::from_bytes(data).map_err(malformed)?;
            jpeg.set_exif(None);
            jpeg.segments_mut().retain(|s| s.marker() != markers::COM);
            Ok(jpeg.encoder().bytes())
        }
        MIME_PNG => {
            let mut png = Png::from_bytes(data).map_err(malformed)?;
            png.set_exif(None);
            png.chunks_mut().retain(|c| !PNG_TEXT_CHUNKS.contains(&c.kind()));
            Ok(png.encoder().bytes())
        }
        MIME_WEBP => {
            let mut webp = WebP::from_bytes(data).map_err(malformed)?;
            webp.set_exif(None);
            Ok(webp.encoder().bytes())
        }
        other => Err(ProcessingError::Unsupported(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::jpeg::exif_orientation;
    use crate::probe::jpeg::tests::{encode_jpeg, with_exif};
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    #[test]
    fn jpeg_exif_is_dropped() {
        let data = with_exif(&encode_jpeg(16, 16), 6);
        assert_eq!(exif_orientation(&data), Some(6));

        let stripped = strip_bytes(Bytes::from(data), MIME_JPEG).unwrap();
        assert_eq!(exif_orientation(&stripped), None);
        assert!(image::load_from_memory(&stripped).is_ok());
    }

    #[test]
    fn png_text_chunks_are_dropped() {
        let mut buf = Cursor::new(Vec::new());
        RgbImage::new(4, 4).write_to(&mut buf, ImageFormat::Png).unwrap();
        let mut png = Png::from_bytes(Bytes::from(buf.into_inner())).unwrap();
        let text = img_parts::png::PngChunk::new(*b"tEXt", Bytes::from_static(b"Author\0someone"));
        let at = png.chunks().len() - 1;
        png.chunks_mut().insert(at, text);
        let with_text = png.encoder().bytes();

        let stripped = strip_bytes(with_text, MIME_PNG).unwrap();
        let reparsed = Png::from_bytes(stripped).unwrap();
        assert!(reparsed.chunks().iter().all(|c| &c.kind() != b"tEXt"));
    }

    #[test]
    fn other_types_are_unsupported() {
        let err = strip_bytes(Bytes::from_static(b"GIF89a"), "image/gif").unwrap_err();
        assert!(matches!(err, ProcessingError::Unsupported(_)));
    }
}
