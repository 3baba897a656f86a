//! Thumbnail generation.
//!
//! The strategy is picked from the probed content type and alpha presence.
//! Native strategies decode with the `image` crate, correct orientation,
//! nearest-neighbour resize and re-encode as JPEG. Everything else extracts a
//! single frame with sandboxed ffmpeg and encodes it as WebP.

use fedimedia_core::allowlist::{MIME_GIF, MIME_JPEG, MIME_PNG, MIME_WEBP};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::blurhash::blurhash_from_image;
use super::orientation::ImageOrientation;
use crate::probe::ProbeResult;
use crate::{Ffmpeg, ProcessingError, ProcessingResult};

const JPEG_QUALITY: u8 = 75;

/// Upper bound on decoded dimensions, guards against decompression bombs.
pub(crate) const MAX_DECODE_DIMENSION: u32 = 16384;

/// Scale `width`x`height` to fit inside `max`x`max`, preserving aspect ratio.
/// Never upscales.
pub fn thumb_size(max: u32, width: u32, height: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scaled = |long: u32, short: u32| -> u32 {
        let v = (f64::from(max) * f64::from(short) / f64::from(long)).round() as u32;
        v.max(1)
    };
    if width > height {
        (max, scaled(width, height))
    } else if height > width {
        (scaled(height, width), max)
    } else {
        (max, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbStrategy {
    NativeJpeg,
    NativeGif,
    NativePng,
    NativeWebp,
    Sandboxed,
}

impl ThumbStrategy {
    /// Dispatch on (content type, alpha presence).
    pub fn select(mime: Option<&str>, has_alpha: bool) -> Self {
        match (mime, has_alpha) {
            (Some(MIME_JPEG), _) => ThumbStrategy::NativeJpeg,
            (Some(MIME_GIF), _) => ThumbStrategy::NativeGif,
            (Some(MIME_PNG), false) => ThumbStrategy::NativePng,
            (Some(MIME_WEBP), false) => ThumbStrategy::NativeWebp,
            _ => ThumbStrategy::Sandboxed,
        }
    }

    fn image_format(self) -> Option<ImageFormat> {
        match self {
            ThumbStrategy::NativeJpeg => Some(ImageFormat::Jpeg),
            ThumbStrategy::NativeGif => Some(ImageFormat::Gif),
            ThumbStrategy::NativePng => Some(ImageFormat::Png),
            ThumbStrategy::NativeWebp => Some(ImageFormat::WebP),
            ThumbStrategy::Sandboxed => None,
        }
    }
}

/// A generated thumbnail file on local disk.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
    pub blurhash: Option<String>,
}

/// Generate a thumbnail for the probed file at `path`. `probe` must have
/// non-zero geometry. A blurhash of the thumbnail is computed when
/// `with_blurhash` is set.
pub async fn generate_thumbnail(
    path: &Path,
    probe: &ProbeResult,
    max_size: u32,
    with_blurhash: bool,
    ffmpeg: &Ffmpeg,
) -> ProcessingResult<Thumbnail> {
    let start = Instant::now();
    let (width, height) = thumb_size(max_size, probe.width, probe.height);
    let strategy = ThumbStrategy::select(probe.mime, probe.has_alpha);

    let thumbnail = match strategy.image_format() {
        Some(format) => {
            let input = path.to_path_buf();
            let orientation = probe.orientation;
            run_blocking(move || {
                native_thumbnail(&input, format, orientation, width, height, with_blurhash)
            })
            .await?
        }
        None => {
            let out = ffmpeg
                .thumbnail(path, width, height, probe.pixel_format.as_deref())
                .await?;
            let blurhash = if with_blurhash {
                let decoded = out.clone();
                Some(run_blocking(move || blurhash_from_file(&decoded)).await?)
            } else {
                None
            };
            Thumbnail {
                path: out,
                content_type: MIME_WEBP,
                extension: "webp",
                width,
                height,
                blurhash,
            }
        }
    };

    tracing::debug!(
        strategy = ?strategy,
        width = thumbnail.width,
        height = thumbnail.height,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Thumbnail generated"
    );
    Ok(thumbnail)
}

pub(crate) async fn run_blocking<T, F>(f: F) -> ProcessingResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ProcessingResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProcessingError::Io(std::io::Error::other(e)))?
}

pub(crate) fn decode_limited(path: &Path, format: ImageFormat) -> ProcessingResult<DynamicImage> {
    let mut reader = ImageReader::with_format(BufReader::new(File::open(path)?), format);
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    reader.limits(limits);
    Ok(reader.decode()?)
}

fn native_thumbnail(
    path: &Path,
    format: ImageFormat,
    orientation: u8,
    width: u32,
    height: u32,
    with_blurhash: bool,
) -> ProcessingResult<Thumbnail> {
    let img = decode_limited(path, format)?;
    let img = ImageOrientation::apply(img, orientation);
    let resized = img.resize_exact(width, height, FilterType::Nearest);

    let blurhash = if with_blurhash {
        Some(blurhash_from_image(&resized)?)
    } else {
        None
    };

    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push("_thumb.jpg");
    let out = path.with_file_name(name);
    let mut writer = BufWriter::new(File::create(&out)?);
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))?;
    writer.flush()?;

    Ok(Thumbnail {
        path: out,
        content_type: MIME_JPEG,
        extension: "jpg",
        width,
        height,
        blurhash,
    })
}

fn blurhash_from_file(path: &Path) -> ProcessingResult<String> {
    let img = decode_limited(path, ImageFormat::WebP)?;
    blurhash_from_image(&img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::jpeg::probe_jpeg;
    use crate::probe::jpeg::tests::{encode_jpeg, with_exif};
    use crate::Sandbox;
    use image::GenericImageView;
    use std::time::Duration;

    #[test]
    fn never_upscales() {
        assert_eq!(thumb_size(512, 100, 50), (100, 50));
        assert_eq!(thumb_size(512, 512, 512), (512, 512));
    }

    #[test]
    fn preserves_aspect() {
        assert_eq!(thumb_size(512, 1920, 1080), (512, 288));
        assert_eq!(thumb_size(512, 1080, 1920), (288, 512));
        assert_eq!(thumb_size(512, 2000, 2000), (512, 512));
        assert_eq!(thumb_size(512, 10000, 1), (512, 1));
    }

    #[test]
    fn strategy_table() {
        use ThumbStrategy::*;
        assert_eq!(ThumbStrategy::select(Some("image/jpeg"), false), NativeJpeg);
        assert_eq!(ThumbStrategy::select(Some("image/gif"), true), NativeGif);
        assert_eq!(ThumbStrategy::select(Some("image/png"), false), NativePng);
        assert_eq!(ThumbStrategy::select(Some("image/png"), true), Sandboxed);
        assert_eq!(ThumbStrategy::select(Some("image/webp"), false), NativeWebp);
        assert_eq!(ThumbStrategy::select(Some("image/webp"), true), Sandboxed);
        assert_eq!(ThumbStrategy::select(Some("video/mp4"), false), Sandboxed);
        assert_eq!(ThumbStrategy::select(None, false), Sandboxed);
    }

    fn ffmpeg() -> Ffmpeg {
        Ffmpeg::new("ffmpeg", "ffprobe", Sandbox::new(vec![], Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn native_jpeg_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("original");
        let data = encode_jpeg(1920, 1080);
        std::fs::write(&path, &data).unwrap();
        let probe = probe_jpeg(&data).unwrap().apply_orientation();

        let thumb = generate_thumbnail(&path, &probe, 512, true, &ffmpeg()).await.unwrap();
        assert_eq!((thumb.width, thumb.height), (512, 288));
        assert_eq!(thumb.content_type, "image/jpeg");
        assert!(thumb.blurhash.as_deref().is_some_and(|b| !b.is_empty()));

        let written = image::open(&thumb.path).unwrap();
        assert_eq!(written.dimensions(), (512, 288));
    }

    #[tokio::test]
    async fn rotated_jpeg_thumbnail_is_upright() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("original");
        let data = with_exif(&encode_jpeg(1000, 500), 6);
        std::fs::write(&path, &data).unwrap();
        let probe = probe_jpeg(&data).unwrap().apply_orientation();
        assert_eq!((probe.width, probe.height), (500, 1000));

        let thumb = generate_thumbnail(&path, &probe, 512, false, &ffmpeg()).await.unwrap();
        assert_eq!((thumb.width, thumb.height), (256, 512));
        assert!(thumb.blurhash.is_none());
        assert_eq!(image::open(&thumb.path).unwrap().dimensions(), (256, 512));
    }
}
