//! Media probing: container, geometry, timing and orientation of a staged file.

pub mod container;
pub mod ffprobe;
pub mod jpeg;
pub mod orientation;

use fedimedia_core::FileType;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::{Ffmpeg, ProcessingResult};
pub use container::ContainerType;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub kind: FileType,
    /// Container name as reported by the prober, e.g. `jpeg` or `matroska,webm`.
    pub container: String,
    pub mime: Option<&'static str>,
    pub extension: Option<&'static str>,
    /// Display width, already swapped for 90/270 degree orientations.
    pub width: u32,
    pub height: u32,
    pub framerate: Option<f32>,
    pub duration: Option<f32>,
    pub bitrate: Option<u64>,
    /// EXIF-style orientation, 1..=8.
    pub orientation: u8,
    pub pixel_format: Option<String>,
    pub has_alpha: bool,
}

impl ProbeResult {
    pub fn has_geometry(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Swap width/height when the orientation transposes the image.
    pub(crate) fn apply_orientation(mut self) -> Self {
        if orientation::swaps_dimensions(self.orientation) {
            std::mem::swap(&mut self.width, &mut self.height);
        }
        self
    }
}

/// Probe the file at `path`. JPEG is handled natively; everything else is
/// handed to sandboxed ffprobe.
pub async fn probe(path: &Path, ffmpeg: &Ffmpeg) -> ProcessingResult<ProbeResult> {
    let mut magic = [0u8; 3];
    let is_jpeg = {
        let mut file = tokio::fs::File::open(path).await?;
        match file.read_exact(&mut magic).await {
            Ok(_) => magic == JPEG_MAGIC,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
            Err(e) => return Err(e.into()),
        }
    };

    let result = if is_jpeg {
        let data = tokio::fs::read(path).await?;
        jpeg::probe_jpeg(&data)?
    } else {
        ffmpeg.probe(path).await?.into_probe_result()?
    };

    let result = result.apply_orientation();
    tracing::debug!(
        path = %path.display(),
        kind = result.kind.as_str(),
        container = %result.container,
        width = result.width,
        height = result.height,
        orientation = result.orientation,
        has_alpha = result.has_alpha,
        "Probed media"
    );
    Ok(result)
}
