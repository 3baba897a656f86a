//! ffprobe JSON output and its reduction to a [`ProbeResult`].

use serde::Deserialize;
use std::collections::HashMap;

use super::{container, orientation, ProbeResult};
use crate::derive::pixel_format_has_alpha;
use crate::{ProcessingError, ProcessingResult};

#[derive(Debug, Default, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: Option<FfprobeFormat>,
    pub error: Option<FfprobeError>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub pix_fmt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub avg_frame_rate: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub side_data_list: Vec<SideData>,
    #[serde(default)]
    pub disposition: HashMap<String, i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SideData {
    pub rotation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FfprobeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeError {
    pub code: i64,
    pub string: String,
}

/// Parse ffprobe stdout. A reported `error` object and a result with no
/// streams or format are both errors.
pub fn parse(stdout: &[u8]) -> ProcessingResult<FfprobeOutput> {
    let output: FfprobeOutput = serde_json::from_slice(stdout)?;
    if let Some(err) = output.error {
        return Err(ProcessingError::Probe {
            code: err.code,
            message: err.string,
        });
    }
    if output.streams.is_empty() || output.format.is_none() {
        return Err(ProcessingError::decode(
            "ffprobe result",
            "missing streams or format",
        ));
    }
    Ok(output)
}

impl FfprobeStream {
    /// Embedded cover art is a still picture riding along with the audio,
    /// not a video track.
    fn is_attached_pic(&self) -> bool {
        self.disposition.get("attached_pic").is_some_and(|v| *v != 0)
    }

    fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video") && !self.is_attached_pic()
    }

    fn is_audio(&self) -> bool {
        self.codec_type.as_deref() == Some("audio")
    }

    /// `num/den` or a bare number. Zero when absent or undefined.
    pub fn framerate(&self) -> f32 {
        let Some(rate) = self.avg_frame_rate.as_deref() else {
            return 0.0;
        };
        let (num, den) = match rate.split_once('/') {
            Some((n, d)) => (n.parse::<f32>().unwrap_or(0.0), d.parse::<f32>().unwrap_or(0.0)),
            None => (rate.parse::<f32>().unwrap_or(0.0), 1.0),
        };
        if den == 0.0 || !num.is_finite() {
            0.0
        } else {
            num / den
        }
    }

    fn rotation(&self) -> Option<f64> {
        self.side_data_list
            .iter()
            .find_map(|sd| sd.rotation)
            // Legacy `rotate` tag is clockwise, side data counter-clockwise.
            .or_else(|| self.tags.get("rotate").and_then(|r| r.parse::<f64>().ok()).map(|r| -r))
    }
}

impl FfprobeOutput {
    pub fn into_probe_result(self) -> ProcessingResult<ProbeResult> {
        let format = self.format.unwrap_or_default();
        let format_name = format.format_name.unwrap_or_default();
        let duration = format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f32>().ok())
            .filter(|d| d.is_finite() && *d > 0.0);
        let bitrate = format.bit_rate.as_deref().and_then(|b| b.parse::<u64>().ok());

        let video: Vec<&FfprobeStream> = self.streams.iter().filter(|s| s.is_video()).collect();
        let audio = self.streams.iter().find(|s| s.is_audio());

        let width = video.iter().filter_map(|s| s.width).max().unwrap_or(0);
        let height = video.iter().filter_map(|s| s.height).max().unwrap_or(0);

        // Still-image containers report a framerate too; only trust it for
        // media that actually has a duration.
        let framerate = duration.and_then(|_| {
            video
                .iter()
                .map(|s| s.framerate())
                .filter(|fr| *fr > 0.0)
                .reduce(f32::min)
        });

        let tag = video
            .iter()
            .find_map(|s| s.tags.get("orientation"))
            .or_else(|| format.tags.get("orientation"))
            .and_then(|o| o.parse::<i64>().ok());
        let rotation = video.iter().find_map(|s| s.rotation());
        let orientation = orientation::reconcile(tag, rotation)?;

        let pixel_format = video.first().and_then(|s| s.pix_fmt.clone());
        let has_alpha = pixel_format.as_deref().is_some_and(pixel_format_has_alpha);

        let classified = container::classify(
            &format_name,
            video.first().and_then(|s| s.codec_name.as_deref()),
            audio.and_then(|s| s.codec_name.as_deref()),
            duration,
        );

        Ok(ProbeResult {
            kind: classified.kind,
            container: format_name,
            mime: classified.mime,
            extension: classified.extension,
            width,
            height,
            framerate,
            duration,
            bitrate,
            orientation,
            pixel_format,
            has_alpha,
        })
    }
}
