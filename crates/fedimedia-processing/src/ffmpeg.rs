//! ffprobe/ffmpeg invocations, each granted only the files it works on.

use fedimedia_core::MediaConfig;
use std::path::{Path, PathBuf};

use crate::probe::ffprobe::{self, FfprobeOutput};
use crate::sandbox::{Capability, Sandbox};
use crate::{ProcessingError, ProcessingResult};

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg_path: String,
    ffprobe_path: String,
    sandbox: Sandbox,
}

impl Ffmpeg {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>, sandbox: Sandbox) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            sandbox,
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
            Sandbox::from_config(config),
        )
    }

    /// Probe `path`, reading at most the first second of stream data.
    #[tracing::instrument(skip(self), fields(binary = %self.ffprobe_path))]
    pub async fn probe(&self, path: &Path) -> ProcessingResult<FfprobeOutput> {
        let args = ffprobe_args(path);
        let output = self
            .sandbox
            .run(&self.ffprobe_path, &args, &[Capability::read(path)])
            .await?;

        // A failed probe still prints the JSON error object.
        match ffprobe::parse(&output.stdout) {
            Ok(parsed) => Ok(parsed),
            Err(err @ ProcessingError::Probe { .. }) => Err(err),
            Err(err) if output.success => Err(err),
            Err(_) => Err(ProcessingError::ProcessFailed {
                binary: self.ffprobe_path.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    /// Re-mux `path` in place with container-level metadata dropped.
    #[tracing::instrument(skip(self), fields(binary = %self.ffmpeg_path))]
    pub async fn clear_metadata(&self, path: &Path, extension: &str) -> ProcessingResult<()> {
        let workdir = scratch_dir(path)?;
        let out = workdir.path().join(format!("cleaned.{extension}"));
        let args = vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            path_arg(path),
            "-map_metadata".to_string(),
            "-1".to_string(),
            "-codec".to_string(),
            "copy".to_string(),
            path_arg(&out),
        ];
        self.sandbox
            .run_checked(
                &self.ffmpeg_path,
                &args,
                &[Capability::read(path), Capability::read_write(workdir.path())],
            )
            .await?;
        tokio::fs::rename(&out, path).await?;
        Ok(())
    }

    /// Extract one frame scaled to `width`x`height`, encoded as WebP.
    /// The source `pixel_format` is kept when libwebp can encode it.
    /// The output is written next to `path` and its location returned.
    #[tracing::instrument(skip(self), fields(binary = %self.ffmpeg_path))]
    pub async fn thumbnail(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        pixel_format: Option<&str>,
    ) -> ProcessingResult<PathBuf> {
        let workdir = scratch_dir(path)?;
        let out = workdir.path().join("thumb.webp");
        let args = thumbnail_args(path, &out, width, height, pixel_format);
        self.sandbox
            .run_checked(
                &self.ffmpeg_path,
                &args,
                &[Capability::read(path), Capability::read_write(workdir.path())],
            )
            .await?;

        let target = sibling(path, "_thumb.webp");
        tokio::fs::rename(&out, &target).await?;
        Ok(target)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Fresh directory beside `path` the child may write into.
fn scratch_dir(path: &Path) -> ProcessingResult<tempfile::TempDir> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(tempfile::Builder::new().prefix("ffmpeg-").tempdir_in(parent)?)
}

pub(crate) fn ffprobe_args(path: &Path) -> Vec<String> {
    [
        "-v",
        "error",
        "-show_error",
        "-read_intervals",
        "%+1",
        "-show_entries",
        "stream=codec_type,codec_name,pix_fmt,width,height,avg_frame_rate\
         :stream_tags=orientation,rotate\
         :stream_side_data=rotation\
         :stream_disposition=attached_pic\
         :format=format_name,duration,bit_rate\
         :format_tags=orientation",
        "-of",
        "json",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(path_arg(path)))
    .collect()
}

/// Pixel formats the libwebp encoder takes without conversion.
const WEBP_PIXEL_FORMATS: &[&str] = &["yuv420p", "yuva420p", "bgra"];

fn thumbnail_filter(width: u32, height: u32, pixel_format: Option<&str>) -> String {
    let mut filter = format!("thumbnail=n=10,scale={width}:{height}");
    if let Some(fmt) = pixel_format.filter(|fmt| WEBP_PIXEL_FORMATS.contains(fmt)) {
        filter.push_str(",format=");
        filter.push_str(fmt);
    }
    filter
}

pub(crate) fn thumbnail_args(
    input: &Path,
    output: &Path,
    width: u32,
    height: u32,
    pixel_format: Option<&str>,
) -> Vec<String> {
    vec![
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        path_arg(input),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        thumbnail_filter(width, height, pixel_format),
        "-c:v".to_string(),
        "libwebp".to_string(),
        "-f".to_string(),
        "webp".to_string(),
        path_arg(output),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reads_only_first_second() {
        let args = ffprobe_args(Path::new("/tmp/in.bin"));
        let pos = args.iter().position(|a| a == "-read_intervals").unwrap();
        assert_eq!(args[pos + 1], "%+1");
        assert!(args[pos + 3].contains("stream_side_data=rotation"));
        assert!(args[pos + 3].contains("stream_disposition=attached_pic"));
        assert_eq!(args.last().unwrap(), "/tmp/in.bin");
    }

    #[test]
    fn thumbnail_takes_one_frame() {
        let args = thumbnail_args(
            Path::new("/a/in.mp4"),
            Path::new("/a/x/thumb.webp"),
            512,
            288,
            None,
        );
        assert!(args.windows(2).any(|w| w[0] == "-frames:v" && w[1] == "1"));
        assert!(args.iter().any(|a| a.ends_with("scale=512:288")));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libwebp"));
    }

    #[test]
    fn thumbnail_keeps_encodable_pixel_format() {
        let args = thumbnail_args(
            Path::new("/a/in.webm"),
            Path::new("/a/x/thumb.webp"),
            320,
            240,
            Some("yuva420p"),
        );
        let pos = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[pos + 1], "thumbnail=n=10,scale=320:240,format=yuva420p");

        // Formats libwebp cannot take are left to the encoder's conversion.
        assert_eq!(
            thumbnail_filter(320, 240, Some("yuv444p10le")),
            "thumbnail=n=10,scale=320:240"
        );
        assert_eq!(thumbnail_filter(320, 240, None), "thumbnail=n=10,scale=320:240");
    }

    #[test]
    fn sibling_appends_suffix() {
        assert_eq!(
            sibling(Path::new("/tmp/run/original"), "_thumb.webp"),
            PathBuf::from("/tmp/run/original_thumb.webp")
        );
    }
}
