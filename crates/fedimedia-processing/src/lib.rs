//! Fedimedia Processing Library
//!
//! Probing and derivation for staged media files. Common still images are
//! handled natively with the `image` crate; everything else goes through
//! ffprobe/ffmpeg running inside a capability [`Sandbox`].

pub mod derive;
pub mod error;
pub mod ffmpeg;
pub mod probe;
pub mod sandbox;

pub use derive::{
    blurhash_from_image, derive_static_emoji, generate_thumbnail, pixel_format_has_alpha, sniff_emoji_type,
    strip_metadata, thumb_size, ThumbStrategy, Thumbnail,
};
pub use error::{ProcessingError, ProcessingResult};
pub use ffmpeg::Ffmpeg;
pub use probe::{probe, ContainerType, ProbeResult};
pub use sandbox::{AccessMode, Capability, Sandbox, SandboxOutput};
