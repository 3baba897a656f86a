//! Derived artifacts: scrubbed original, thumbnail, blurhash and static emoji.

pub mod alpha;
pub mod blurhash;
pub mod emoji;
pub mod metadata;
pub mod orientation;
pub mod thumbnail;

pub use self::blurhash::blurhash_from_image;
pub use alpha::pixel_format_has_alpha;
pub use emoji::{derive_static_emoji, sniff_emoji_type};
pub use metadata::strip_metadata;
pub use thumbnail::{generate_thumbnail, thumb_size, ThumbStrategy, Thumbnail};
