//! Storage path and URL scheme.
//!
//! Key format: `{owner_account_id}/{media_kind}/{size_class}/{media_id}.{extension}`.
//! The orphan sweep parses keys back with [`StoragePath::parse`], so the
//! format must stay stable.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

/// Allocate a new time-ordered identifier.
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

/// What a stored blob is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Attachment,
    Header,
    Avatar,
    Emoji,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Attachment => "attachment",
            MediaKind::Header => "header",
            MediaKind::Avatar => "avatar",
            MediaKind::Emoji => "emoji",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attachment" => Ok(MediaKind::Attachment),
            "header" => Ok(MediaKind::Header),
            "avatar" => Ok(MediaKind::Avatar),
            "emoji" => Ok(MediaKind::Emoji),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// Which derived size of a media object a blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    Original,
    Small,
    Static,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Original => "original",
            SizeClass::Small => "small",
            SizeClass::Static => "static",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(SizeClass::Original),
            "small" => Ok(SizeClass::Small),
            "static" => Ok(SizeClass::Static),
            other => Err(format!("unknown size class: {}", other)),
        }
    }
}

/// A parsed storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePath {
    pub owner_id: Uuid,
    pub kind: MediaKind,
    pub size: SizeClass,
    pub media_id: Uuid,
    pub extension: String,
}

fn key_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})/(attachment|header|avatar|emoji)/(original|small|static)/([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\.([a-z0-9]+)$",
        )
        .ok()
    })
    .as_ref()
}

impl StoragePath {
    pub fn new(
        owner_id: Uuid,
        kind: MediaKind,
        size: SizeClass,
        media_id: Uuid,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            kind,
            size,
            media_id,
            extension: extension.into(),
        }
    }

    /// Parse a storage key. Keys that are not of our shape yield `None`.
    pub fn parse(key: &str) -> Option<Self> {
        let caps = key_regex()?.captures(key)?;
        Some(Self {
            owner_id: Uuid::parse_str(&caps[1]).ok()?,
            kind: caps[2].parse().ok()?,
            size: caps[3].parse().ok()?,
            media_id: Uuid::parse_str(&caps[4]).ok()?,
            extension: caps[5].to_string(),
        })
    }

    /// Whether a key has the shape of a managed media path.
    pub fn matches(key: &str) -> bool {
        key_regex().is_some_and(|re| re.is_match(key))
    }

    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}/{}.{}",
            self.owner_id, self.kind, self.size, self.media_id, self.extension
        )
    }

    /// Public URL for this path under the given base, e.g.
    /// `https://example.org/fileserver/{key}`.
    pub fn url(&self, url_base: &str) -> String {
        format!("{}/{}", url_base.trim_end_matches('/'), self.key())
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
