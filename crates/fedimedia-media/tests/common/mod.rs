#![allow(dead_code)]

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fedimedia_core::{
    new_id, Emoji, MediaAttachment, MediaConfig, MediaKind, SizeClass, StoragePath,
};
use fedimedia_db::{MediaRepository, MemoryRepository};
use fedimedia_media::{Cleaner, Manager};
use fedimedia_storage::{MemoryStorage, Storage};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub struct Harness {
    pub manager: Manager,
    pub repo: Arc<MemoryRepository>,
    pub storage: Arc<MemoryStorage>,
    pub config: MediaConfig,
    _staging: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let staging = tempfile::tempdir().unwrap();
        let config = MediaConfig {
            temp_dir: staging.path().to_path_buf(),
            worker_pool_size: 2,
            url_base: "https://media.example/fileserver".to_string(),
            instance_account_id: Uuid::parse_str("0190d1b4-0000-7000-8000-000000000001").unwrap(),
            ..MediaConfig::default()
        };
        let repo = Arc::new(MemoryRepository::new());
        let storage = Arc::new(MemoryStorage::new());
        let manager = Manager::new(repo.clone(), storage.clone(), config.clone());
        Self {
            manager,
            repo,
            storage,
            config,
            _staging: staging,
        }
    }

    pub fn cleaner(&self) -> Cleaner {
        self.manager.cleaner()
    }

    pub async fn has(&self, key: &str) -> bool {
        self.storage.has(key).await.unwrap()
    }

    /// Store an attachment row with both blobs present.
    pub async fn stored_attachment(
        &self,
        account_id: Uuid,
        kind: MediaKind,
        created_at: DateTime<Utc>,
    ) -> MediaAttachment {
        let mut media = MediaAttachment::placeholder(new_id(), account_id);
        media.created_at = created_at;
        media.avatar = kind == MediaKind::Avatar;
        media.header = kind == MediaKind::Header;

        let original = StoragePath::new(account_id, kind, SizeClass::Original, media.id, "jpg");
        let small = StoragePath::new(account_id, kind, SizeClass::Small, media.id, "jpg");
        self.storage
            .put(&original.key(), Bytes::from_static(b"original"))
            .await
            .unwrap();
        self.storage
            .put(&small.key(), Bytes::from_static(b"small"))
            .await
            .unwrap();

        media.url = original.url(&self.config.url_base);
        media.file.path = original.key();
        media.file.content_type = "image/jpeg".to_string();
        media.thumbnail.path = small.key();
        media.thumbnail.url = small.url(&self.config.url_base);
        media.cached = true;
        self.repo.put_attachment(&media).await.unwrap();
        media
    }

    /// Store a remote emoji whose blobs live under `path_id`.
    pub async fn stored_emoji(&self, path_id: Uuid, updated_at: DateTime<Utc>) -> Emoji {
        let id = new_id();
        let mut emoji = Emoji::placeholder(id, "blobcat", format!("https://remote.example/emoji/{id}"));
        emoji.domain = Some("remote.example".to_string());
        emoji.path_id = path_id;
        emoji.updated_at = updated_at;

        let owner = self.config.instance_account_id;
        let original = StoragePath::new(owner, MediaKind::Emoji, SizeClass::Original, path_id, "png");
        let stat = StoragePath::new(owner, MediaKind::Emoji, SizeClass::Static, path_id, "png");
        self.storage
            .put(&original.key(), Bytes::from_static(b"emoji"))
            .await
            .unwrap();
        self.storage
            .put(&stat.key(), Bytes::from_static(b"static"))
            .await
            .unwrap();

        emoji.image_path = original.key();
        emoji.image_static_path = stat.key();
        emoji.image_url = original.url(&self.config.url_base);
        emoji.image_static_url = stat.url(&self.config.url_base);
        emoji.cached = true;
        self.repo.put_emoji(&emoji).await.unwrap();
        emoji
    }
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
    buf.into_inner()
}

/// Insert an EXIF APP1 segment carrying `orientation` right after SOI.
pub fn jpeg_with_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    let mut tiff = b"II".to_vec();
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());
    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x0112u16.to_le_bytes());
    tiff.extend_from_slice(&3u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&orientation.to_le_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_le_bytes());

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Incompressible PNG, so its encoded size tracks its pixel count.
pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    let img = RgbaImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgba([r, g, b, 255])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn small_png() -> Vec<u8> {
    let img = RgbaImage::from_pixel(16, 16, Rgba([200, 40, 40, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn animated_gif() -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        for shade in [10u8, 240] {
            let frame = RgbaImage::from_pixel(24, 24, Rgba([shade, shade, 0, 255]));
            encoder
                .encode_frame(Frame::from_parts(frame, 0, 0, Delay::from_numer_denom_ms(80, 1)))
                .unwrap();
        }
    }
    buf
}
