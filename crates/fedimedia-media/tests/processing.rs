mod common;

use common::{animated_gif, jpeg, jpeg_with_orientation, noisy_png, small_png, Harness};
use fedimedia_core::{
    new_id, AdditionalEmojiInfo, AdditionalMediaInfo, FileMeta, FileType, MediaError,
    ProcessingStatus,
};
use fedimedia_db::MediaRepository;
use async_trait::async_trait;
use fedimedia_media::{BytesSource, LoadOutcome, MediaSource, SourceStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Counts how often the processing future asks for the bytes.
struct CountingSource {
    inner: BytesSource,
    opens: Arc<AtomicUsize>,
}

#[async_trait]
impl MediaSource for CountingSource {
    async fn open(&self, cancel: &CancellationToken) -> anyhow::Result<SourceStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(cancel).await
    }
}

#[tokio::test]
async fn jpeg_upload_produces_original_and_thumbnail() {
    let h = Harness::new();
    let account = new_id();
    let processing = h
        .manager
        .create_media(BytesSource::new(jpeg(1920, 1080)), account, AdditionalMediaInfo::default())
        .await
        .unwrap();

    let media = processing.load(&CancellationToken::new()).await.unwrap();

    let original = &media.file_meta.original;
    assert_eq!((original.width, original.height), (1920, 1080));
    assert_eq!(original.size, 2_073_600);
    assert!((original.aspect - 1.778).abs() < 1e-3);

    let small = &media.file_meta.small;
    assert_eq!((small.width, small.height), (512, 288));
    assert_eq!(small.size, 147_456);
    assert!((small.aspect - 1.778).abs() < 1e-3);

    assert_eq!(media.kind, FileType::Image);
    assert_eq!(media.file.content_type, "image/jpeg");
    assert_eq!(media.thumbnail.content_type, "image/jpeg");
    assert!(!media.blurhash.is_empty());
    assert!(media.cached);
    assert_eq!(media.processing, ProcessingStatus::Processed);

    assert_eq!(
        media.file.path,
        format!("{account}/attachment/original/{}.jpg", media.id)
    );
    assert_eq!(
        media.url,
        format!("https://media.example/fileserver/{}", media.file.path)
    );
    assert!(h.has(&media.file.path).await);
    assert!(h.has(&media.thumbnail.path).await);
    assert!(media.file.file_size > 0);

    let stored = h.repo.get_attachment(media.id).await.unwrap().unwrap();
    assert!(stored.cached);
    assert_eq!(stored.file_meta, media.file_meta);
}

#[tokio::test]
async fn placeholder_is_stored_before_load() {
    let h = Harness::new();
    let processing = h
        .manager
        .create_media(
            BytesSource::new(jpeg(64, 64)),
            new_id(),
            AdditionalMediaInfo {
                description: Some("a test square".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let row = h.repo.get_attachment(processing.id()).await.unwrap().unwrap();
    assert_eq!(row.processing, ProcessingStatus::Received);
    assert_eq!(row.kind, FileType::Unknown);
    assert_eq!(row.description.as_deref(), Some("a test square"));
    assert!(!row.cached);
    assert_eq!(h.storage.write_count(), 0);
}

#[tokio::test]
async fn truncated_jpeg_rolls_back_to_unknown() {
    let h = Harness::new();
    let full = jpeg(800, 600);
    let truncated = full[..full.len() / 2].to_vec();
    let processing = h
        .manager
        .create_media(BytesSource::new(truncated), new_id(), AdditionalMediaInfo::default())
        .await
        .unwrap();

    let err = processing.load(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(&*err, MediaError::Malformed(_)), "{err}");
    assert!(err.to_string().contains("error decoding jpeg"), "{err}");

    let row = h.repo.get_attachment(processing.id()).await.unwrap().unwrap();
    assert_eq!(row.kind, FileType::Unknown);
    assert_eq!(row.processing, ProcessingStatus::Processed);
    assert_eq!(row.file_meta, FileMeta::default());
    assert!(row.blob_paths().is_empty());
    assert!(!row.cached);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn invalid_orientation_resolves_to_unknown() {
    let h = Harness::new();
    let data = jpeg_with_orientation(&jpeg(40, 20), 9);
    let processing = h
        .manager
        .create_media(BytesSource::new(data), new_id(), AdditionalMediaInfo::default())
        .await
        .unwrap();

    let outcome = processing.try_load(&CancellationToken::new()).await;
    assert!(matches!(outcome, LoadOutcome::PermanentError(_)));

    let row = h.repo.get_attachment(processing.id()).await.unwrap().unwrap();
    assert_eq!(row.kind, FileType::Unknown);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn rotated_jpeg_is_stored_upright() {
    let h = Harness::new();
    let data = jpeg_with_orientation(&jpeg(1000, 500), 6);
    let processing = h
        .manager
        .create_media(BytesSource::new(data), new_id(), AdditionalMediaInfo::default())
        .await
        .unwrap();

    let media = processing.load(&CancellationToken::new()).await.unwrap();
    let original = &media.file_meta.original;
    assert_eq!((original.width, original.height), (500, 1000));
    let small = &media.file_meta.small;
    assert_eq!((small.width, small.height), (256, 512));
}

#[tokio::test]
async fn caller_blurhash_is_kept() {
    let h = Harness::new();
    let supplied = "LEHV6nWB2yk8pyo0adR*.7kCMdnj";
    let processing = h
        .manager
        .create_media(
            BytesSource::new(jpeg(300, 200)),
            new_id(),
            AdditionalMediaInfo {
                blurhash: Some(supplied.to_string()),
                remote_url: Some("https://remote.example/media/1.jpg".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let media = processing.load(&CancellationToken::new()).await.unwrap();
    assert_eq!(media.blurhash, supplied);
    assert!(media.is_remote());
    // 300x200 fits the bound, so the thumbnail keeps the original size.
    assert_eq!(media.file_meta.small.width, 300);
}

#[tokio::test]
async fn concurrent_loads_share_one_run() {
    let h = Harness::new();
    let processing = h
        .manager
        .create_media(BytesSource::new(jpeg(1024, 768)), new_id(), AdditionalMediaInfo::default())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let loads = (0..8).map(|_| {
        let processing = processing.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { processing.load(&cancel).await })
    });
    let results = futures::future::join_all(loads).await;

    let snapshots: Vec<_> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert!(snapshots.iter().all(|m| m == &snapshots[0]));
    // Original plus thumbnail, written exactly once.
    assert_eq!(h.storage.write_count(), 2);

    let again = processing.load(&cancel).await.unwrap();
    assert_eq!(again, snapshots[0]);
    assert_eq!(h.storage.write_count(), 2);
}

#[tokio::test]
async fn completed_drain_opens_source_once() {
    let h = Harness::new();
    let opens = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        inner: BytesSource::new(jpeg(320, 240)),
        opens: opens.clone(),
    };
    let processing = h
        .manager
        .create_media(source, new_id(), AdditionalMediaInfo::default())
        .await
        .unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 0);

    let cancel = CancellationToken::new();
    let loads = (0..4).map(|_| {
        let processing = processing.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { processing.load(&cancel).await })
    });
    for joined in futures::future::join_all(loads).await {
        joined.unwrap().unwrap();
    }
    processing.load(&cancel).await.unwrap();

    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn permanent_errors_are_memoized() {
    let h = Harness::new();
    let full = jpeg(200, 200);
    let processing = h
        .manager
        .create_media(
            BytesSource::new(full[..100].to_vec()),
            new_id(),
            AdditionalMediaInfo::default(),
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let first = processing.load(&cancel).await.unwrap_err();
    let second = processing.load(&cancel).await.unwrap_err();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn cancelled_load_finishes_in_background() {
    let h = Harness::new();
    let processing = h
        .manager
        .create_media(BytesSource::new(jpeg(640, 480)), new_id(), AdditionalMediaInfo::default())
        .await
        .unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(matches!(
        processing.try_load(&cancelled).await,
        LoadOutcome::Retryable
    ));
    assert_eq!(h.storage.write_count(), 0);

    let err = processing.load(&cancelled).await.unwrap_err();
    assert!(err.is_cancelled());

    // Shutdown drains the retry queue.
    h.manager.shutdown().await;

    let row = h.repo.get_attachment(processing.id()).await.unwrap().unwrap();
    assert!(row.cached);
    assert_eq!(row.kind, FileType::Image);
    assert!(h.has(&row.file.path).await);
    assert!(processing.try_load(&cancelled).await.is_success());
}

#[tokio::test]
async fn oversized_attachment_is_rejected() {
    let h = Harness::new();
    let mut harness_config = h.config.clone();
    harness_config.attachment_max_bytes = 1024;
    let manager = fedimedia_media::Manager::new(h.repo.clone(), h.storage.clone(), harness_config);

    let processing = manager
        .create_media(BytesSource::new(jpeg(256, 256)), new_id(), AdditionalMediaInfo::default())
        .await
        .unwrap();
    let err = processing.load(&CancellationToken::new()).await.unwrap_err();
    assert!(err.to_string().starts_with("reported size"), "{err}");
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn recache_restores_uncached_media() {
    let h = Harness::new();
    let data = jpeg(320, 240);
    let media = h
        .manager
        .create_media(BytesSource::new(data.clone()), new_id(), AdditionalMediaInfo::default())
        .await
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap();

    let cleaner = h.cleaner();
    for key in media.blob_paths() {
        fedimedia_storage::Storage::delete(&*h.storage, key).await.unwrap();
    }
    let fixed = cleaner.fix_cache_states(false).await.unwrap();
    assert_eq!(fixed.pruned, 1);
    assert!(!h.repo.get_attachment(media.id).await.unwrap().unwrap().cached);

    let recached = h
        .manager
        .recache_media(BytesSource::new(data), media.id)
        .await
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap();
    assert!(recached.cached);
    assert_eq!(recached.file.path, media.file.path);
    assert!(h.has(&recached.thumbnail.path).await);
}

#[tokio::test]
async fn recache_of_missing_row_is_not_found() {
    let h = Harness::new();
    let err = h
        .manager
        .recache_media(BytesSource::new(jpeg(8, 8)), new_id())
        .await
        .err()
        .unwrap();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn oversized_emoji_reports_written_size() {
    let h = Harness::new();
    let png = noisy_png(256, 256);
    assert!(png.len() > 50 * 1024);

    let processing = h
        .manager
        .create_emoji(
            BytesSource::new(png).with_declared_len(None),
            "huge",
            new_id(),
            "https://local.example/emoji/huge",
            AdditionalEmojiInfo::default(),
        )
        .await
        .unwrap();

    let err = processing.load(&CancellationToken::new()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("written size"), "{message}");
    assert!(message.ends_with("greater than max allowed 50.0kiB"), "{message}");
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn animated_emoji_gets_static_png() {
    let h = Harness::new();
    let id = new_id();
    let emoji = h
        .manager
        .create_emoji(
            BytesSource::new(animated_gif()),
            "party",
            id,
            "https://local.example/emoji/party",
            AdditionalEmojiInfo::default(),
        )
        .await
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap();

    let owner = h.config.instance_account_id;
    assert_eq!(emoji.image_path, format!("{owner}/emoji/original/{id}.gif"));
    assert_eq!(emoji.image_static_path, format!("{owner}/emoji/static/{id}.png"));
    assert_eq!(emoji.image_content_type, "image/gif");
    assert_eq!(emoji.image_static_content_type, "image/png");
    assert!(emoji.cached);

    let stat = fedimedia_storage::Storage::get(&*h.storage, &emoji.image_static_path)
        .await
        .unwrap();
    assert_eq!(
        image::guess_format(&stat).unwrap(),
        image::ImageFormat::Png
    );
}

#[tokio::test]
async fn jpeg_emoji_is_rejected() {
    let h = Harness::new();
    let id = new_id();
    let processing = h
        .manager
        .create_emoji(
            BytesSource::new(jpeg(16, 16)),
            "nope",
            id,
            "https://local.example/emoji/nope",
            AdditionalEmojiInfo::default(),
        )
        .await
        .unwrap();

    let err = processing.load(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(&*err, MediaError::Unsupported(_)), "{err}");
    let row = h.repo.get_emoji(id).await.unwrap().unwrap();
    assert!(!row.cached);
    assert!(row.blob_paths().is_empty());
}

#[tokio::test]
async fn refresh_moves_emoji_to_new_paths() {
    let h = Harness::new();
    let id = new_id();
    let original = h
        .manager
        .create_emoji(
            BytesSource::new(small_png()),
            "blob",
            id,
            "https://local.example/emoji/blob",
            AdditionalEmojiInfo::default(),
        )
        .await
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap();

    let refreshed = h
        .manager
        .refresh_emoji(
            BytesSource::new(animated_gif()),
            original.clone(),
            AdditionalEmojiInfo {
                visible_in_picker: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(refreshed.id, id);
    assert_ne!(refreshed.path_id, original.path_id);
    assert_ne!(refreshed.image_static_url, original.image_static_url);
    assert!(!refreshed.visible_in_picker);
    assert!(h.has(&refreshed.image_path).await);
    assert!(h.has(&refreshed.image_static_path).await);
    assert!(!h.has(&original.image_path).await);
    assert!(!h.has(&original.image_static_path).await);

    let row = h.repo.get_emoji(id).await.unwrap().unwrap();
    assert_eq!(row.image_static_path, refreshed.image_static_path);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_revision() {
    let h = Harness::new();
    let id = new_id();
    let original = h
        .manager
        .create_emoji(
            BytesSource::new(small_png()),
            "blob",
            id,
            "https://local.example/emoji/blob",
            AdditionalEmojiInfo::default(),
        )
        .await
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap();

    let err = h
        .manager
        .refresh_emoji(
            BytesSource::new(b"definitely not an image".to_vec()),
            original.clone(),
            AdditionalEmojiInfo::default(),
        )
        .await
        .unwrap()
        .load(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(&*err, MediaError::Unsupported(_)), "{err}");

    let row = h.repo.get_emoji(id).await.unwrap().unwrap();
    assert_eq!(row.image_path, original.image_path);
    assert!(row.cached);
    assert!(h.has(&original.image_path).await);
    assert!(h.has(&original.image_static_path).await);
    assert_eq!(h.storage.len(), 2);
}
