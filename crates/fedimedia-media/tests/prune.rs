mod common;

use bytes::Bytes;
use chrono::{Duration, Utc};
use common::Harness;
use fedimedia_core::{new_id, Account, Emoji, MediaKind, SizeClass, StoragePath};
use fedimedia_db::MediaRepository;
use fedimedia_media::Sweep;
use fedimedia_storage::Storage;

#[tokio::test]
async fn unused_local_sweep_is_idempotent() {
    let h = Harness::new();
    let account = new_id();
    let stale = h
        .stored_attachment(account, MediaKind::Attachment, Utc::now() - Duration::days(4))
        .await;
    let fresh = h
        .stored_attachment(account, MediaKind::Attachment, Utc::now() - Duration::hours(2))
        .await;
    let mut posted = h
        .stored_attachment(account, MediaKind::Attachment, Utc::now() - Duration::days(10))
        .await;
    posted.status_id = Some(new_id());
    h.repo.update_attachment(&posted).await.unwrap();

    let cleaner = h.cleaner();
    let dry = cleaner.prune_unused_local(3, true).await.unwrap();
    assert_eq!(dry.pruned, 1);
    assert!(h.repo.get_attachment(stale.id).await.unwrap().is_some());

    let first = cleaner.prune_unused_local(3, false).await.unwrap();
    assert_eq!(first.pruned, 1);
    assert!(first.errors.is_empty());
    assert!(h.repo.get_attachment(stale.id).await.unwrap().is_none());
    assert!(!h.has(&stale.file.path).await);
    assert!(!h.has(&stale.thumbnail.path).await);
    assert!(h.has(&fresh.file.path).await);
    assert!(h.has(&posted.file.path).await);

    let second = cleaner.prune_unused_local(3, false).await.unwrap();
    assert_eq!(second.pruned, 0);
}

#[tokio::test]
async fn unused_local_sweep_pages_past_one_batch() {
    let h = Harness::new();
    let account = new_id();
    let old = Utc::now() - Duration::days(5);
    for _ in 0..45 {
        h.stored_attachment(account, MediaKind::Attachment, old).await;
    }

    let result = h.cleaner().prune_unused_local(3, false).await.unwrap();
    assert_eq!(result.pruned, 45);
    assert_eq!(h.repo.attachment_count(), 0);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn unused_avatars_and_headers_are_pruned() {
    let h = Harness::new();
    let now = Utc::now();

    let owner = new_id();
    let current = h.stored_attachment(owner, MediaKind::Avatar, now).await;
    let replaced = h.stored_attachment(owner, MediaKind::Avatar, now).await;
    let header = h.stored_attachment(owner, MediaKind::Header, now).await;
    let mut account = Account::new(owner);
    account.domain = Some("remote.example".to_string());
    account.avatar_media_attachment_id = Some(current.id);
    account.header_media_attachment_id = Some(header.id);
    h.repo.put_account(&account).await.unwrap();

    let orphan_owner = h.stored_attachment(new_id(), MediaKind::Header, now).await;

    let cleaner = h.cleaner();
    let first = cleaner.prune_unused_remote(false).await.unwrap();
    assert_eq!(first.pruned, 2);
    assert!(h.repo.get_attachment(replaced.id).await.unwrap().is_none());
    assert!(h.repo.get_attachment(orphan_owner.id).await.unwrap().is_none());
    assert!(h.repo.get_attachment(current.id).await.unwrap().is_some());
    assert!(h.has(&header.file.path).await);

    let second = cleaner.prune_unused_remote(false).await.unwrap();
    assert_eq!(second.pruned, 0);
}

#[tokio::test]
async fn uncache_remote_keeps_rows() {
    let h = Harness::new();
    let account = new_id();
    let mut old = h
        .stored_attachment(account, MediaKind::Attachment, Utc::now() - Duration::days(10))
        .await;
    old.remote_url = Some("https://remote.example/media/old.jpg".to_string());
    h.repo.update_attachment(&old).await.unwrap();

    let mut recent = h
        .stored_attachment(account, MediaKind::Attachment, Utc::now() - Duration::days(1))
        .await;
    recent.remote_url = Some("https://remote.example/media/recent.jpg".to_string());
    h.repo.update_attachment(&recent).await.unwrap();

    let cleaner = h.cleaner();
    let dry = cleaner.uncache_remote(7, true).await.unwrap();
    assert_eq!(dry.pruned, 1);
    assert!(h.has(&old.file.path).await);

    let first = cleaner.uncache_remote(7, false).await.unwrap();
    assert_eq!(first.pruned, 1);

    let row = h.repo.get_attachment(old.id).await.unwrap().unwrap();
    assert!(!row.cached);
    for path in row.blob_paths() {
        assert!(!h.has(path).await, "{path} should be gone");
    }
    assert!(h.has(&recent.file.path).await);

    let second = cleaner.uncache_remote(7, false).await.unwrap();
    assert_eq!(second.pruned, 0);
}

#[tokio::test]
async fn orphan_sweep_removes_only_unowned_blobs() {
    let h = Harness::new();
    let media = h
        .stored_attachment(new_id(), MediaKind::Attachment, Utc::now())
        .await;

    // A blob deleted out of band is absent, not orphaned.
    h.storage.delete(&media.thumbnail.path).await.unwrap();

    let planted = StoragePath::new(new_id(), MediaKind::Attachment, SizeClass::Original, new_id(), "png").key();
    h.storage
        .put(&planted, Bytes::from_static(b"nobody owns me"))
        .await
        .unwrap();
    h.storage
        .put("backups/not-ours.tar", Bytes::from_static(b"leave me"))
        .await
        .unwrap();

    let cleaner = h.cleaner();
    let dry = cleaner.prune_orphaned(true).await.unwrap();
    assert_eq!(dry.pruned, 1);
    assert!(h.has(&planted).await);

    let real = cleaner.prune_orphaned(false).await.unwrap();
    assert_eq!(real.pruned, 1);
    assert!(!h.has(&planted).await);
    assert!(h.has(&media.file.path).await);
    assert!(h.has("backups/not-ours.tar").await);

    assert_eq!(cleaner.prune_orphaned(false).await.unwrap().pruned, 0);
}

#[tokio::test]
async fn orphan_sweep_matches_refreshed_emoji_by_static_url() {
    let h = Harness::new();
    // Row id and path id differ, as after a refresh.
    let emoji = h.stored_emoji(new_id(), Utc::now()).await;
    assert_ne!(emoji.id, emoji.path_id);

    let stale = StoragePath::new(
        h.config.instance_account_id,
        MediaKind::Emoji,
        SizeClass::Static,
        emoji.id,
        "png",
    )
    .key();
    h.storage
        .put(&stale, Bytes::from_static(b"previous revision"))
        .await
        .unwrap();

    let result = h.cleaner().prune_orphaned(false).await.unwrap();
    assert_eq!(result.pruned, 1);
    assert!(!h.has(&stale).await);
    assert!(h.has(&emoji.image_path).await);
    assert!(h.has(&emoji.image_static_path).await);
}

#[tokio::test]
async fn orphan_sweep_drops_emoji_blobs_outside_instance_account() {
    let h = Harness::new();
    let kept = h.stored_emoji(new_id(), Utc::now()).await;

    // A row whose static URL points under some other account segment.
    let foreign = new_id();
    let path_id = new_id();
    let original = StoragePath::new(foreign, MediaKind::Emoji, SizeClass::Original, path_id, "png");
    let stat = StoragePath::new(foreign, MediaKind::Emoji, SizeClass::Static, path_id, "png");
    for key in [original.key(), stat.key()] {
        h.storage.put(&key, Bytes::from_static(b"emoji")).await.unwrap();
    }
    let mut emoji = Emoji::placeholder(new_id(), "blobfox", "https://remote.example/emoji/fox");
    emoji.path_id = path_id;
    emoji.image_path = original.key();
    emoji.image_static_path = stat.key();
    emoji.image_url = original.url(&h.config.url_base);
    emoji.image_static_url = stat.url(&h.config.url_base);
    h.repo.put_emoji(&emoji).await.unwrap();
    assert!(h
        .repo
        .get_emoji_by_static_url(&emoji.image_static_url)
        .await
        .unwrap()
        .is_some());

    let result = h.cleaner().prune_orphaned(false).await.unwrap();
    assert_eq!(result.pruned, 2);
    assert!(!h.has(&original.key()).await);
    assert!(!h.has(&stat.key()).await);
    assert!(h.has(&kept.image_path).await);
    assert!(h.has(&kept.image_static_path).await);
}

#[tokio::test]
async fn fix_cache_states_repairs_both_directions() {
    let h = Harness::new();
    let account = new_id();

    let missing = h.stored_attachment(account, MediaKind::Attachment, Utc::now()).await;
    h.storage.delete(&missing.file.path).await.unwrap();

    let mut lingering = h.stored_attachment(account, MediaKind::Attachment, Utc::now()).await;
    lingering.cached = false;
    h.repo.update_attachment(&lingering).await.unwrap();

    let healthy = h.stored_attachment(account, MediaKind::Attachment, Utc::now()).await;

    let cleaner = h.cleaner();
    let dry = cleaner.fix_cache_states(true).await.unwrap();
    assert_eq!(dry.pruned, 2);
    assert!(h.has(&lingering.file.path).await);

    let fixed = cleaner.fix_cache_states(false).await.unwrap();
    assert_eq!(fixed.pruned, 2);

    let row = h.repo.get_attachment(missing.id).await.unwrap().unwrap();
    assert!(!row.cached);
    assert!(!h.has(&missing.thumbnail.path).await);
    assert!(!h.has(&lingering.file.path).await);
    assert!(h.has(&healthy.file.path).await);

    assert_eq!(cleaner.fix_cache_states(false).await.unwrap().pruned, 0);
}

#[tokio::test]
async fn stale_remote_emoji_are_uncached() {
    let h = Harness::new();
    let stale = h.stored_emoji(new_id(), Utc::now() - Duration::days(30)).await;
    let fresh = h.stored_emoji(new_id(), Utc::now()).await;

    let cleaner = h.cleaner();
    let first = cleaner.uncache_remote_emoji(7, false).await.unwrap();
    assert_eq!(first.pruned, 1);

    let row = h.repo.get_emoji(stale.id).await.unwrap().unwrap();
    assert!(!row.cached);
    assert!(!h.has(&stale.image_path).await);
    assert!(h.has(&fresh.image_static_path).await);

    assert_eq!(cleaner.uncache_remote_emoji(7, false).await.unwrap().pruned, 0);
}

#[tokio::test]
async fn prune_all_reports_every_sweep() {
    let h = Harness::new();
    h.stored_attachment(new_id(), MediaKind::Attachment, Utc::now() - Duration::days(4))
        .await;
    h.stored_attachment(new_id(), MediaKind::Avatar, Utc::now()).await;
    let orphan = StoragePath::new(new_id(), MediaKind::Header, SizeClass::Small, new_id(), "webp").key();
    h.storage.put(&orphan, Bytes::from_static(b"x")).await.unwrap();

    let cleaner = h.cleaner();
    let dry = cleaner.prune_all(7, true, true).await.unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.unused_local, 1);
    assert_eq!(dry.unused_remote, 1);
    assert_eq!(dry.orphaned, 1);
    assert_eq!(h.repo.attachment_count(), 2);

    let report = cleaner.prune_all(7, false, true).await.unwrap();
    assert_eq!(report.unused_local, 1);
    assert_eq!(report.unused_remote, 1);
    assert_eq!(report.orphaned, 1);
    assert_eq!(report.total(), 3);
    assert!(report.errors.is_empty(), "{}", report.errors);
    assert!(h.storage.is_empty());

    let again = cleaner.prune_all(7, false, true).await.unwrap();
    assert_eq!(again.total(), 0);
}

#[tokio::test]
async fn prune_all_in_background_returns_immediately() {
    let h = Harness::new();
    let orphan = StoragePath::new(new_id(), MediaKind::Attachment, SizeClass::Original, new_id(), "jpg").key();
    h.storage.put(&orphan, Bytes::from_static(b"x")).await.unwrap();

    assert!(h.cleaner().prune_all(7, false, false).await.is_none());

    for _ in 0..50 {
        if h.storage.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn sweeps_parse_from_cli_names() {
    for sweep in Sweep::ALL {
        assert_eq!(sweep.as_str().parse::<Sweep>().unwrap(), sweep);
    }
    assert!("everything".parse::<Sweep>().is_err());
}
