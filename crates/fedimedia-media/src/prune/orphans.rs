//! Orphan sweep: blobs of our key shape with no row behind them.

use fedimedia_core::{MediaError, MediaKind, SizeClass, StoragePath};
use std::time::Instant;

use super::{log_summary, Cleaner, Sweep, SweepResult};

impl Cleaner {
    /// Walk every managed key and delete (or, dry, count) those whose row is
    /// gone. Keys of any other shape are left alone.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "orphaned"))]
    pub async fn prune_orphaned(&self, dry_run: bool) -> Result<SweepResult, MediaError> {
        let start = Instant::now();
        let mut result = SweepResult::default();
        let keys = self.storage.walk_keys(&StoragePath::matches).await?;

        for key in keys {
            let Some(path) = StoragePath::parse(&key) else {
                continue;
            };

            match self.has_owner(&path).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, key = %key, "Failed to look up owner of blob");
                    result.record(&format!("orphan check {key}"), e);
                    continue;
                }
            }

            tracing::debug!(key = %key, dry_run, "Found orphaned blob");
            if dry_run {
                result.pruned += 1;
                continue;
            }
            match self.storage.delete(&key).await {
                Ok(()) => result.pruned += 1,
                Err(e) if e.is_not_found() => result.pruned += 1,
                Err(e) => {
                    tracing::error!(error = %e, key = %key, "Failed to delete orphaned blob");
                    result.record(&format!("orphan delete {key}"), e);
                }
            }
        }

        log_summary(Sweep::Orphaned, dry_run, &result, start);
        Ok(result)
    }

    /// Attachments are looked up by id. Emoji are looked up by their static
    /// URL, since a refreshed emoji's current path id differs from its row id.
    async fn has_owner(&self, path: &StoragePath) -> Result<bool, MediaError> {
        match path.kind {
            // Emoji blobs only ever live under the instance account.
            MediaKind::Emoji if path.owner_id != self.config.instance_account_id => Ok(false),
            MediaKind::Emoji => {
                let static_url = StoragePath::new(
                    path.owner_id,
                    MediaKind::Emoji,
                    SizeClass::Static,
                    path.media_id,
                    "png",
                )
                .url(&self.config.url_base);
                Ok(self.repo.get_emoji_by_static_url(&static_url).await?.is_some())
            }
            MediaKind::Attachment | MediaKind::Avatar | MediaKind::Header => {
                Ok(self.repo.get_attachment(path.media_id).await?.is_some())
            }
        }
    }
}
