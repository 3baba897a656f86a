//! Attachment sweeps.

use chrono::{Duration, Utc};
use fedimedia_core::{Account, MediaAttachment, MediaError};
use std::time::Instant;

use super::{log_summary, Cleaner, Sweep, SweepResult};

impl Cleaner {
    /// Local attachments never attached to a post, older than `days`:
    /// blobs and row are deleted.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "unused_local"))]
    pub async fn prune_unused_local(&self, days: u32, dry_run: bool) -> Result<SweepResult, MediaError> {
        let start = Instant::now();
        let older_than = Utc::now() - Duration::days(i64::from(days));
        let mut result = SweepResult::default();
        let mut max_id = None;

        loop {
            let page = self
                .repo
                .get_local_unattached_older_than(older_than, max_id, self.page_size())
                .await?;
            let Some(last) = page.last() else { break };
            max_id = Some(last.id);

            for media in &page {
                if dry_run {
                    result.pruned += 1;
                    continue;
                }
                match self.delete_attachment(media).await {
                    Ok(()) => result.pruned += 1,
                    Err(e) => {
                        tracing::error!(error = %e, media_id = %media.id, "Failed to prune unused local media");
                        result.record(&format!("unused local {}", media.id), e);
                    }
                }
            }
        }

        log_summary(Sweep::UnusedLocal, dry_run, &result, start);
        Ok(result)
    }

    /// Avatars and headers no longer referenced by their account (or whose
    /// account is gone): blobs and row are deleted.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "unused_remote"))]
    pub async fn prune_unused_remote(&self, dry_run: bool) -> Result<SweepResult, MediaError> {
        let start = Instant::now();
        let mut result = SweepResult::default();
        let mut max_id = None;

        loop {
            let page = self
                .repo
                .get_avatars_and_headers(max_id, self.page_size())
                .await?;
            let Some(last) = page.last() else { break };
            max_id = Some(last.id);

            for media in &page {
                let account = match self.repo.get_account(media.account_id).await {
                    Ok(account) => account,
                    Err(e) => {
                        tracing::error!(error = %e, media_id = %media.id, "Failed to load owning account");
                        result.record(&format!("unused remote {}", media.id), e);
                        continue;
                    }
                };
                if in_use(media, account.as_ref()) {
                    continue;
                }

                if dry_run {
                    result.pruned += 1;
                    continue;
                }
                match self.delete_attachment(media).await {
                    Ok(()) => result.pruned += 1,
                    Err(e) => {
                        tracing::error!(error = %e, media_id = %media.id, "Failed to prune unused avatar/header");
                        result.record(&format!("unused remote {}", media.id), e);
                    }
                }
            }
        }

        log_summary(Sweep::UnusedRemote, dry_run, &result, start);
        Ok(result)
    }

    /// Cached remote attachments older than `days`: blobs are deleted, the
    /// row stays with `cached` cleared so it can be recached on demand.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "uncache_remote"))]
    pub async fn uncache_remote(&self, days: u32, dry_run: bool) -> Result<SweepResult, MediaError> {
        let start = Instant::now();
        let older_than = Utc::now() - Duration::days(i64::from(days));
        let mut result = SweepResult::default();

        if dry_run {
            result.pruned = self.repo.count_remote_older_than(older_than).await?;
            log_summary(Sweep::UncacheRemote, dry_run, &result, start);
            return Ok(result);
        }

        let mut cursor = older_than;
        loop {
            let page = self
                .repo
                .get_remote_older_than(cursor, self.page_size())
                .await?;
            let Some(last) = page.last() else { break };
            cursor = last.created_at;

            for media in page {
                let id = media.id;
                match self.uncache_attachment(media).await {
                    Ok(()) => result.pruned += 1,
                    Err(e) => {
                        tracing::error!(error = %e, media_id = %id, "Failed to uncache remote media");
                        result.record(&format!("uncache remote {id}"), e);
                    }
                }
            }
        }

        log_summary(Sweep::UncacheRemote, dry_run, &result, start);
        Ok(result)
    }

    /// Attachment rows whose `cached` flag disagrees with the blob store.
    /// Cached rows with a missing blob are uncached; uncached rows whose
    /// blobs still exist have them deleted. Remote emoji get the same check.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "fix_cache_states"))]
    pub async fn fix_cache_states(&self, dry_run: bool) -> Result<SweepResult, MediaError> {
        let start = Instant::now();
        let mut result = SweepResult::default();
        let mut max_id = None;

        loop {
            let page = self.repo.get_attachments(max_id, self.page_size()).await?;
            let Some(last) = page.last() else { break };
            max_id = Some(last.id);

            for media in page {
                let id = media.id;
                match self.fix_attachment_cache(media, dry_run).await {
                    Ok(true) => result.pruned += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(error = %e, media_id = %id, "Failed to fix media cache state");
                        result.record(&format!("fix cache state {id}"), e);
                    }
                }
            }
        }

        self.fix_emoji_cache_states(dry_run, &mut result).await?;

        log_summary(Sweep::FixCacheStates, dry_run, &result, start);
        Ok(result)
    }

    async fn fix_attachment_cache(&self, media: MediaAttachment, dry_run: bool) -> Result<bool, MediaError> {
        let paths = media.blob_paths();
        if paths.is_empty() {
            return Ok(false);
        }
        let (present, missing) = self.blob_presence(&paths).await?;

        if media.cached && !missing.is_empty() {
            tracing::debug!(media_id = %media.id, missing = ?missing, "Cached media is missing blobs");
            if !dry_run {
                self.uncache_attachment(media).await?;
            }
            return Ok(true);
        }
        if !media.cached && !present.is_empty() {
            tracing::debug!(media_id = %media.id, present = ?present, "Uncached media still has blobs");
            if !dry_run {
                self.delete_blobs(&present).await?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Split `paths` into those present in and absent from storage.
    pub(crate) async fn blob_presence<'p>(
        &self,
        paths: &[&'p str],
    ) -> Result<(Vec<&'p str>, Vec<&'p str>), MediaError> {
        let mut present = Vec::new();
        let mut missing = Vec::new();
        for path in paths {
            if self.storage.has(path).await? {
                present.push(*path);
            } else {
                missing.push(*path);
            }
        }
        Ok((present, missing))
    }

    async fn delete_attachment(&self, media: &MediaAttachment) -> Result<(), MediaError> {
        self.delete_blobs(&media.blob_paths()).await?;
        match self.repo.delete_attachment(media.id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(media_id = %media.id, "Pruned media attachment");
        Ok(())
    }

    async fn uncache_attachment(&self, mut media: MediaAttachment) -> Result<(), MediaError> {
        self.delete_blobs(&media.blob_paths()).await?;
        media.cached = false;
        match self.repo.update_attachment(&media).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(media_id = %media.id, "Uncached media attachment");
        Ok(())
    }
}

/// Whether the owning account still points at this avatar or header.
fn in_use(media: &MediaAttachment, account: Option<&Account>) -> bool {
    let Some(account) = account else {
        return false;
    };
    (media.avatar && account.avatar_media_attachment_id == Some(media.id))
        || (media.header && account.header_media_attachment_id == Some(media.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedimedia_core::new_id;

    #[test]
    fn avatar_in_use_only_when_referenced() {
        let account_id = new_id();
        let mut media = MediaAttachment::placeholder(new_id(), account_id);
        media.avatar = true;

        let mut account = Account::new(account_id);
        assert!(!in_use(&media, Some(&account)));
        assert!(!in_use(&media, None));

        account.avatar_media_attachment_id = Some(media.id);
        assert!(in_use(&media, Some(&account)));

        // Referenced as header but flagged avatar: not a match.
        account.avatar_media_attachment_id = None;
        account.header_media_attachment_id = Some(media.id);
        assert!(!in_use(&media, Some(&account)));
    }
}
