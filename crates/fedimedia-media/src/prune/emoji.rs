//! Emoji sweeps. Local emoji are never uncached.

use chrono::{Duration, Utc};
use fedimedia_core::{Emoji, MediaError};
use std::time::Instant;

use super::{log_summary, Cleaner, Sweep, SweepResult};

impl Cleaner {
    /// Cached remote emoji not refreshed for `days`: blobs are deleted and
    /// the row is kept with `cached` cleared.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "uncache_remote_emoji"))]
    pub async fn uncache_remote_emoji(&self, days: u32, dry_run: bool) -> Result<SweepResult, MediaError> {
        let start = Instant::now();
        let mut cursor = Utc::now() - Duration::days(i64::from(days));
        let mut result = SweepResult::default();

        loop {
            let page = self
                .repo
                .get_cached_emojis_older_than(cursor, self.page_size())
                .await?;
            let Some(last) = page.last() else { break };
            cursor = last.updated_at;

            for emoji in page {
                if dry_run {
                    result.pruned += 1;
                    continue;
                }
                let id = emoji.id;
                match self.uncache_emoji(emoji).await {
                    Ok(()) => result.pruned += 1,
                    Err(e) => {
                        tracing::error!(error = %e, emoji_id = %id, "Failed to uncache remote emoji");
                        result.record(&format!("uncache emoji {id}"), e);
                    }
                }
            }
        }

        log_summary(Sweep::UncacheRemoteEmoji, dry_run, &result, start);
        Ok(result)
    }

    /// Cache-state repair for remote emoji, folded into `fix_cache_states`.
    pub(super) async fn fix_emoji_cache_states(
        &self,
        dry_run: bool,
        result: &mut SweepResult,
    ) -> Result<(), MediaError> {
        let mut max_id = None;
        loop {
            let page = self.repo.get_remote_emojis(max_id, self.page_size()).await?;
            let Some(last) = page.last() else { break };
            max_id = Some(last.id);

            for emoji in page {
                let id = emoji.id;
                match self.fix_emoji_cache(emoji, dry_run).await {
                    Ok(true) => result.pruned += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(error = %e, emoji_id = %id, "Failed to fix emoji cache state");
                        result.record(&format!("fix emoji cache state {id}"), e);
                    }
                }
            }
        }
        Ok(())
    }

    async fn fix_emoji_cache(&self, emoji: Emoji, dry_run: bool) -> Result<bool, MediaError> {
        let paths = emoji.blob_paths();
        if paths.is_empty() {
            return Ok(false);
        }
        let (present, missing) = self.blob_presence(&paths).await?;

        if emoji.cached && !missing.is_empty() {
            tracing::debug!(emoji_id = %emoji.id, missing = ?missing, "Cached emoji is missing blobs");
            if !dry_run {
                self.uncache_emoji(emoji).await?;
            }
            return Ok(true);
        }
        if !emoji.cached && !present.is_empty() {
            tracing::debug!(emoji_id = %emoji.id, present = ?present, "Uncached emoji still has blobs");
            if !dry_run {
                self.delete_blobs(&present).await?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    async fn uncache_emoji(&self, mut emoji: Emoji) -> Result<(), MediaError> {
        self.delete_blobs(&emoji.blob_paths()).await?;
        emoji.cached = false;
        match self.repo.update_emoji(&emoji).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(emoji_id = %emoji.id, shortcode = %emoji.shortcode, "Uncached emoji");
        Ok(())
    }
}
