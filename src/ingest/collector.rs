// src/ingest/collector.rs
//! One collection run: fetch → parse → filter every configured feed, then
//! sort, truncate and record what was handed downstream.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};

use crate::ingest::fetch::FeedFetcher;
use crate::ingest::filter::{self, RecencyDedupFilter, Verdict};
use crate::ingest::parse::parse_entries;
use crate::ingest::seen::{Retention, SeenSet, SeenStore, StoreError};
use crate::ingest::sources::FeedSources;
use crate::ingest::types::{CandidateItem, Harvest, HarvestStats, RawEntry};
use crate::ingest::{clip_chars, ensure_metrics_described, normalize_text};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Cap on items returned per run.
    pub max_items: usize,
    /// Recency window in days.
    pub recent_days: i64,
    /// Only the first N entries of each feed are considered.
    pub max_entries_per_feed: usize,
    pub summary_max_chars: usize,
    pub retention: Retention,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_items: 12,
            recent_days: 45,
            max_entries_per_feed: 50,
            summary_max_chars: 1500,
            retention: Retention::Unbounded,
        }
    }
}

pub struct Collector<F, S> {
    fetcher: F,
    store: S,
    config: CollectorConfig,
}

impl<F, S> Collector<F, S>
where
    F: FeedFetcher,
    S: SeenStore,
{
    pub fn new(fetcher: F, store: S, config: CollectorConfig) -> Self {
        Self {
            fetcher,
            store,
            config,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub async fn run(&self, sources: &FeedSources) -> Result<Harvest> {
        self.run_at(sources, Utc::now()).await
    }

    /// Run against an explicit clock.
    ///
    /// Only the returned (post-truncation) items are added to the seen-set;
    /// items cut by `max_items` stay eligible for the next run. Feed-level
    /// failures are logged and skipped. Errors are returned only when the
    /// seen-state cannot be read or written.
    pub async fn run_at(&self, sources: &FeedSources, now: DateTime<Utc>) -> Result<Harvest> {
        ensure_metrics_described();

        let cutoff = filter::cutoff(now, self.config.recent_days);
        let mut seen = self.load_seen()?;
        let mut stats = HarvestStats::default();
        let mut picked: Vec<CandidateItem> = Vec::new();

        {
            let mut window = RecencyDedupFilter::new(cutoff, &seen);
            for (category, url) in sources.iter() {
                stats.feeds_total += 1;
                counter!("harvest_feeds_total").increment(1);

                let Some(entries) = self.fetch_entries(category, url).await else {
                    stats.feeds_failed += 1;
                    counter!("harvest_feed_errors_total").increment(1);
                    continue;
                };

                for raw in entries.into_iter().take(self.config.max_entries_per_feed) {
                    stats.entries_seen += 1;
                    let published = filter::resolve_timestamp(&raw, now);
                    let id = filter::item_id(&raw);
                    match window.check(&id, published) {
                        Verdict::Keep => {
                            picked.push(self.candidate(id, category, url, raw, published))
                        }
                        Verdict::Stale => stats.skipped_stale += 1,
                        Verdict::Seen => stats.skipped_seen += 1,
                        Verdict::Duplicate => stats.skipped_duplicate += 1,
                    }
                }
            }
        }

        // stable: equal timestamps keep feed order
        picked.sort_by(|a, b| b.published.cmp(&a.published));
        let qualified = picked.len();
        picked.truncate(self.config.max_items);
        stats.truncated = qualified - picked.len();

        let emitted: HashSet<String> = picked.iter().map(|c| c.id.clone()).collect();
        let today = now.date_naive();
        for id in &emitted {
            seen.record(id.as_str(), today);
        }
        let evicted = seen.apply_retention(self.config.retention, &emitted);
        if evicted > 0 {
            tracing::info!(evicted, kept = seen.len(), "seen-state retention applied");
        }
        self.store.save(&seen).context("persisting seen-state")?;

        counter!("harvest_entries_total").increment(stats.entries_seen as u64);
        counter!("harvest_skipped_stale_total").increment(stats.skipped_stale as u64);
        counter!("harvest_skipped_seen_total")
            .increment((stats.skipped_seen + stats.skipped_duplicate) as u64);
        counter!("harvest_kept_total").increment(picked.len() as u64);
        gauge!("harvest_last_run_ts").set(now.timestamp() as f64);

        tracing::info!(
            target: "harvest",
            feeds = stats.feeds_total,
            failed = stats.feeds_failed,
            entries = stats.entries_seen,
            stale = stats.skipped_stale,
            seen = stats.skipped_seen,
            duplicate = stats.skipped_duplicate,
            truncated = stats.truncated,
            kept = picked.len(),
            "harvest finished"
        );

        Ok(Harvest {
            items: picked,
            stats,
        })
    }

    fn load_seen(&self) -> Result<SeenSet> {
        match self.store.load() {
            Ok(seen) => Ok(seen),
            Err(e @ StoreError::Corrupt { .. }) => {
                tracing::warn!(error = %e, "seen-state unreadable, starting from an empty set");
                Ok(SeenSet::new())
            }
            Err(e) => Err(e).context("loading seen-state"),
        }
    }

    /// `None` when the feed could not be fetched or parsed.
    async fn fetch_entries(&self, category: &str, url: &str) -> Option<Vec<RawEntry>> {
        let body = match self.fetcher.fetch(url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(category, url, error = %e, "feed fetch failed, skipping");
                return None;
            }
        };
        match parse_entries(&body) {
            Ok(entries) => {
                tracing::debug!(category, url, entries = entries.len(), "feed parsed");
                Some(entries)
            }
            Err(e) => {
                tracing::warn!(category, url, error = %e, "feed unparseable, skipping");
                None
            }
        }
    }

    /// Title and summary leave as plain text; no feed HTML goes downstream.
    fn candidate(
        &self,
        id: String,
        category: &str,
        url: &str,
        raw: RawEntry,
        published: DateTime<Utc>,
    ) -> CandidateItem {
        let title = normalize_text(raw.title.as_deref().unwrap_or_default());
        let summary = clip_chars(
            &normalize_text(raw.summary.as_deref().unwrap_or_default()),
            self.config.summary_max_chars,
        );
        CandidateItem {
            id,
            category: category.to_string(),
            title,
            summary,
            link: raw.link,
            published,
            source: url.to_string(),
        }
    }
}
