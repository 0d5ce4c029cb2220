// src/ingest/mod.rs
pub mod collector;
pub mod fetch;
pub mod filter;
pub mod parse;
pub mod seen;
pub mod sources;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

pub use collector::{Collector, CollectorConfig};
pub use fetch::{FeedFetcher, FetchConfig, FetchError, HttpFetcher, Pause, RetryPolicy, TokioPause};
pub use seen::{DryRunStore, FileSeenStore, MemorySeenStore, Retention, SeenSet, SeenStore};
pub use sources::FeedSources;
pub use types::{CandidateItem, Harvest, HarvestStats, RawEntry};

/// One-time metrics registration (so series carry descriptions once a
/// recorder is installed).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("harvest_feeds_total", "Feed URLs processed.");
        describe_counter!(
            "harvest_feed_errors_total",
            "Feeds that could not be fetched or parsed."
        );
        describe_counter!("harvest_entries_total", "Entries considered after the per-feed cap.");
        describe_counter!(
            "harvest_skipped_stale_total",
            "Entries older than the recency window."
        );
        describe_counter!(
            "harvest_skipped_seen_total",
            "Entries dropped as already emitted (earlier run or same run)."
        );
        describe_counter!("harvest_kept_total", "Items returned downstream.");
        describe_counter!("harvest_fetch_retries_total", "HTTP retries performed.");
        describe_histogram!("harvest_fetch_ms", "Feed fetch time in milliseconds, retries included.");
        describe_gauge!("harvest_last_run_ts", "Unix ts of the last finished harvest.");
    });
}

/// Plain-text form of a feed field: entities decoded, tags stripped,
/// whitespace collapsed, trimmed.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();

    // 1) Strip tags first, so escaped markup in text survives as text
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)<[^>]*>").expect("static regex"));
    let out = re_tags.replace_all(s, " ");

    // 2) HTML entity decode
    let out = html_escape::decode_html_entities(&out);

    // 3) Collapse whitespace (NBSP included)
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").expect("static regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Keep at most `max` chars, ending in "…" when something was cut.
pub fn clip_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}
