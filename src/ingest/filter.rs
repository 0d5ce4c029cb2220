// src/ingest/filter.rs
//! Recency window and identity-based dedup.

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};

use crate::ingest::seen::SeenSet;
use crate::ingest::types::RawEntry;

/// Oldest timestamp still considered recent. Entries exactly at the cutoff
/// are kept.
pub fn cutoff(now: DateTime<Utc>, recent_days: i64) -> DateTime<Utc> {
    TimeDelta::try_days(recent_days)
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// published → updated → `now`. An undated entry counts as just seen.
pub fn resolve_timestamp(entry: &RawEntry, now: DateTime<Utc>) -> DateTime<Utc> {
    entry.published.or(entry.updated).unwrap_or(now)
}

/// Hex SHA-256 over `(id | link | "") + (title | "")`; empty strings count
/// as missing. Only identity fields take part, so summary edits never
/// change an item's identifier.
pub fn item_id(entry: &RawEntry) -> String {
    let key = non_blank(entry.id.as_deref())
        .or_else(|| non_blank(entry.link.as_deref()))
        .unwrap_or_default();
    let title = non_blank(entry.title.as_deref()).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(title.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    /// Older than the cutoff.
    Stale,
    /// Emitted by an earlier run.
    Seen,
    /// Already accepted earlier in this run (same item in several feeds).
    Duplicate,
}

/// Filter state for one run: the persisted set stays read-only, accepted
/// identifiers accumulate separately.
#[derive(Debug)]
pub struct RecencyDedupFilter<'a> {
    cutoff: DateTime<Utc>,
    seen: &'a SeenSet,
    accepted: HashSet<String>,
}

impl<'a> RecencyDedupFilter<'a> {
    pub fn new(cutoff: DateTime<Utc>, seen: &'a SeenSet) -> Self {
        Self {
            cutoff,
            seen,
            accepted: HashSet::new(),
        }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Judge one entry; a `Keep` verdict records `id` as accepted.
    pub fn check(&mut self, id: &str, published: DateTime<Utc>) -> Verdict {
        if published < self.cutoff {
            return Verdict::Stale;
        }
        if self.seen.contains(id) {
            return Verdict::Seen;
        }
        if !self.accepted.insert(id.to_string()) {
            return Verdict::Duplicate;
        }
        Verdict::Keep
    }
}
