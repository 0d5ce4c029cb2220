// src/ingest/types.rs
use chrono::{DateTime, Utc};

/// One entry as extracted from a feed document. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>, // may carry HTML
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// Normalized, identified item handed to the generation stage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CandidateItem {
    pub id: String,
    pub category: String,
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub published: DateTime<Utc>, // RFC 3339 on the wire
    pub source: String,           // feed URL
}

/// Per-run counters, reported alongside the items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct HarvestStats {
    pub feeds_total: usize,
    pub feeds_failed: usize,
    pub entries_seen: usize,
    pub skipped_stale: usize,
    pub skipped_seen: usize,
    pub skipped_duplicate: usize,
    pub truncated: usize,
}

/// Outcome of one collection run: newest first, at most `max_items` long.
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    pub items: Vec<CandidateItem>,
    pub stats: HarvestStats,
}

impl Harvest {
    /// Zero items means downstream generation should be skipped.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
