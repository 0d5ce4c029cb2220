// src/config/harvest.rs
//! Run settings resolved from the environment.
//!
//! Every knob has a default; a value that is present but unparseable (or out
//! of range) is reported with a warning and replaced by that default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ingest::collector::CollectorConfig;
use crate::ingest::fetch::FetchConfig;
use crate::ingest::seen::Retention;

// --- env names ---
pub const ENV_MAX_ITEMS: &str = "MAX_ITEMS";
pub const ENV_RECENT_DAYS: &str = "RECENT_DAYS";
pub const ENV_MAX_ENTRIES_PER_FEED: &str = "MAX_ENTRIES_PER_FEED";
pub const ENV_SUMMARY_MAX_CHARS: &str = "SUMMARY_MAX_CHARS";
pub const ENV_HTTP_TIMEOUT: &str = "HTTP_TIMEOUT";
pub const ENV_HTTP_RETRIES: &str = "HTTP_RETRIES";
pub const ENV_HTTP_BACKOFF: &str = "HTTP_BACKOFF";
pub const ENV_HTTP_DELAY: &str = "HTTP_DELAY";
pub const ENV_HTTP_USER_AGENT: &str = "HTTP_USER_AGENT";
pub const ENV_STATE_FILE: &str = "STATE_FILE";
pub const ENV_SEEN_MAX_IDS: &str = "SEEN_MAX_IDS";
pub const ENV_SNAPSHOT_DIR: &str = "SNAPSHOT_DIR";

// --- defaults ---
pub const DEFAULT_STATE_FILE: &str = "state/seen.json";
pub const DEFAULT_SNAPSHOT_DIR: &str = "data";

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub collector: CollectorConfig,
    pub fetch: FetchConfig,
    pub state_file: PathBuf,
    pub snapshot_dir: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            fetch: FetchConfig::default(),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
        }
    }
}

impl HarvestConfig {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary key lookup.
    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let d = Self::default();

        let collector = CollectorConfig {
            max_items: parse_or(&lookup, ENV_MAX_ITEMS, d.collector.max_items, |v| *v > 0),
            recent_days: parse_or(&lookup, ENV_RECENT_DAYS, d.collector.recent_days, |v| {
                *v >= 0
            }),
            max_entries_per_feed: parse_or(
                &lookup,
                ENV_MAX_ENTRIES_PER_FEED,
                d.collector.max_entries_per_feed,
                |v| *v > 0,
            ),
            summary_max_chars: parse_or(
                &lookup,
                ENV_SUMMARY_MAX_CHARS,
                d.collector.summary_max_chars,
                |v| *v > 0,
            ),
            retention: match parse_opt::<usize, _>(&lookup, ENV_SEEN_MAX_IDS, |v| *v > 0) {
                Some(n) => Retention::MaxEntries(n),
                None => Retention::Unbounded,
            },
        };

        let fetch = FetchConfig {
            timeout: secs_or(&lookup, ENV_HTTP_TIMEOUT, d.fetch.timeout, false),
            max_retries: parse_or(&lookup, ENV_HTTP_RETRIES, d.fetch.max_retries, |_| true),
            backoff_factor: parse_or(&lookup, ENV_HTTP_BACKOFF, d.fetch.backoff_factor, |v| {
                v.is_finite() && *v >= 0.0
            }),
            polite_delay: secs_or(&lookup, ENV_HTTP_DELAY, d.fetch.polite_delay, true),
            user_agent: lookup(ENV_HTTP_USER_AGENT)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(d.fetch.user_agent),
        };

        Self {
            collector,
            fetch,
            state_file: path_or(&lookup, ENV_STATE_FILE, d.state_file),
            snapshot_dir: path_or(&lookup, ENV_SNAPSHOT_DIR, d.snapshot_dir),
        }
    }
}

fn parse_opt<T, L>(lookup: &L, key: &str, valid: impl Fn(&T) -> bool) -> Option<T>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<T>() {
        Ok(v) if valid(&v) => Some(v),
        _ => {
            tracing::warn!(key, value = raw, "ignoring invalid setting");
            None
        }
    }
}

fn parse_or<T, L>(lookup: &L, key: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    parse_opt(lookup, key, valid).unwrap_or(default)
}

fn secs_or<L>(lookup: &L, key: &str, default: Duration, allow_zero: bool) -> Duration
where
    L: Fn(&str) -> Option<String>,
{
    parse_opt::<f64, L>(lookup, key, |v| {
        v.is_finite() && (*v > 0.0 || (allow_zero && *v == 0.0))
    })
    .and_then(|v| Duration::try_from_secs_f64(v).ok())
    .unwrap_or(default)
}

fn path_or<L>(lookup: &L, key: &str, default: PathBuf) -> PathBuf
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}
