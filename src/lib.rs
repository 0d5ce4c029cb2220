// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod ingest;
pub mod snapshot;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::HarvestConfig;
pub use crate::ingest::{
    CandidateItem, Collector, FeedSources, FileSeenStore, Harvest, HttpFetcher,
};

use anyhow::{Context, Result};

/// Run one harvest with production wiring: HTTP fetcher and file-backed
/// seen-state, both configured from `cfg`.
///
/// ```no_run
/// # async fn demo() -> anyhow::Result<()> {
/// let cfg = feed_harvester::HarvestConfig::from_env();
/// let sources = feed_harvester::ingest::sources::load_sources_default()?;
/// let harvest = feed_harvester::harvest(&cfg, &sources).await?;
/// if harvest.is_empty() {
///     tracing::warn!("nothing new this time");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn harvest(cfg: &HarvestConfig, sources: &FeedSources) -> Result<Harvest> {
    let fetcher = HttpFetcher::new(&cfg.fetch).context("building HTTP client")?;
    let store = FileSeenStore::new(&cfg.state_file);
    Collector::new(fetcher, store, cfg.collector.clone())
        .run(sources)
        .await
}
