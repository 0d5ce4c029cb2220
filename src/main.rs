//! feed-harvester binary entrypoint.
//! Runs one collection over the configured feeds and writes the dated
//! snapshot consumed by the newsletter generation stage.
//!
//! Exit status: 0 with the snapshot path on stdout; 2 when nothing new was
//! found (downstream generation should be skipped); 1 on fatal errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use feed_harvester::ingest::sources::{load_sources_default, load_sources_from};
use feed_harvester::ingest::{Collector, DryRunStore, FileSeenStore, HttpFetcher};
use feed_harvester::telemetry::{init_tracing, MetricsTextfile};
use feed_harvester::{snapshot, HarvestConfig};

const EXIT_NOTHING_NEW: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "feed-harvester", version, about = "Collect new, recent feed items for the newsletter")]
struct Cli {
    /// Feed sources file (TOML or JSON). Defaults to $SOURCES_PATH, then config/sources.{toml,json}.
    #[arg(long, value_name = "PATH")]
    sources: Option<PathBuf>,

    /// Directory for the dated snapshot. Defaults to $SNAPSHOT_DIR or ./data.
    #[arg(long, value_name = "DIR")]
    snapshot_dir: Option<PathBuf>,

    /// Print items as JSON on stdout instead of writing a snapshot file.
    #[arg(long)]
    no_snapshot: bool,

    /// Do not update the seen-state file.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "harvest failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let metrics = MetricsTextfile::from_env()?;
    let cfg = HarvestConfig::from_env();

    let sources = match &cli.sources {
        Some(p) => load_sources_from(p)?,
        None => load_sources_default()?,
    };
    tracing::info!(
        feeds = sources.feed_count(),
        state = %cfg.state_file.display(),
        max_items = cfg.collector.max_items,
        recent_days = cfg.collector.recent_days,
        dry_run = cli.dry_run,
        "starting harvest"
    );

    let fetcher = HttpFetcher::new(&cfg.fetch).context("building HTTP client")?;
    let store = FileSeenStore::new(&cfg.state_file);
    let harvest = if cli.dry_run {
        Collector::new(fetcher, DryRunStore(store), cfg.collector.clone())
            .run(&sources)
            .await?
    } else {
        Collector::new(fetcher, store, cfg.collector.clone())
            .run(&sources)
            .await?
    };

    if let Some(m) = &metrics {
        if let Err(e) = m.write() {
            tracing::warn!(error = %format!("{e:#}"), "metrics textfile not written");
        }
    }

    if harvest.is_empty() {
        tracing::warn!(
            feeds = harvest.stats.feeds_total,
            failed = harvest.stats.feeds_failed,
            "no new recent items; skipping snapshot"
        );
        return Ok(ExitCode::from(EXIT_NOTHING_NEW));
    }

    if cli.no_snapshot {
        println!("{}", serde_json::to_string_pretty(&harvest.items)?);
    } else {
        let dir = cli.snapshot_dir.unwrap_or(cfg.snapshot_dir);
        let today = chrono::Utc::now().date_naive();
        let path = snapshot::write_snapshot(&dir, today, &harvest.items)?;
        println!("{}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}
