//! Dated JSON snapshots of a harvest, for reuse by later stages.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::CandidateItem;

/// `collected_YYYYMMDD.json`
pub fn snapshot_file_name(date: NaiveDate) -> String {
    format!("collected_{}.json", date.format("%Y%m%d"))
}

/// Write `items` as pretty JSON under `dir`, replacing a snapshot from the
/// same day.
pub fn write_snapshot(dir: &Path, date: NaiveDate, items: &[CandidateItem]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating snapshot dir {}", dir.display()))?;
    let path = dir.join(snapshot_file_name(date));
    let mut body = serde_json::to_vec_pretty(items).context("serializing snapshot")?;
    body.push(b'\n');
    fs::write(&path, body).with_context(|| format!("writing snapshot {}", path.display()))?;
    tracing::info!(path = %path.display(), items = items.len(), "snapshot written");
    Ok(path)
}

pub fn read_snapshot(path: &Path) -> Result<Vec<CandidateItem>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing snapshot {}", path.display()))
}
