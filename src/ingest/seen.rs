// src/ingest/seen.rs
//! Persisted set of identifiers already handed downstream.
//!
//! The on-disk form is a pretty-printed JSON array of strings kept in sorted
//! order, so the state file diffs cleanly between runs. Next to it,
//! `<stem>.ages.json` maps identifiers to the date they were first emitted;
//! retention uses it to evict the oldest entries first. There is no
//! cross-process locking: two overlapping runs on the same file race, and
//! the last writer wins.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("seen-state file {path} is not a JSON array of strings: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("seen-state I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Sorted set of item identifiers, each with its first-seen date when known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenSet(BTreeMap<String, Option<NaiveDate>>);

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    /// Add an identifier of unknown age.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.insert_entry(id.into(), None)
    }

    /// Add an identifier first seen on `date`. An identifier already present
    /// keeps its original date.
    pub fn record(&mut self, id: impl Into<String>, date: NaiveDate) -> bool {
        self.insert_entry(id.into(), Some(date))
    }

    fn insert_entry(&mut self, id: String, date: Option<NaiveDate>) -> bool {
        if self.0.contains_key(&id) {
            return false;
        }
        self.0.insert(id, date);
        true
    }

    pub fn first_seen(&self, id: &str) -> Option<NaiveDate> {
        self.0.get(id).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Identifiers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Identifiers with a known first-seen date, in ascending id order.
    pub fn dated(&self) -> impl Iterator<Item = (&str, NaiveDate)> {
        self.0
            .iter()
            .filter_map(|(id, d)| d.map(|d| (id.as_str(), d)))
    }

    /// Enforce `retention`, never evicting anything in `keep`. The remaining
    /// room goes to the most recently seen identifiers; undated ones count
    /// as oldest, and ties fall back to id order.
    /// Returns how many identifiers were dropped.
    pub fn apply_retention(&mut self, retention: Retention, keep: &HashSet<String>) -> usize {
        let Retention::MaxEntries(cap) = retention else {
            return 0;
        };
        if self.0.len() <= cap {
            return 0;
        }

        let pinned = self.0.keys().filter(|id| keep.contains(*id)).count();
        let room = cap.saturating_sub(pinned);

        let mut older: Vec<(&String, Option<NaiveDate>)> = self
            .0
            .iter()
            .filter(|(id, _)| !keep.contains(*id))
            .map(|(id, d)| (id, *d))
            .collect();
        older.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let evict: Vec<String> = older
            .into_iter()
            .skip(room)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &evict {
            self.0.remove(id);
        }
        evict.len()
    }
}

impl<S: Into<String>> FromIterator<S> for SeenSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<S: Into<String>> Extend<S> for SeenSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}

/// How large the persisted set may grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Retention {
    #[default]
    Unbounded,
    /// Cap on stored identifiers. Identifiers emitted by the current run are
    /// always kept; older ones fill the remaining room, newest first.
    MaxEntries(usize),
}

pub trait SeenStore {
    fn load(&self) -> Result<SeenSet, StoreError>;
    fn save(&self, seen: &SeenSet) -> Result<(), StoreError>;
}

impl<T: SeenStore + ?Sized> SeenStore for &T {
    fn load(&self) -> Result<SeenSet, StoreError> {
        (**self).load()
    }
    fn save(&self, seen: &SeenSet) -> Result<(), StoreError> {
        (**self).save(seen)
    }
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileSeenStore {
    path: PathBuf,
}

impl FileSeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `state/seen.json` → `state/seen.ages.json`
    pub fn ages_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_stem()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "seen".into());
        name.push(".ages.json");
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn tmp_path(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "seen.json".into());
        name.push(".tmp");
        target.with_file_name(name)
    }

    /// First-seen dates. A missing or unreadable ages file only loses age
    /// information, so it never fails the load.
    fn load_ages(&self) -> BTreeMap<String, NaiveDate> {
        let path = self.ages_path();
        let content = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "seen ages unreadable, ignoring");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "seen ages malformed, ignoring");
            BTreeMap::new()
        })
    }

    /// Readers see the old file or the new one, never a partial write.
    fn write_atomic(&self, target: &Path, mut body: Vec<u8>) -> Result<(), StoreError> {
        body.push(b'\n');
        let tmp = Self::tmp_path(target);
        {
            let mut f = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
            f.write_all(&body).map_err(|e| self.io_err(e))?;
            f.sync_all().map_err(|e| self.io_err(e))?;
        }
        fs::rename(&tmp, target).map_err(|e| self.io_err(e))
    }
}

impl SeenStore for FileSeenStore {
    fn load(&self) -> Result<SeenSet, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SeenSet::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        let ids: Vec<String> =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let ages = self.load_ages();
        let mut seen = SeenSet::new();
        for id in ids {
            match ages.get(&id) {
                Some(date) => seen.record(id, *date),
                None => seen.insert(id),
            };
        }
        Ok(seen)
    }

    fn save(&self, seen: &SeenSet) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }

        let ids: Vec<&str> = seen.iter().collect();
        let body =
            serde_json::to_vec_pretty(&ids).map_err(|e| self.io_err(std::io::Error::from(e)))?;
        self.write_atomic(&self.path, body)?;

        let ages: BTreeMap<&str, NaiveDate> = seen.dated().collect();
        let body =
            serde_json::to_vec_pretty(&ages).map_err(|e| self.io_err(std::io::Error::from(e)))?;
        self.write_atomic(&self.ages_path(), body)?;

        tracing::debug!(path = %self.path.display(), ids = seen.len(), "seen-state saved");
        Ok(())
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySeenStore {
    inner: Mutex<SeenSet>,
    saves: Mutex<usize>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Mutex::new(ids.into_iter().collect()),
            saves: Mutex::new(0),
        }
    }

    pub fn with_set(seen: SeenSet) -> Self {
        Self {
            inner: Mutex::new(seen),
            saves: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> SeenSet {
        self.inner.lock().expect("seen mutex poisoned").clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().expect("seen mutex poisoned")
    }
}

impl SeenStore for MemorySeenStore {
    fn load(&self) -> Result<SeenSet, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, seen: &SeenSet) -> Result<(), StoreError> {
        *self.inner.lock().expect("seen mutex poisoned") = seen.clone();
        *self.saves.lock().expect("seen mutex poisoned") += 1;
        Ok(())
    }
}

/// Reads through to `S` but never writes.
#[derive(Debug, Clone)]
pub struct DryRunStore<S>(pub S);

impl<S: SeenStore> SeenStore for DryRunStore<S> {
    fn load(&self) -> Result<SeenSet, StoreError> {
        self.0.load()
    }

    fn save(&self, seen: &SeenSet) -> Result<(), StoreError> {
        tracing::info!(ids = seen.len(), "dry run: seen-state not written");
        Ok(())
    }
}
