//! Memoized dataset loads, keyed by source path.
//!
//! A cached entry is reused until the file's fingerprint (modification
//! time and length) changes. The cache is single-owner; callers hold it
//! behind `&mut` and no locking is involved.

use crate::{
    config::ContinentMap,
    dataset::Dataset,
    error::AnalyticsResult,
    loader::load_dataset_file,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len:      u64,
}

impl Fingerprint {
    fn of(path: &Path) -> AnalyticsResult<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            modified: meta.modified().ok(),
            len:      meta.len(),
        })
    }
}

#[derive(Debug)]
struct CachedDataset {
    fingerprint: Fingerprint,
    dataset:     Arc<Dataset>,
}

#[derive(Debug, Default)]
pub struct DatasetCache {
    continents: ContinentMap,
    entries:    HashMap<PathBuf, CachedDataset>,
    loads:      u64,
}

impl DatasetCache {
    pub fn new(continents: ContinentMap) -> Self {
        Self {
            continents,
            entries: HashMap::new(),
            loads: 0,
        }
    }

    /// Return the dataset for `path`, reading the file only when it is
    /// not cached or has changed since it was cached.
    pub fn get_or_load(&mut self, path: &Path) -> AnalyticsResult<Arc<Dataset>> {
        let key = std::fs::canonicalize(path)?;
        let fingerprint = Fingerprint::of(&key)?;

        if let Some(entry) = self.entries.get(&key) {
            if entry.fingerprint == fingerprint {
                log::debug!("Dataset cache hit for {}", key.display());
                return Ok(Arc::clone(&entry.dataset));
            }
            log::info!("Source {} changed; reloading", key.display());
        }

        let dataset = Arc::new(load_dataset_file(&key, &self.continents)?);
        self.loads += 1;
        self.entries.insert(key, CachedDataset {
            fingerprint,
            dataset: Arc::clone(&dataset),
        });
        Ok(dataset)
    }

    /// Drop the entry for `path`, if any. Returns whether one existed.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.entries.remove(&key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of file reads performed so far.
    pub fn load_count(&self) -> u64 {
        self.loads
    }
}
