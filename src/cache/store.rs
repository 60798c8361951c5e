use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{CacheCoordinate, CacheEntry, CacheKey};
use crate::error::Result;

/// Key-value storage behind the result cache.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Stores `entry` unless `key` is taken; returns the entry already there.
    fn insert_if_absent(&self, key: CacheKey, entry: CacheEntry) -> Option<CacheEntry>;

    /// Every entry under `coordinate`.
    fn entries(&self, coordinate: &CacheCoordinate) -> Vec<(CacheKey, CacheEntry)>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<(CacheKey, CacheEntry)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Writes every entry to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut entries: Vec<(CacheKey, CacheEntry)> = self
            .entries
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &Snapshot { entries })?;
        writer.flush()?;
        info!("saved {} cache entries to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        info!(
            "loaded {} cache entries from {}",
            snapshot.entries.len(),
            path.display()
        );
        Ok(Self {
            entries: RwLock::new(snapshot.entries.into_iter().collect()),
        })
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    fn insert_if_absent(&self, key: CacheKey, entry: CacheEntry) -> Option<CacheEntry> {
        let mut entries = self.entries.write();
        match entries.get(&key) {
            Some(existing) => Some(existing.clone()),
            None => {
                entries.insert(key, entry);
                None
            }
        }
    }

    fn entries(&self, coordinate: &CacheCoordinate) -> Vec<(CacheKey, CacheEntry)> {
        self.entries
            .read()
            .iter()
            .filter(|(k, _)| &k.coordinate == coordinate)
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect()
    }
}
