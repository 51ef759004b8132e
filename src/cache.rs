//! Query-keyed result cache, invalidated by source fingerprints.
//!
//! Entries are keyed by a hash of the query parameters and carry the source
//! fingerprints current at write time. An entry is served only while those
//! fingerprints still equal the current ones; stale entries are not deleted,
//! just ignored until overwritten.
//!
//! Storage goes through the [`CacheStore`] trait. [`JsonFileCacheStore`]
//! keeps every entry in one JSON file and rewrites it on each `put`; there is
//! no cross-process lock, so concurrent writers race and the last one wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::fingerprint::{DataSources, Fingerprints};
use crate::models::{StatsQuery, StatsResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprints: Fingerprints,
    pub result: StatsResult,
    pub query: StatsQuery,
    /// RFC 3339 write time; informational only.
    #[serde(default)]
    pub stored_at: Option<String>,
}

/// Cache key: SHA-256 of the `|`-joined query parameters, with `""` for
/// absent ones.
pub fn query_key(query: &StatsQuery) -> String {
    let started = query
        .started_time
        .map(|y| y.to_string())
        .unwrap_or_default();
    let joined = [
        query.school.as_deref().unwrap_or(""),
        query.major.as_deref().unwrap_or(""),
        query.region.as_deref().unwrap_or(""),
        query.education_level.as_deref().unwrap_or(""),
        started.as_str(),
    ]
    .join("|");
    hex::encode(Sha256::digest(joined.as_bytes()))
}

/// Key-value storage for cache entries.
pub trait CacheStore {
    fn get(&self, key: &str) -> Option<CacheEntry>;

    fn put(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Removes every entry. Idempotent.
    fn clear(&self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All entries in one pretty-printed JSON object `{key: entry}`.
///
/// A missing, unreadable or corrupt file reads as an empty cache.
pub struct JsonFileCacheStore {
    path: PathBuf,
}

impl JsonFileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, CacheEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable cache file");
                BTreeMap::new()
            }
        }
    }

    fn save(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;
        Ok(())
    }
}

impl CacheStore for JsonFileCacheStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.load().remove(key)
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let mut entries = self.load();
        entries.insert(key.to_string(), entry);
        self.save(&entries)
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove cache file: {}", self.path.display())),
        }
    }

    fn len(&self) -> usize {
        self.load().len()
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.entries.write().unwrap().insert(key.to_string(), entry);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().unwrap().clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

/// Fingerprint-checked view over a [`CacheStore`].
pub struct StatsCache {
    store: Box<dyn CacheStore>,
    sources: DataSources,
}

impl StatsCache {
    pub fn new(store: Box<dyn CacheStore>, sources: DataSources) -> Self {
        Self { store, sources }
    }

    pub fn sources(&self) -> &DataSources {
        &self.sources
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    pub fn current_fingerprints(&self) -> Fingerprints {
        self.sources.fingerprints()
    }

    /// Stored result for `query`, only if every source fingerprint is
    /// unchanged since it was written.
    pub fn get_cached(&self, query: &StatsQuery) -> Option<StatsResult> {
        let key = query_key(query);
        let current = self.current_fingerprints();
        let entry = self.store.get(&key)?;
        if entry.fingerprints != current {
            tracing::debug!(key = %key, "cache entry is stale");
            return None;
        }
        Some(entry.result)
    }

    pub fn set_cached(&self, query: &StatsQuery, result: &StatsResult) -> Result<()> {
        let key = query_key(query);
        let entry = CacheEntry {
            fingerprints: self.current_fingerprints(),
            result: result.clone(),
            query: query.clone(),
            stored_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.store.put(&key, entry)?;
        tracing::info!(key = %key, "stored stats in cache");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}
