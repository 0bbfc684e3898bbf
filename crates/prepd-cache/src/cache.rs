//! Disk-backed expiring cache
//!
//! Stores one JSON file per fingerprint so that individual corruption cannot
//! cascade. All failure modes on the read path degrade to a miss, and
//! failure to persist degrades to in-memory-only operation; callers never
//! see an error from `get` or `put`.

use crate::entry::CacheEntry;
use crate::fingerprint::Fingerprint;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Read-only cache statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Number of stored entries (including not-yet-evicted expired ones)
    pub count: u64,
    /// Approximate storage size of stored entries
    pub size_bytes: u64,
    /// Lookups served from the cache since process start
    pub hits: u64,
    /// Lookups that fell through since process start
    pub misses: u64,
    /// Accumulated `cost_estimate` of every hit; advisory telemetry only
    pub estimated_savings: f64,
}

/// Key/value store with per-entry time-to-live
///
/// Concurrent: reads and writes to a given key are atomic at the single-key
/// level; no lock is held across keys.
#[derive(Debug)]
pub struct ExpiringCache {
    /// Backing directory; `None` means memory-only operation
    dir: Option<PathBuf>,
    entries: DashMap<Fingerprint, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    savings: Mutex<f64>,
}

impl ExpiringCache {
    /// Open a disk-backed cache rooted at `dir`
    ///
    /// If the directory cannot be created the cache degrades to memory-only
    /// with a logged warning; it never fails to open.
    #[must_use]
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let dir = match fs::create_dir_all(&dir) {
            Ok(()) => Some(dir),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "cache directory unavailable, running memory-only");
                None
            }
        };
        Self {
            dir,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            savings: Mutex::new(0.0),
        }
    }

    /// Create a memory-only cache (no disk I/O)
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            savings: Mutex::new(0.0),
        }
    }

    /// Look up a value
    ///
    /// Returns the stored value if present and unexpired; `None` otherwise.
    /// A hit accumulates the entry's `cost_estimate` into
    /// `estimated_savings`; a miss has no side effect beyond the counter and
    /// lazy eviction of whatever expired entry was observed.
    pub fn get(&self, key: &Fingerprint) -> Option<serde_json::Value> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                self.remove_file(key);
                self.record_miss();
                return None;
            }
            let value = entry.value.clone();
            let cost = entry.cost_estimate;
            drop(entry);
            self.record_hit(cost);
            return Some(value);
        }

        // Not in memory: the entry may have been written by an earlier
        // process. Load lazily from disk.
        match self.load_from_disk(key) {
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                let cost = entry.cost_estimate;
                self.entries.insert(*key, entry);
                self.record_hit(cost);
                Some(value)
            }
            Some(_) => {
                self.remove_file(key);
                self.record_miss();
                None
            }
            None => {
                self.record_miss();
                None
            }
        }
    }

    /// Store or overwrite a value
    ///
    /// Always succeeds: a disk-write failure degrades the entry to
    /// in-memory-only with a logged warning.
    pub fn put(
        &self,
        key: &Fingerprint,
        category: &str,
        value: serde_json::Value,
        ttl_seconds: u64,
        cost_estimate: f64,
    ) {
        let entry = CacheEntry::new(category, value, ttl_seconds, cost_estimate);
        self.persist(key, &entry);
        self.entries.insert(*key, entry);
    }

    /// Statistics snapshot
    ///
    /// When disk-backed, `count` and `size_bytes` reflect the backing
    /// directory (the durable truth); memory-only caches report the live
    /// map.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (count, size_bytes) = match &self.dir {
            Some(dir) => scan_dir(dir),
            None => {
                let count = self.entries.len() as u64;
                let size = self.entries.iter().map(|e| e.approx_size_bytes()).sum();
                (count, size)
            }
        };
        CacheStats {
            count,
            size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            estimated_savings: *self.savings.lock(),
        }
    }

    /// Remove every entry; returns the number removed
    pub fn clear_all(&self) -> usize {
        self.clear_where(|_| true)
    }

    /// Remove entries whose category matches the predicate; returns the
    /// number removed
    pub fn clear_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut removed: HashSet<Fingerprint> = HashSet::new();

        let matching: Vec<Fingerprint> = self
            .entries
            .iter()
            .filter(|e| predicate(&e.category))
            .map(|e| *e.key())
            .collect();
        for key in matching {
            self.entries.remove(&key);
            self.remove_file(&key);
            removed.insert(key);
        }

        // Disk files never loaded into memory, plus unreadable leftovers.
        if let Some(dir) = &self.dir {
            for (key, entry) in read_dir_entries(dir) {
                if removed.contains(&key) {
                    continue;
                }
                match entry {
                    Some(entry) if !predicate(&entry.category) => {}
                    _ => {
                        self.remove_file(&key);
                        removed.insert(key);
                    }
                }
            }
        }

        let count = removed.len();
        tracing::debug!(count, "cleared cache entries");
        count
    }

    fn record_hit(&self, cost: f64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        *self.savings.lock() += cost;
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn entry_path(&self, key: &Fingerprint) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{key}.json")))
    }

    fn persist(&self, key: &Fingerprint, entry: &CacheEntry) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        let bytes = match serde_json::to_vec_pretty(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache entry not serializable, keeping in-memory only");
                return;
            }
        };
        if let Err(e) = fs::write(&path, bytes) {
            tracing::warn!(path = %path.display(), error = %e, "cache write failed, keeping in-memory only");
        }
    }

    fn load_from_disk(&self, key: &Fingerprint) -> Option<CacheEntry> {
        let path = self.entry_path(key)?;
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupted cache entry, treating as miss");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn remove_file(&self, key: &Fingerprint) {
        if let Some(path) = self.entry_path(key) {
            let _ = fs::remove_file(path);
        }
    }
}

/// Count entry files and sum their sizes
fn scan_dir(dir: &Path) -> (u64, u64) {
    let Ok(read) = fs::read_dir(dir) else {
        return (0, 0);
    };
    let mut count = 0;
    let mut size = 0;
    for entry in read.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            count += 1;
            size += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    (count, size)
}

/// List entry files keyed by fingerprint; unreadable entries yield `None`
fn read_dir_entries(dir: &Path) -> Vec<(Fingerprint, Option<CacheEntry>)> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    read.flatten()
        .filter_map(|e| {
            let path = e.path();
            let stem = path.file_stem()?.to_str()?;
            let key: Fingerprint = stem.parse().ok()?;
            let entry = fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok());
            Some((key, entry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(q: &str) -> Fingerprint {
        Fingerprint::new("company", &[q])
    }

    #[test]
    fn miss_then_hit() {
        let cache = ExpiringCache::in_memory();
        let k = key("acme");

        assert_eq!(cache.get(&k), None);
        cache.put(&k, "company", json!({"findings": ["x"]}), 3600, 0.02);
        assert_eq!(cache.get(&k), Some(json!({"findings": ["x"]})));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn expired_entry_is_a_miss_and_evicted() {
        let cache = ExpiringCache::in_memory();
        let k = key("acme");

        cache.put(&k, "company", json!("v"), 0, 0.0);
        assert_eq!(cache.get(&k), None);
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn savings_accumulate_on_hits_only() {
        let cache = ExpiringCache::in_memory();
        let k = key("acme");

        cache.put(&k, "company", json!("v"), 3600, 0.05);
        cache.get(&k);
        cache.get(&k);
        cache.get(&key("other"));

        let stats = cache.stats();
        assert!((stats.estimated_savings - 0.10).abs() < 1e-9);
    }

    #[test]
    fn overwrite_replaces_value() {
        let cache = ExpiringCache::in_memory();
        let k = key("acme");

        cache.put(&k, "company", json!("old"), 3600, 0.0);
        cache.put(&k, "company", json!("new"), 3600, 0.0);
        assert_eq!(cache.get(&k), Some(json!("new")));
    }

    #[test]
    fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("acme");

        let cache = ExpiringCache::open(dir.path());
        cache.put(&k, "company", json!("v"), 3600, 0.01);
        drop(cache);

        let cache = ExpiringCache::open(dir.path());
        assert_eq!(cache.get(&k), Some(json!("v")));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn corrupted_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("acme");

        let cache = ExpiringCache::open(dir.path());
        cache.put(&k, "company", json!("v"), 3600, 0.0);
        drop(cache);

        fs::write(dir.path().join(format!("{k}.json")), b"{ not json").unwrap();

        let cache = ExpiringCache::open(dir.path());
        assert_eq!(cache.get(&k), None);
        // The unreadable file was evicted.
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn clear_by_category() {
        let cache = ExpiringCache::in_memory();
        cache.put(&key("a"), "company", json!("v"), 3600, 0.0);
        cache.put(&Fingerprint::new("role", &["b"]), "role", json!("v"), 3600, 0.0);

        let removed = cache.clear_where(|category| category == "company");
        assert_eq!(removed, 1);
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(
            cache.get(&Fingerprint::new("role", &["b"])),
            Some(json!("v"))
        );
    }

    #[test]
    fn clear_all_includes_disk_only_entries() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("acme");

        let cache = ExpiringCache::open(dir.path());
        cache.put(&k, "company", json!("v"), 3600, 0.0);
        drop(cache);

        // A fresh instance has nothing in memory yet.
        let cache = ExpiringCache::open(dir.path());
        assert_eq!(cache.clear_all(), 1);
        assert_eq!(cache.get(&k), None);
    }

    #[test]
    fn stats_reflect_disk_contents() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExpiringCache::open(dir.path());

        cache.put(&key("a"), "company", json!("v"), 3600, 0.0);
        cache.put(&key("b"), "company", json!("v"), 3600, 0.0);

        let stats = cache.stats();
        assert_eq!(stats.count, 2);
        assert!(stats.size_bytes > 0);
    }
}
