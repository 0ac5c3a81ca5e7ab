// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

use crate::cache::context::{CacheFileContext, PathContextPair};
use crate::core::hashing::PathKey;
use crate::core::lru_index::EvictionIndex;
use cache_base::consistency_fault;
use cache_base::error::CacheError;
use chrono::{DateTime, Utc};
use log::{trace, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Metadata of all cached files and their recency order.
///
/// The store owns both the rows and the eviction index and mutates them
/// together, so every stored path has exactly one node in the index.
/// It never touches the disk: callers stat, write and unlink files themselves.
pub struct CacheStore {
    entries: HashSet<PathContextPair>,
    index: EvictionIndex,
    total_bytes: u64,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        CacheStore {
            entries: HashSet::new(),
            index: EvictionIndex::new(),
            total_bytes: 0,
        }
    }

    /// Peeks at the context of a path without counting it as an access.
    pub fn get(&self, path: &Path) -> Option<CacheFileContext> {
        self.entries.get(path).map(|pair| *pair.context())
    }

    /// Inserts or replaces the entry of a path and makes it the most recently used.
    ///
    /// `context.bytes_on_disk` must be the size of the file at `path`.
    pub fn put(&mut self, path: &Path, context: CacheFileContext) {
        // reuse the shared key of a replaced entry
        let key = self
            .entries
            .get(path)
            .map(|pair| pair.path_key().clone())
            .unwrap_or_else(|| PathKey::new(path));

        if let Some(previous) = self
            .entries
            .replace(PathContextPair::new(key.clone(), context))
        {
            self.total_bytes = self
                .total_bytes
                .saturating_sub(previous.context().bytes_on_disk);
        }

        self.total_bytes += context.bytes_on_disk;
        trace!(
            "Put {} ({} bytes), total {} bytes",
            key,
            context.bytes_on_disk,
            self.total_bytes
        );
        self.index.insert_or_promote(key);
    }

    /// Marks a path as accessed now.
    ///
    /// Returns false if the path isn't cached.
    pub fn touch(&mut self, path: &Path) -> bool {
        self.touch_at(path, Utc::now())
    }

    pub(crate) fn touch_at(&mut self, path: &Path, time: DateTime<Utc>) -> bool {
        let Some(mut pair) = self.entries.take(path) else {
            return false;
        };

        pair.context_mut().accessed_time = time;
        self.index.insert_or_promote(pair.path_key().clone());
        self.entries.insert(pair);
        true
    }

    /// Forgets a path. The cached file must be deleted by the caller.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.take(path).is_some()
    }

    pub(crate) fn take(&mut self, path: &Path) -> Option<PathContextPair> {
        let pair = self.entries.take(path)?;
        self.index.remove(path);
        self.total_bytes = self
            .total_bytes
            .saturating_sub(pair.context().bytes_on_disk);
        Some(pair)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains(path)
    }

    pub fn peek_least_recently_used(&self) -> Option<&Path> {
        self.index.peek_least_recently_used()
    }

    /// Removes and returns the least recently used entry.
    pub fn pop_least_recently_used(&mut self) -> Option<PathContextPair> {
        while let Some(key) = self.index.pop_least_recently_used() {
            match self.entries.take(key.as_path()) {
                Some(pair) => {
                    self.total_bytes = self
                        .total_bytes
                        .saturating_sub(pair.context().bytes_on_disk);
                    return Some(pair);
                }
                None => warn!("Dropping {} from eviction order: not in cache", key),
            }
        }
        None
    }

    /// Cached paths from the least to the most recently used.
    pub fn paths_by_recency(&self) -> impl Iterator<Item = &Path> + '_ {
        self.index.iter_lru()
    }

    /// Cached paths inside `dir`, least recently used first.
    pub fn paths_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.paths_by_recency()
            .filter(|path| path.starts_with(dir))
            .map(Path::to_path_buf)
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.total_bytes = 0;
    }

    /// Verifies the store by full scan: the byte counter must equal the sum of
    /// all entries and the eviction order must hold exactly the stored paths.
    pub fn check_consistency(&self) -> Result<(), CacheError> {
        let sum: u64 = self
            .entries
            .iter()
            .map(|pair| pair.context().bytes_on_disk)
            .sum();
        if sum != self.total_bytes {
            return Err(consistency_fault!(
                "Cache accounts for {} bytes but its entries hold {} bytes",
                self.total_bytes,
                sum
            ));
        }

        if self.index.len() != self.entries.len() {
            return Err(consistency_fault!(
                "Eviction order has {} paths but cache has {} entries",
                self.index.len(),
                self.entries.len()
            ));
        }

        if let Some(orphan) = self.paths_by_recency().find(|path| !self.contains(path)) {
            return Err(consistency_fault!(
                "Path {:?} is in eviction order but not in cache",
                orphan
            ));
        }

        if let Some(pair) = self.entries.iter().find(|pair| !self.index.contains(pair.path())) {
            return Err(consistency_fault!(
                "Path {:?} is cached but not in eviction order",
                pair.path()
            ));
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_total_bytes(&mut self, total_bytes: u64) {
        self.total_bytes = total_bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rstest::*;

    fn ctx(bytes: u64) -> CacheFileContext {
        CacheFileContext::new(bytes, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    fn order(store: &CacheStore) -> Vec<&str> {
        store
            .paths_by_recency()
            .map(|path| path.to_str().unwrap())
            .collect()
    }

    #[fixture]
    fn store() -> CacheStore {
        let mut store = CacheStore::new();
        store.put(Path::new("/a"), ctx(10));
        store.put(Path::new("/b"), ctx(20));
        store.put(Path::new("/c"), ctx(30));
        store
    }

    #[rstest]
    fn test_put_get(mut store: CacheStore) {
        let context = ctx(42);
        store.put(Path::new("/d"), context);
        assert_eq!(store.get(Path::new("/d")), Some(context));
        assert_eq!(store.get(Path::new("/e")), None);
    }

    #[rstest]
    fn test_put_replaces_and_adjusts_total(mut store: CacheStore) {
        assert_eq!(store.total_bytes(), 60);

        store.put(Path::new("/a"), ctx(5));
        assert_eq!(store.total_bytes(), 55);
        assert_eq!(store.len(), 3);
        assert_eq!(order(&store), vec!["/b", "/c", "/a"]);
        store.check_consistency().unwrap();
    }

    #[rstest]
    fn test_put_reuses_key(mut store: CacheStore) {
        let before = store.entries.get(Path::new("/b")).unwrap().path_key().clone();
        store.put(Path::new("/b"), ctx(1));
        let after = store.entries.get(Path::new("/b")).unwrap().path_key().clone();
        assert!(before.ptr_eq(&after));
    }

    #[rstest]
    fn test_get_does_not_promote(store: CacheStore) {
        store.get(Path::new("/a"));
        assert_eq!(order(&store), vec!["/a", "/b", "/c"]);
    }

    #[rstest]
    fn test_touch(mut store: CacheStore) {
        let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(5);
        assert!(store.touch_at(Path::new("/a"), time));

        assert_eq!(store.get(Path::new("/a")).unwrap().accessed_time, time);
        assert_eq!(store.get(Path::new("/a")).unwrap().bytes_on_disk, 10);
        assert_eq!(order(&store), vec!["/b", "/c", "/a"]);
        assert_eq!(store.total_bytes(), 60);
    }

    #[rstest]
    fn test_touch_missing(mut store: CacheStore) {
        assert!(!store.touch(Path::new("/missing")));
        assert_eq!(order(&store), vec!["/a", "/b", "/c"]);
    }

    #[rstest]
    fn test_touch_twice_is_single_promotion(mut store: CacheStore) {
        store.touch(Path::new("/b"));
        let once: Vec<String> = order(&store).iter().map(|s| s.to_string()).collect();
        store.touch(Path::new("/b"));
        assert_eq!(order(&store), once);
        assert_eq!(order(&store), vec!["/a", "/c", "/b"]);
    }

    #[rstest]
    fn test_remove(mut store: CacheStore) {
        assert!(store.remove(Path::new("/b")));
        assert!(!store.remove(Path::new("/b")));

        assert_eq!(store.get(Path::new("/b")), None);
        assert_eq!(store.total_bytes(), 40);
        assert_eq!(order(&store), vec!["/a", "/c"]);
        store.check_consistency().unwrap();
    }

    #[rstest]
    fn test_pop_least_recently_used(mut store: CacheStore) {
        let popped: Vec<PathBuf> = std::iter::from_fn(|| store.pop_least_recently_used())
            .map(|pair| pair.path().to_path_buf())
            .collect();

        assert_eq!(
            popped,
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/b"),
                PathBuf::from("/c")
            ]
        );
        assert!(store.is_empty());
        assert_eq!(store.total_bytes(), 0);
    }

    #[rstest]
    fn test_peek(store: CacheStore) {
        assert_eq!(store.peek_least_recently_used(), Some(Path::new("/a")));
        assert_eq!(store.len(), 3);
    }

    #[rstest]
    fn test_paths_under() {
        let mut store = CacheStore::new();
        store.put(Path::new("/data/x/1"), ctx(1));
        store.put(Path::new("/data/y/2"), ctx(1));
        store.put(Path::new("/data/x/3"), ctx(1));

        assert_eq!(
            store.paths_under(Path::new("/data/x")),
            vec![PathBuf::from("/data/x/1"), PathBuf::from("/data/x/3")]
        );
    }

    #[rstest]
    fn test_clear(mut store: CacheStore) {
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.total_bytes(), 0);
        assert_eq!(store.peek_least_recently_used(), None);
        store.check_consistency().unwrap();
    }

    #[rstest]
    fn test_check_consistency_detects_drift(mut store: CacheStore) {
        store.set_total_bytes(1000);
        let err = store.check_consistency().err().unwrap();
        assert_eq!(err.status(), cache_base::error::ErrorCode::ConsistencyFault);
    }

    #[rstest]
    fn test_orphan_in_index_is_skipped(mut store: CacheStore) {
        store.entries.take(Path::new("/a"));
        assert!(store.check_consistency().is_err());

        let pair = store.pop_least_recently_used().unwrap();
        assert_eq!(pair.path(), Path::new("/b"));
    }
}
