// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

use crate::cache::store::CacheStore;
use bytesize::ByteSize;
use cache_base::consistency_fault;
use cache_base::error::CacheError;
use log::{debug, error};
use std::path::PathBuf;

/// Keeps the bytes of a [`CacheStore`] within a configured budget.
#[derive(Clone, Debug, PartialEq)]
pub struct BudgetController {
    max_bytes: u64,
    fatal_faults: bool,
}

impl BudgetController {
    /// Creates a controller. Consistency faults are fatal in debug builds.
    pub fn new(max_bytes: u64) -> Self {
        BudgetController {
            max_bytes,
            fatal_faults: cfg!(debug_assertions),
        }
    }

    /// Panic on a consistency fault instead of resetting the store.
    pub fn with_fatal_faults(mut self, fatal: bool) -> Self {
        self.fatal_faults = fatal;
        self
    }

    pub fn set_fatal_faults(&mut self, fatal: bool) {
        self.fatal_faults = fatal;
    }

    /// Sets a new budget. It is applied on the next [`BudgetController::enforce`].
    pub fn configure(&mut self, max_bytes: u64) {
        debug!(
            "Cache budget changed from {} to {}",
            ByteSize::b(self.max_bytes),
            ByteSize::b(max_bytes)
        );
        self.max_bytes = max_bytes;
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn is_exceeded(&self, store: &CacheStore) -> bool {
        store.total_bytes() > self.max_bytes
    }

    /// Evicts least recently used entries until the store fits the budget.
    ///
    /// # Returns
    ///
    /// The evicted paths, oldest first. The files are still on disk and must be
    /// deleted by the caller.
    ///
    /// # Errors
    ///
    /// A consistency fault if the store still accounts for more bytes than the
    /// budget but has no entry left to evict. The store is cleared before the
    /// error is returned. With fatal faults (debug builds) it panics instead.
    pub fn enforce(&self, store: &mut CacheStore) -> Result<Vec<PathBuf>, CacheError> {
        let mut evicted = Vec::new();

        while self.is_exceeded(store) {
            let Some(pair) = store.pop_least_recently_used() else {
                let fault = self.reset_after_fault(store);
                if self.fatal_faults {
                    panic!("{}", fault);
                }
                return Err(fault);
            };

            debug!(
                "Evicting {:?} ({}) from cache",
                pair.path(),
                ByteSize::b(pair.context().bytes_on_disk)
            );
            let (key, _) = pair.into_parts();
            evicted.push(key.to_path_buf());
        }

        Ok(evicted)
    }

    /// Clears a store whose accounting can't be trusted anymore.
    fn reset_after_fault(&self, store: &mut CacheStore) -> CacheError {
        let fault = consistency_fault!(
            "Cache accounts for {} bytes over a budget of {} bytes but has nothing to evict",
            store.total_bytes(),
            self.max_bytes
        );

        error!("{}. Resetting the cache", fault);
        store.clear();
        fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::context::CacheFileContext;
    use rstest::*;
    use std::path::Path;

    fn store_with(sizes: &[(&str, u64)]) -> CacheStore {
        let mut store = CacheStore::new();
        for (path, size) in sizes {
            store.put(Path::new(path), CacheFileContext::now(*size));
        }
        store
    }

    #[rstest]
    fn test_evicts_oldest_only() {
        let mut store = store_with(&[("A", 40), ("B", 40), ("C", 40)]);
        let budget = BudgetController::new(100);

        assert_eq!(budget.enforce(&mut store).unwrap(), vec![PathBuf::from("A")]);
        assert_eq!(store.total_bytes(), 80);
        assert!(!budget.is_exceeded(&store));
    }

    #[rstest]
    fn test_promotion_changes_eviction_order() {
        let mut store = store_with(&[("A", 10), ("B", 10), ("C", 10)]);
        store.touch(Path::new("A"));

        let budget = BudgetController::new(0);
        assert_eq!(
            budget.enforce(&mut store).unwrap(),
            vec![PathBuf::from("B"), PathBuf::from("C"), PathBuf::from("A")]
        );
        assert!(store.is_empty());
    }

    #[rstest]
    fn test_within_budget_evicts_nothing() {
        let mut store = store_with(&[("/a", 50), ("/b", 50)]);
        let budget = BudgetController::new(100);

        assert!(budget.enforce(&mut store).unwrap().is_empty());
        assert_eq!(store.len(), 2);
    }

    #[rstest]
    fn test_configure_then_enforce() {
        let mut store = store_with(&[("/a", 50), ("/b", 50)]);
        let mut budget = BudgetController::new(1000);
        assert!(budget.enforce(&mut store).unwrap().is_empty());

        budget.configure(80);
        assert_eq!(budget.max_bytes(), 80);
        assert_eq!(budget.enforce(&mut store).unwrap(), vec![PathBuf::from("/a")]);
        assert_eq!(store.total_bytes(), 50);
        assert!(store.contains(Path::new("/b")));
    }

    #[rstest]
    fn test_ties_follow_list_order() {
        // same timestamp for all entries, order comes from the list alone
        let time = chrono::Utc::now();
        let mut store = CacheStore::new();
        for path in ["/z", "/a", "/m"] {
            store.put(Path::new(path), CacheFileContext::new(1, time));
        }

        assert_eq!(
            BudgetController::new(1).enforce(&mut store).unwrap(),
            vec![PathBuf::from("/z"), PathBuf::from("/a")]
        );
    }

    #[rstest]
    #[should_panic(expected = "has nothing to evict")]
    fn test_fatal_consistency_fault_panics() {
        let mut store = CacheStore::new();
        store.set_total_bytes(10);
        let _ = BudgetController::new(5)
            .with_fatal_faults(true)
            .enforce(&mut store);
    }

    #[rstest]
    fn test_consistency_fault_resets_store() {
        let mut store = store_with(&[("/a", 10)]);
        store.set_total_bytes(100);

        let err = BudgetController::new(5)
            .with_fatal_faults(false)
            .enforce(&mut store)
            .err()
            .unwrap();
        assert_eq!(
            err.status(),
            cache_base::error::ErrorCode::ConsistencyFault
        );
        assert!(store.is_empty());
        assert_eq!(store.total_bytes(), 0);
        store.check_consistency().unwrap();
    }

    #[rstest]
    fn test_faults_are_fatal_in_debug_builds() {
        assert_eq!(
            BudgetController::new(1),
            BudgetController::new(1).with_fatal_faults(cfg!(debug_assertions))
        );
    }
}
