//! An in-memory cache of parsed TAR indexes, bounded by
//! `cache_budget_bytes` rather than entry count since indexes vary
//! widely in size with the datarange they describe, using a
//! `moka::sync::Cache` with a byte weigher rather than a raw capacity
//! count.

use std::sync::Arc;

use moka::sync::Cache;

use crate::tar_index::{TarIndex, RECORD_SIZE};

#[derive(Clone)]
pub struct IndexCache {
    cache: Cache<String, Arc<TarIndex>>,
}

impl IndexCache {
    pub fn new(budget_bytes: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(budget_bytes)
            .weigher(|_key: &String, index: &Arc<TarIndex>| (index.len() * RECORD_SIZE) as u32)
            .build();
        Self { cache }
    }

    pub fn get(&self, key: &str) -> Option<Arc<TarIndex>> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: String, index: Arc<TarIndex>) {
        self.cache.insert(key, index);
    }

    /// Drops a cached index once its datarange is deleted, so a later
    /// (already-invalid) lookup can't resurrect a stale entry.
    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar_index::IndexEntry;

    fn index_with_entries(n: usize) -> Arc<TarIndex> {
        Arc::new(TarIndex::new(
            (0..n).map(|i| IndexEntry { start_offset: i as u64, size: 4 }).collect(),
        ))
    }

    #[test]
    fn caches_and_returns_indexes() {
        let cache = IndexCache::new(1024 * 1024);
        assert!(cache.get("k1").is_none());
        cache.insert("k1".to_owned(), index_with_entries(3));
        cache.cache.run_pending_tasks();
        assert_eq!(cache.get("k1").unwrap().len(), 3);
    }

    #[test]
    fn evicts_once_budget_is_exceeded() {
        let cache = IndexCache::new(RECORD_SIZE as u64 * 10);
        cache.insert("big".to_owned(), index_with_entries(100));
        cache.cache.run_pending_tasks();
        assert!(cache.get("big").is_none(), "an index heavier than the whole budget is never retained");
    }
}
