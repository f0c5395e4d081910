use core::sync::atomic::{AtomicU64, Ordering};

/// Cache effectiveness counters shared by every tree opened on the same store.
#[derive(Debug, Default)]
pub(crate) struct Statistics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fast_cache_hits: AtomicU64,
    fast_cache_misses: AtomicU64,
}

impl Statistics {
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fast_cache_hit(&self) {
        self.fast_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fast_cache_miss(&self) {
        self.fast_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TreeStatistics {
        TreeStatistics {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fast_cache_hits: self.fast_cache_hits.load(Ordering::Relaxed),
            fast_cache_misses: self.fast_cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.fast_cache_hits.store(0, Ordering::Relaxed);
        self.fast_cache_misses.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStatistics {
    /// Node loads served by the node cache.
    pub cache_hits: u64,
    /// Node loads that went to the backend.
    pub cache_misses: u64,
    /// Head reads answered by the fast cache.
    pub fast_cache_hits: u64,
    /// Head reads for keys the fast cache does not hold.
    pub fast_cache_misses: u64,
}
