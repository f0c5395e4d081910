//! Object-agnostic bounded caches.
//!
//! A cache stores entries that know their own key. Adding an entry may evict another one,
//! which is handed back to the caller so it can be inspected or dropped explicitly.

use core::{hash::Hash, num::NonZeroUsize};

#[cfg(test)]
mod tests;

// CACHE ENTRY
// ================================================================================================

/// A value that can be stored in a [Cache].
pub trait CacheEntry {
    /// The key under which the entry is stored.
    type Key: Clone + Eq + Hash;

    /// Returns the key of this entry.
    fn cache_key(&self) -> &Self::Key;
}

// CACHE
// ================================================================================================

/// A bounded cache of entries.
pub trait Cache<E: CacheEntry> {
    /// Adds `entry` to the cache and returns the entry that left it, if any.
    ///
    /// - If an entry with the same key is already cached, it is replaced and returned.
    /// - If the cache is full, the eviction victim is returned.
    /// - A cache with zero capacity returns `entry` itself.
    fn add(&mut self, entry: E) -> Option<E>;

    /// Removes and returns the entry stored under `key`.
    fn remove(&mut self, key: &E::Key) -> Option<E>;

    /// Returns true if an entry is stored under `key`. Does not affect eviction order.
    fn has(&self, key: &E::Key) -> bool;

    /// Returns the entry stored under `key`, marking it as most recently used.
    fn get(&mut self, key: &E::Key) -> Option<&E>;

    /// Returns the number of cached entries.
    fn len(&self) -> usize;

    /// Returns true if the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// LRU CACHE
// ================================================================================================

/// A [Cache] evicting the least recently added, updated or read entry.
#[derive(Debug)]
pub struct LruCache<E: CacheEntry> {
    /// `None` when the capacity is zero.
    inner: Option<lru::LruCache<E::Key, E>>,
}

impl<E: CacheEntry> LruCache<E> {
    /// Returns a new cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self { inner: NonZeroUsize::new(capacity).map(lru::LruCache::new) }
    }

    /// Returns the maximum number of entries this cache holds.
    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map_or(0, |cache| cache.cap().get())
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        if let Some(cache) = self.inner.as_mut() {
            cache.clear();
        }
    }
}

impl<E: CacheEntry> Cache<E> for LruCache<E> {
    fn add(&mut self, entry: E) -> Option<E> {
        let Some(cache) = self.inner.as_mut() else {
            return Some(entry);
        };
        let key = entry.cache_key().clone();
        // `push` returns either the replaced entry for the same key or the LRU victim.
        cache.push(key, entry).map(|(_, evicted)| evicted)
    }

    fn remove(&mut self, key: &E::Key) -> Option<E> {
        self.inner.as_mut()?.pop(key)
    }

    fn has(&self, key: &E::Key) -> bool {
        self.inner.as_ref().is_some_and(|cache| cache.contains(key))
    }

    fn get(&mut self, key: &E::Key) -> Option<&E> {
        self.inner.as_mut()?.get(key)
    }

    fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |cache| cache.len())
    }
}
