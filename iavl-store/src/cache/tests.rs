use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: u32,
    value: &'static str,
}

impl CacheEntry for Entry {
    type Key = u32;

    fn cache_key(&self) -> &u32 {
        &self.key
    }
}

fn entry(key: u32, value: &'static str) -> Entry {
    Entry { key, value }
}

#[test]
fn add_within_capacity_evicts_nothing() {
    let mut cache = LruCache::new(3);
    assert_eq!(cache.add(entry(1, "a")), None);
    assert_eq!(cache.add(entry(2, "b")), None);
    assert_eq!(cache.len(), 2);
    assert!(cache.has(&1));
    assert_eq!(cache.get(&2), Some(&entry(2, "b")));
    assert_eq!(cache.capacity(), 3);
}

#[test]
fn full_cache_evicts_least_recently_used() {
    let mut cache = LruCache::new(2);
    cache.add(entry(1, "a"));
    cache.add(entry(2, "b"));
    // reading 1 makes 2 the eviction victim
    assert!(cache.get(&1).is_some());
    assert_eq!(cache.add(entry(3, "c")), Some(entry(2, "b")));
    assert!(!cache.has(&2));
    assert!(cache.has(&1));
    assert!(cache.has(&3));
    assert_eq!(cache.len(), 2);
}

#[test]
fn duplicate_key_returns_replaced_entry() {
    let mut cache = LruCache::new(2);
    cache.add(entry(1, "a"));
    cache.add(entry(2, "b"));
    assert_eq!(cache.add(entry(1, "a2")), Some(entry(1, "a")));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&1), Some(&entry(1, "a2")));
    // updating 1 refreshed it, so 2 goes first
    assert_eq!(cache.add(entry(3, "c")), Some(entry(2, "b")));
}

#[test]
fn remove_returns_entry() {
    let mut cache = LruCache::new(2);
    cache.add(entry(1, "a"));
    assert_eq!(cache.remove(&1), Some(entry(1, "a")));
    assert_eq!(cache.remove(&1), None);
    assert!(cache.is_empty());
}

#[test]
fn zero_capacity_never_caches() {
    let mut cache = LruCache::new(0);
    assert_eq!(cache.add(entry(1, "a")), Some(entry(1, "a")));
    assert!(!cache.has(&1));
    assert_eq!(cache.get(&1), None);
    assert_eq!(cache.remove(&1), None);
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.capacity(), 0);
}
