use std::{collections::BTreeMap, ops::Bound, sync::RwLock};

use super::{check_bounds, check_key, KvIter, KvPair, KvStore, StorageError, WriteBatch};

/// In-memory ordered key-value store, implementing the `KvStore` trait.
///
/// Entries live in a `BTreeMap` guarded by a `std::sync::RwLock`. Cursors copy the requested
/// range when they are created, so they observe a consistent snapshot regardless of later
/// writes.
///
/// It is primarily intended for scenarios where data persistence to disk is not a primary
/// concern. Common use cases include:
/// - Testing environments.
/// - Short-lived trees, e.g. when computing a root hash off-line.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    ///
    /// # Errors
    /// Returns `StorageError::Backend` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.entries.read()?.len())
    }

    /// Returns true if the store holds no entries.
    ///
    /// # Errors
    /// Returns `StorageError::Backend` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.entries.read()?.is_empty())
    }
}

impl Clone for MemoryStorage {
    fn clone(&self) -> Self {
        let entries = match self.entries.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        MemoryStorage { entries: RwLock::new(entries) }
    }
}

impl KvStore for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        check_key(key)?;
        Ok(self.entries.read()?.get(key).cloned())
    }

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        check_key(key)?;
        Ok(self.entries.read()?.contains_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        self.entries.write()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        self.entries.write()?.remove(key);
        Ok(())
    }

    /// Returns a cursor over a copy of the entries in `[start, end)`.
    ///
    /// # Errors
    /// Returns `StorageError::EmptyKey` for empty bounds, or `StorageError::Backend` if the read
    /// lock cannot be acquired.
    fn iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Result<KvIter<'_>, StorageError> {
        check_bounds(start, end)?;
        let lower = start.map_or(Bound::Unbounded, Bound::Included);
        let upper = end.map_or(Bound::Unbounded, Bound::Excluded);

        // An inverted range is empty rather than a panic inside `BTreeMap::range`.
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Ok(Box::new(core::iter::empty()));
            }
        }

        let entries_guard = self.entries.read()?;
        let mut snapshot: Vec<KvPair> = entries_guard
            .range::<[u8], _>((lower, upper))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if reverse {
            snapshot.reverse();
        }
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    /// Applies every operation of `batch` under a single write lock.
    ///
    /// # Errors
    /// Returns `StorageError::EmptyKey` if the batch contains an empty key, in which case
    /// nothing is applied.
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        if batch.iter().any(|(key, _)| key.is_empty()) {
            return Err(StorageError::EmptyKey);
        }

        let mut entries_guard = self.entries.write()?;
        for (key, op) in batch {
            match op {
                Some(value) => {
                    entries_guard.insert(key, value);
                },
                None => {
                    entries_guard.remove(&key);
                },
            }
        }
        Ok(())
    }
}
