use core::{fmt, ops::Deref};

mod batch;
pub use batch::WriteBatch;

mod error;
pub use error::StorageError;

mod memory;
pub use memory::MemoryStorage;

#[cfg(feature = "rocksdb")]
mod rocksdb;
#[cfg(feature = "rocksdb")]
pub use rocksdb::{RocksDbConfig, RocksDbStorage};

#[cfg(test)]
mod tests;

// TYPES
// ================================================================================================

/// A key-value pair read from the backend.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Cursor over a key range of the backend.
///
/// Items are yielded in ascending key order, or descending order for reverse iteration. A
/// cursor observes the backend as of its creation; writes committed afterwards are not visible.
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<KvPair, StorageError>> + 'a>;

// KV STORE
// ================================================================================================

/// Ordered byte-level key-value backend.
///
/// This trait outlines the operations the tree requires from its persistence layer. Keys are
/// compared in lexicographic byte order, which the tree's key schema relies on for range scans.
/// Implementations can be in-memory maps or persistent databases (e.g., RocksDB).
///
/// Empty byte strings are not valid keys; every method receiving one returns
/// [`StorageError::EmptyKey`].
pub trait KvStore: 'static + fmt::Debug + Send + Sync {
    /// Returns the value stored under `key`, or `Ok(None)` if the key is absent.
    ///
    /// # Errors
    /// Returns `StorageError` if the storage read operation fails.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns true if a value is stored under `key`.
    ///
    /// # Errors
    /// Returns `StorageError` if the storage read operation fails.
    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// Stores `value` under `key`, overwriting any previous value.
    ///
    /// # Errors
    /// Returns `StorageError` if the storage write operation fails.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Removes `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns `StorageError` if the storage write operation fails.
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Returns a cursor over the half-open range `[start, end)`.
    ///
    /// A `None` bound leaves that side of the range unbounded. With `reverse` set the cursor
    /// starts at the greatest key below `end` and moves towards `start`.
    ///
    /// # Errors
    /// Returns `StorageError::EmptyKey` if a bound is an empty byte string, or another
    /// `StorageError` if the cursor cannot be created.
    fn iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Result<KvIter<'_>, StorageError>;

    /// Applies a [WriteBatch] atomically.
    ///
    /// Implementations must ensure that either every operation in the batch becomes visible or
    /// none does.
    ///
    /// # Errors
    /// Returns `StorageError` if the batch cannot be committed; the backend is then unchanged.
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Flushes buffered writes to durable storage.
    ///
    /// # Errors
    /// Returns `StorageError` if the flush fails.
    fn sync(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

// Blanket impl to allow any pointer to a `KvStore` to be used as storage.
impl<P, T> KvStore for P
where
    P: Deref<Target = T> + fmt::Debug + Send + Sync + 'static,
    T: KvStore + ?Sized,
{
    #[inline]
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.deref().get(key)
    }

    #[inline]
    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.deref().has(key)
    }

    #[inline]
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.deref().put(key, value)
    }

    #[inline]
    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.deref().delete(key)
    }

    #[inline]
    fn iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Result<KvIter<'_>, StorageError> {
        self.deref().iter(start, end, reverse)
    }

    #[inline]
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.deref().write(batch)
    }

    #[inline]
    fn sync(&self) -> Result<(), StorageError> {
        self.deref().sync()
    }
}

// HELPERS
// ================================================================================================

/// Rejects empty keys.
pub(crate) fn check_key(key: &[u8]) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::EmptyKey);
    }
    Ok(())
}

/// Rejects empty range bounds.
pub(crate) fn check_bounds(start: Option<&[u8]>, end: Option<&[u8]>) -> Result<(), StorageError> {
    start.map_or(Ok(()), check_key)?;
    end.map_or(Ok(()), check_key)
}
