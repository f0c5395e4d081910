use std::sync::PoisonError;

/// Errors returned by any `KvStore` implementation.
///
/// Categories:
/// - Backend errors (DB/I/O, poisoned locks)
/// - Invalid keys or range bounds
/// - Cooperative cancellation
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backend I/O or database error (e.g., RocksDB).
    #[error("backend error: {0}")]
    Backend(#[from] Box<dyn core::error::Error + Send + Sync + 'static>),
    /// An empty byte string was used as a key or as a range bound.
    #[error("empty keys are not valid")]
    EmptyKey,
    /// The backend cancelled the operation on behalf of the caller.
    #[error("operation aborted")]
    Aborted,
}

impl<T> From<PoisonError<T>> for StorageError {
    fn from(e: PoisonError<T>) -> Self {
        // The guard inside `PoisonError<T>` is not `Send`, so only its message is kept.
        #[derive(Debug)]
        struct LockError(String);

        impl std::fmt::Display for LockError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::error::Error for LockError {}

        StorageError::Backend(Box::new(LockError(format!("lock poisoned: {e}"))))
    }
}
