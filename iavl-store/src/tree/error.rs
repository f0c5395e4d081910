use std::sync::PoisonError;

use thiserror::Error;

use super::codec::DecodeError;
use crate::{hash::HashFunction, storage::StorageError};

// ERROR TYPES
// ================================================================================================

/// Errors that can occur during tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The requested version is not retained by the store.
    #[error("version {0} does not exist")]
    VersionNotFound(u64),

    /// The version cannot be deleted because it is the latest committed version.
    #[error("version {0} is the latest version and cannot be deleted")]
    VersionInUse(u64),

    /// Keys must be non-empty.
    #[error("empty keys are not allowed")]
    EmptyKey,

    /// Iterator bounds may be unbounded or non-empty, but not empty.
    #[error("range bounds must not be empty")]
    EmptyRangeBound,

    /// The store was created with a different hash function.
    #[error("store uses hash function {stored}, but {configured} was configured")]
    HashFunctionMismatch { stored: HashFunction, configured: HashFunction },

    /// An argument was rejected, e.g. a version that violates ordering rules.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Data read from the backend is inconsistent.
    #[error("store is corrupt")]
    Corrupt(#[from] CorruptionError),

    /// A backend operation failed.
    #[error("storage operation failed")]
    Storage(#[source] StorageError),

    /// The operation was cancelled by the backend on behalf of the caller.
    #[error("operation aborted")]
    Aborted,
}

impl From<StorageError> for TreeError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Aborted => TreeError::Aborted,
            StorageError::EmptyKey => TreeError::EmptyKey,
            e => TreeError::Storage(e),
        }
    }
}

impl<T> From<PoisonError<T>> for TreeError {
    fn from(e: PoisonError<T>) -> Self {
        TreeError::Storage(StorageError::from(e))
    }
}

impl From<DecodeError> for TreeError {
    fn from(e: DecodeError) -> Self {
        TreeError::Corrupt(CorruptionError::Decode(e))
    }
}

/// Inconsistencies detected in persisted tree data.
#[derive(Debug, Error)]
pub enum CorruptionError {
    /// A stored record failed to decode.
    #[error("failed to decode stored record")]
    Decode(#[from] DecodeError),

    /// The hash recomputed from a node record differs from the key it is stored under.
    #[error("node stored under {} hashes to {}", hex::encode(.expected), hex::encode(.found))]
    HashMismatch { expected: [u8; 32], found: [u8; 32] },

    /// A node referenced by a retained version is missing from the backend.
    #[error("node {} is missing", hex::encode(.0))]
    MissingNode([u8; 32]),

    /// A version index entry has a malformed key or value.
    #[error("malformed entry in the version index")]
    BadVersionEntry,

    /// The latest-version pointer is malformed or names a version that is not indexed.
    #[error("latest version pointer is invalid")]
    BadLatestPointer,

    /// The persisted hash function identifier is unknown.
    #[error("unknown hash function identifier {0}")]
    UnknownHashFunction(u8),

    /// An orphan record has a malformed key.
    #[error("malformed orphan record")]
    BadOrphanRecord,

    /// A fast cache entry has a malformed key.
    #[error("malformed fast cache entry")]
    BadFastNode,

    /// A node of the working tree references a pending node that no longer exists.
    #[error("working tree references a discarded node")]
    DanglingPendingNode,
}

#[cfg(test)]
// Compile-time assertion that TreeError implements the required traits
const _: fn() = || {
    fn assert_impl<T: std::error::Error + Send + Sync + 'static>() {}
    assert_impl::<TreeError>();
    assert_impl::<CorruptionError>();
    assert_impl::<StorageError>();
};
