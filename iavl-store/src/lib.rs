//! A versioned, authenticated, persistent key-value store.
//!
//! The store maps byte keys to byte values. Every commit produces a new immutable version,
//! identified by a Merkle root hash over the whole key-value state. Historical versions stay
//! readable until they are deleted, and a flat secondary index of the live head accelerates
//! point reads and ordered iteration on the head.
//!
//! The crate is organized as follows:
//! - [storage]: the ordered byte-level backend ([`storage::MemoryStorage`], and RocksDB with the
//!   `rocksdb` feature).
//! - [hash]: the hash functions a store can be configured with.
//! - [cache]: a generic bounded cache, used for decoded tree nodes.
//! - [tree]: the versioned tree itself.

pub mod cache;
pub mod hash;
pub mod storage;
pub mod tree;

// RE-EXPORTS
// ================================================================================================

pub use hash::{HashFunction, NodeHash, EMPTY_HASH, HASH_LEN};
pub use tree::{
    ExistenceProof, ExportNode, ImmutableTree, Importer, KeyProof, MutableTree, NonExistenceProof,
    Retention, TreeConfig, TreeError, TreeIterator, TreeStatistics,
};
