//! Versioned, authenticated key-value tree (an AVL+ tree with copy-on-write versions).
//!
//! [MutableTree] holds the writable head. Every [`MutableTree::save_version`] commits the head
//! as a new immutable version whose root hash authenticates the full key-value state. Committed
//! versions are read through [ImmutableTree] handles, which also produce Merkle proofs and
//! exports. A flat fast cache of the head serves point reads and ordered iteration on the head
//! without walking the tree.
//!
//! With the `rocksdb` feature enabled, a tree can be persisted on disk:
//! ```no_run
//! # #[cfg(feature = "rocksdb")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use iavl_store::{
//!     storage::{RocksDbConfig, RocksDbStorage},
//!     MutableTree, TreeConfig,
//! };
//!
//! let storage = RocksDbStorage::open(RocksDbConfig::new("/path/to/db"))?;
//! let mut tree = MutableTree::open(storage, TreeConfig::new())?;
//!
//! tree.set(b"alpha", b"1")?;
//! tree.set(b"beta", b"2")?;
//! let (root, version) = tree.save_version()?;
//!
//! // historical reads bypass the fast cache
//! let snapshot = tree.load_version(version)?;
//! assert_eq!(snapshot.hash(), root);
//! assert!(snapshot.prove(b"alpha")?.verify(&root, tree.hash_function()));
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "rocksdb"))]
//! # fn main() {}
//! ```

mod codec;
pub use codec::DecodeError;

mod config;
pub use config::{Retention, TreeConfig, DEFAULT_CACHE_CAPACITY};

mod error;
pub use error::{CorruptionError, TreeError};

mod export;
pub use export::{ExportNode, Exporter, Importer, IMPORT_BATCH_SIZE};

mod fast;

mod immutable;
pub use immutable::ImmutableTree;

mod iterator;
pub use iterator::TreeIterator;

mod keys;

mod mutable;
pub use mutable::MutableTree;

mod node;
mod node_db;

mod proof;
pub use proof::{ExistenceProof, KeyProof, NonExistenceProof, ProofStep, Side};

mod stats;
pub use stats::TreeStatistics;

mod versions;
mod walk;
