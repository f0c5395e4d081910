use std::sync::Arc;

use super::{
    error::{CorruptionError, TreeError},
    export::Exporter,
    iterator::TreeIterator,
    node::{Node, NodeRef},
    node_db::{NodeDb, VersionPin},
    proof::{self, KeyProof},
    walk::{self, LeafWalk, NodeSource},
};
use crate::{
    hash::{NodeHash, EMPTY_HASH},
    storage::KvStore,
};

// IMMUTABLE TREE
// ================================================================================================

/// Read-only view of a committed version.
///
/// An immutable tree holds only the root hash of its version and loads nodes on demand through
/// the shared node cache. It is cheap to clone and can be sent to other threads.
///
/// While any handle for a version exists, the nodes of that version stay in the backend, even if
/// the version is deleted in the meantime.
#[derive(Debug)]
pub struct ImmutableTree<S: KvStore> {
    ndb: Arc<NodeDb<S>>,
    version: u64,
    root: Option<NodeHash>,
    _pin: VersionPin<S>,
}

impl<S: KvStore> Clone for ImmutableTree<S> {
    fn clone(&self) -> Self {
        Self {
            ndb: self.ndb.clone(),
            version: self.version,
            root: self.root,
            _pin: self._pin.clone(),
        }
    }
}

impl<S: KvStore> ImmutableTree<S> {
    /// Opens a view of `version`.
    ///
    /// # Errors
    /// Returns `TreeError::VersionNotFound` if the version is not retained.
    pub(crate) fn load(ndb: &Arc<NodeDb<S>>, version: u64) -> Result<Self, TreeError> {
        let (root, pin) = ndb.pin(version)?;
        let root = (root != EMPTY_HASH).then_some(root);
        Ok(Self { ndb: ndb.clone(), version, root, _pin: pin })
    }

    pub(crate) fn root_ref(&self) -> Option<NodeRef> {
        self.root.map(NodeRef::Stored)
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the version this tree was loaded at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the root hash, [EMPTY_HASH] for an empty tree.
    pub fn hash(&self) -> NodeHash {
        self.root.unwrap_or(EMPTY_HASH)
    }

    /// Always false: reads on committed versions walk the tree.
    pub fn is_fast_cache_enabled(&self) -> bool {
        false
    }

    /// Returns the number of keys in the tree.
    ///
    /// # Errors
    /// Returns an error if the root node cannot be loaded.
    pub fn size(&self) -> Result<u64, TreeError> {
        Ok(walk::shape(self, self.root_ref())?.0)
    }

    /// Returns the height of the root node; 0 for empty and single-key trees.
    ///
    /// # Errors
    /// Returns an error if the root node cannot be loaded.
    pub fn height(&self) -> Result<u8, TreeError> {
        Ok(walk::shape(self, self.root_ref())?.1)
    }

    // READS
    // --------------------------------------------------------------------------------------------

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    /// - `TreeError::EmptyKey` if `key` is empty.
    /// - `TreeError::Corrupt` or `TreeError::Storage` if a node cannot be loaded.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TreeError> {
        check_key(key)?;
        walk::get(self, self.root_ref(), key)
    }

    /// Returns true if `key` is present.
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn has(&self, key: &[u8]) -> Result<bool, TreeError> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns the rank of `key` in key order and its value.
    ///
    /// For an absent key the rank is the position it would be inserted at.
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn get_with_index(&self, key: &[u8]) -> Result<(u64, Option<Vec<u8>>), TreeError> {
        check_key(key)?;
        walk::get_with_index(self, self.root_ref(), key)
    }

    /// Returns the entry of rank `index`, or `None` if `index` is out of bounds.
    ///
    /// # Errors
    /// Returns an error if a node cannot be loaded.
    pub fn get_by_index(&self, index: u64) -> Result<Option<(Vec<u8>, Vec<u8>)>, TreeError> {
        walk::get_by_index(self, self.root_ref(), index)
    }

    /// Returns an iterator over the entries with keys in `[start, end)`.
    ///
    /// # Errors
    /// Returns `TreeError::EmptyRangeBound` if a bound is an empty byte string.
    pub fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Result<TreeIterator<'_>, TreeError> {
        check_bounds(start, end)?;
        Ok(TreeIterator::slow(LeafWalk::new(self, self.root_ref(), start, end, reverse)))
    }

    // PROOFS AND EXPORT
    // --------------------------------------------------------------------------------------------

    /// Builds a proof that `key` is present, or that it is absent, against [`hash`](Self::hash).
    ///
    /// # Errors
    /// - `TreeError::EmptyKey` if `key` is empty.
    /// - `TreeError::Corrupt` or `TreeError::Storage` if a node cannot be loaded.
    pub fn prove(&self, key: &[u8]) -> Result<KeyProof, TreeError> {
        check_key(key)?;
        proof::prove(self, self.root_ref(), key)
    }

    /// Returns the nodes of this tree in post-order, for rebuilding it in another store.
    pub fn export(&self) -> Exporter<'_> {
        Exporter::new(self, self.root_ref())
    }
}

impl<S: KvStore> NodeSource for ImmutableTree<S> {
    fn load(&self, node: &NodeRef) -> Result<Arc<Node>, TreeError> {
        match node {
            NodeRef::Stored(hash) => self.ndb.get_node(hash),
            NodeRef::Pending(_) => Err(CorruptionError::DanglingPendingNode.into()),
        }
    }
}

// HELPERS
// ================================================================================================

pub(crate) fn check_key(key: &[u8]) -> Result<(), TreeError> {
    if key.is_empty() {
        return Err(TreeError::EmptyKey);
    }
    Ok(())
}

pub(crate) fn check_bounds(start: Option<&[u8]>, end: Option<&[u8]>) -> Result<(), TreeError> {
    if start.is_some_and(<[u8]>::is_empty) || end.is_some_and(<[u8]>::is_empty) {
        return Err(TreeError::EmptyRangeBound);
    }
    Ok(())
}
