use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tracing::{debug, info, warn};

use super::{
    codec,
    config::{Retention, TreeConfig},
    error::{CorruptionError, TreeError},
    export::Importer,
    fast::{self, FastIter, StagedChanges},
    immutable::{check_bounds, check_key, ImmutableTree},
    iterator::TreeIterator,
    keys::{self, OrphanRecord},
    node::{InnerNode, Node, NodeRef, PendingId},
    node_db::NodeDb,
    stats::TreeStatistics,
    walk::{self, LeafWalk, NodeSource},
};
use crate::{
    hash::{HashFunction, NodeHash, EMPTY_HASH},
    storage::{KvStore, WriteBatch},
};

// MUTABLE TREE
// ================================================================================================

/// The writable head of a versioned, authenticated key-value store.
///
/// A mutable tree owns the working copy of the head: `set` and `remove` build new nodes in
/// memory, copying every saved node they touch, and [`save_version`](Self::save_version) writes
/// those nodes, the new version entry and the fast cache changes in one atomic batch.
///
/// Committed versions are read through [`load_version`](Self::load_version), which returns an
/// [ImmutableTree] that can be shared with other threads. For concurrent access to the head
/// itself, wrap the tree in a `RwLock`: writes need `&mut self`, reads only `&self`.
///
/// # Examples
/// ```
/// use iavl_store::{storage::MemoryStorage, MutableTree};
///
/// let mut tree = MutableTree::new(MemoryStorage::new(), 1_000)?;
/// tree.set(b"alpha", b"1")?;
/// let (hash, version) = tree.save_version()?;
/// assert_eq!(version, 1);
/// assert_eq!(tree.get(b"alpha")?, Some(b"1".to_vec()));
/// assert_eq!(tree.load_version(1)?.hash(), hash);
/// # Ok::<(), iavl_store::TreeError>(())
/// ```
#[derive(Debug)]
pub struct MutableTree<S: KvStore> {
    ndb: Arc<NodeDb<S>>,
    config: TreeConfig,
    /// Latest committed version; 0 if nothing was committed yet.
    latest: u64,
    /// Root of the latest committed version.
    saved_root: Option<NodeHash>,
    /// Root of the working tree.
    root: Option<NodeRef>,
    /// Nodes created since the last commit.
    dirty: HashMap<PendingId, Arc<Node>>,
    next_pending: PendingId,
    /// Saved nodes dropped from the working tree.
    orphans: HashSet<NodeHash>,
    /// Fast cache changes since the last commit; only tracked while the fast cache is live.
    staged: StagedChanges,
    fast_live: bool,
    /// Changes made to `dirty` and `orphans` by the mutation in progress.
    undo: Vec<Undo>,
}

/// Outcome of removing a key from a subtree.
struct Removal {
    value: Vec<u8>,
    /// What replaces the subtree; `None` if it became empty.
    replacement: Option<NodeRef>,
    /// New smallest key of the subtree, if it changed.
    new_key: Option<Vec<u8>>,
}

impl<S: KvStore> MutableTree<S> {
    /// Opens the tree stored in `storage` with the default configuration and the given node
    /// cache capacity.
    ///
    /// # Errors
    /// See [`open`](Self::open).
    pub fn new(storage: S, cache_capacity: usize) -> Result<Self, TreeError> {
        Self::open(storage, TreeConfig::new().with_cache_capacity(cache_capacity))
    }

    /// Opens the tree stored in `storage`, positioned at its latest version.
    ///
    /// Orphan records of versions deleted while readers held them are collected. With the fast
    /// cache enabled, a store without a live fast cache gets it rebuilt from the head.
    ///
    /// # Errors
    /// - `TreeError::HashFunctionMismatch` if the store was created with another hash function.
    /// - `TreeError::InvalidArgument` if the retention setting keeps no versions.
    /// - `TreeError::Corrupt` if the version index, the latest-version pointer or the latest
    ///   root node is inconsistent.
    /// - `TreeError::Storage` if the backend cannot be read.
    pub fn open(storage: S, config: TreeConfig) -> Result<Self, TreeError> {
        if config.retention == Retention::KeepRecent(0) {
            return Err(TreeError::InvalidArgument(
                "retention must keep at least one version".to_string(),
            ));
        }
        check_hash_function(&storage, config.hash_function)?;

        let ndb = Arc::new(NodeDb::new(storage, config.hash_function, config.cache_capacity));
        ndb.load_version_index()?;
        let latest = ndb.load_latest_version()?;

        let saved_root = if latest == 0 {
            if ndb.version_count()? != 0 {
                return Err(CorruptionError::BadLatestPointer.into());
            }
            None
        } else {
            let root = ndb.root_of(latest)?.ok_or(CorruptionError::BadLatestPointer)?;
            if root == EMPTY_HASH {
                None
            } else {
                // fails with a hash mismatch if the latest root node is not what the index says
                ndb.get_node(&root)?;
                Some(root)
            }
        };
        ndb.recover_orphans()?;

        let mut tree = Self {
            ndb,
            config,
            latest,
            saved_root,
            root: saved_root.map(NodeRef::Stored),
            dirty: HashMap::new(),
            next_pending: 0,
            orphans: HashSet::new(),
            staged: StagedChanges::default(),
            fast_live: false,
            undo: Vec::new(),
        };

        if tree.config.fast_cache_enabled {
            if !tree.ndb.is_fast_cache_live()? {
                fast::rebuild(tree.node_db(), &tree, tree.root)?;
            }
            tree.fast_live = true;
        }

        info!(latest, fast_cache = tree.fast_live, "opened tree");
        Ok(tree)
    }

    /// Flushes the backend and closes the tree. Uncommitted changes are discarded.
    ///
    /// # Errors
    /// Returns `TreeError::Storage` if the backend cannot be synced.
    pub fn close(self) -> Result<(), TreeError> {
        self.ndb.storage().sync()?;
        Ok(())
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the latest committed version, 0 if nothing was committed yet.
    pub fn latest_version(&self) -> u64 {
        self.latest
    }

    /// Returns the version the next [`save_version`](Self::save_version) will commit.
    pub fn working_version(&self) -> u64 {
        if self.latest == 0 {
            self.config.initial_version.max(1)
        } else {
            self.latest.saturating_add(1)
        }
    }

    /// Returns the root hash of the latest committed version.
    pub fn hash(&self) -> NodeHash {
        self.saved_root.unwrap_or(EMPTY_HASH)
    }

    /// Returns the root hash the working tree would commit to.
    ///
    /// # Errors
    /// Returns an error if a node of the working tree cannot be resolved.
    pub fn working_hash(&self) -> Result<NodeHash, TreeError> {
        match self.root {
            Some(root) => self.resolve_hashes(root, |_, _| Ok(())),
            None => Ok(EMPTY_HASH),
        }
    }

    pub fn hash_function(&self) -> HashFunction {
        self.config.hash_function
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Returns true if reads on the head are served by the fast cache.
    pub fn is_fast_cache_enabled(&self) -> bool {
        self.fast_live
    }

    /// Returns true if the store holds versions but no live fast cache, so that opening it with
    /// the fast cache enabled would rebuild the fast cache.
    ///
    /// # Errors
    /// Returns `TreeError::Storage` if the backend cannot be read.
    pub fn is_upgradeable(&self) -> Result<bool, TreeError> {
        Ok(self.latest != 0 && !self.ndb.is_fast_cache_live()?)
    }

    /// Returns the number of keys in the working tree.
    ///
    /// # Errors
    /// Returns an error if the root node cannot be loaded.
    pub fn size(&self) -> Result<u64, TreeError> {
        Ok(walk::shape(self, self.root)?.0)
    }

    /// Returns the height of the working tree's root; 0 for empty and single-key trees.
    ///
    /// # Errors
    /// Returns an error if the root node cannot be loaded.
    pub fn height(&self) -> Result<u8, TreeError> {
        Ok(walk::shape(self, self.root)?.1)
    }

    /// Returns the cache counters of the store.
    pub fn statistics(&self) -> TreeStatistics {
        self.ndb.stats().snapshot()
    }

    pub fn reset_statistics(&self) {
        self.ndb.stats().reset()
    }

    // READS
    // --------------------------------------------------------------------------------------------

    /// Returns the value stored under `key` in the working tree.
    ///
    /// With a live fast cache the read never walks the tree.
    ///
    /// # Errors
    /// - `TreeError::EmptyKey` if `key` is empty.
    /// - `TreeError::Corrupt` or `TreeError::Storage` if the backend read fails.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TreeError> {
        check_key(key)?;
        if !self.fast_live {
            return walk::get(self, self.root, key);
        }

        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.map(<[u8]>::to_vec));
        }
        match self.ndb.get_fast_node(key)? {
            Some((_, value)) => {
                self.ndb.stats().record_fast_cache_hit();
                Ok(Some(value))
            },
            None => {
                self.ndb.stats().record_fast_cache_miss();
                Ok(None)
            },
        }
    }

    /// Returns true if `key` is present in the working tree.
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn has(&self, key: &[u8]) -> Result<bool, TreeError> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns the rank of `key` in the working tree and its value.
    ///
    /// # Errors
    /// Same as [`get`](Self::get).
    pub fn get_with_index(&self, key: &[u8]) -> Result<(u64, Option<Vec<u8>>), TreeError> {
        check_key(key)?;
        walk::get_with_index(self, self.root, key)
    }

    /// Returns the entry of rank `index` in the working tree.
    ///
    /// # Errors
    /// Returns an error if a node cannot be loaded.
    pub fn get_by_index(&self, index: u64) -> Result<Option<(Vec<u8>, Vec<u8>)>, TreeError> {
        walk::get_by_index(self, self.root, index)
    }

    /// Returns an iterator over the entries of the working tree with keys in `[start, end)`.
    ///
    /// The iterator reads the fast cache when it is live and walks the tree otherwise.
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
        if self.fast_live {
            let inner = FastIter::new(self.node_db(), &self.staged, start, end, reverse)?;
            Ok(TreeIterator::fast(inner))
        } else {
            Ok(TreeIterator::slow(LeafWalk::new(self, self.root, start, end, reverse)))
        }
    }

    // VERSIONS
    // --------------------------------------------------------------------------------------------

    /// Returns a read-only view of `version`.
    ///
    /// # Errors
    /// Returns `TreeError::VersionNotFound` if the version is not retained.
    pub fn load_version(&self, version: u64) -> Result<ImmutableTree<S>, TreeError> {
        ImmutableTree::load(&self.ndb, version)
    }

    /// Returns the value of `key` at `version`.
    ///
    /// # Errors
    /// - `TreeError::VersionNotFound` if the version is not retained.
    /// - `TreeError::EmptyKey` if `key` is empty.
    pub fn get_versioned(&self, key: &[u8], version: u64) -> Result<Option<Vec<u8>>, TreeError> {
        self.load_version(version)?.get(key)
    }

    pub fn version_exists(&self, version: u64) -> Result<bool, TreeError> {
        self.ndb.version_exists(version)
    }

    /// Returns the retained versions in ascending order.
    pub fn available_versions(&self) -> Result<Vec<u64>, TreeError> {
        self.ndb.versions()
    }

    /// Returns the root hash of `version`.
    ///
    /// # Errors
    /// Returns `TreeError::VersionNotFound` if the version is not retained.
    pub fn version_hash(&self, version: u64) -> Result<NodeHash, TreeError> {
        self.ndb.root_of(version)?.ok_or(TreeError::VersionNotFound(version))
    }

    /// Sets the version of the first commit. Only allowed on an empty store with no pending
    /// changes, since pending leaves are already stamped with the working version.
    ///
    /// # Errors
    /// Returns `TreeError::InvalidArgument` if the store already holds versions or the working
    /// tree has uncommitted keys.
    pub fn set_initial_version(&mut self, version: u64) -> Result<(), TreeError> {
        if self.latest != 0 {
            return Err(TreeError::InvalidArgument(format!(
                "initial version cannot change after version {} was committed",
                self.latest
            )));
        }
        if self.root.is_some() {
            return Err(TreeError::InvalidArgument(
                "initial version cannot change while changes are pending".to_string(),
            ));
        }
        self.config.initial_version = version;
        Ok(())
    }

    // MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Inserts or updates `key`. Returns true if the key existed before.
    ///
    /// Setting a key to its current value still creates a new leaf at the working version, so
    /// the root hash changes on the next commit.
    ///
    /// # Errors
    /// - `TreeError::EmptyKey` if `key` is empty.
    /// - `TreeError::Corrupt` or `TreeError::Storage` if a node cannot be loaded; the working
    ///   tree is then unchanged.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<bool, TreeError> {
        check_key(key)?;
        let version = self.working_version();

        let result = match self.root {
            None => Ok((self.stage(Node::new_leaf(key.to_vec(), value.to_vec(), version)), false)),
            Some(root) => self.insert(root, key, value, version),
        };
        let (root, updated) = self.settle(result)?;
        self.root = Some(root);
        if self.fast_live {
            self.staged.set(key, value);
        }
        Ok(updated)
    }

    /// Removes `key` and returns its value, or `None` if the key was absent.
    ///
    /// # Errors
    /// - `TreeError::EmptyKey` if `key` is empty.
    /// - `TreeError::Corrupt` or `TreeError::Storage` if a node cannot be loaded; the working
    ///   tree is then unchanged.
    pub fn remove(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, TreeError> {
        check_key(key)?;
        let Some(root) = self.root else {
            return Ok(None);
        };

        let result = self.remove_from(root, key);
        let Some(removal) = self.settle(result)? else {
            return Ok(None);
        };

        self.root = removal.replacement;
        if self.fast_live {
            self.staged.remove(key);
        }
        Ok(Some(removal.value))
    }

    /// Discards all changes made since the last commit.
    pub fn rollback(&mut self) {
        self.root = self.saved_root.map(NodeRef::Stored);
        self.dirty.clear();
        self.orphans.clear();
        self.staged.clear();
    }

    /// Commits the working tree as a new version and returns its root hash and version.
    ///
    /// New nodes, orphan records, the version entry, the latest-version pointer and the fast
    /// cache changes are written in a single atomic batch. If the batch fails, the tree is left
    /// exactly as before the call. Versions outside the retention window are deleted afterwards.
    ///
    /// # Errors
    /// - `TreeError::InvalidArgument` if no version number is left.
    /// - `TreeError::Corrupt` if a working node cannot be resolved.
    /// - `TreeError::Storage` if the batch cannot be committed.
    pub fn save_version(&mut self) -> Result<(NodeHash, u64), TreeError> {
        if self.latest == u64::MAX {
            return Err(TreeError::InvalidArgument("version numbers are exhausted".to_string()));
        }
        let version = self.working_version();

        let write_guard = self.ndb.write_lock()?;
        let mut batch = WriteBatch::new();
        let mut saved = Vec::new();

        let root = match self.root {
            Some(root) => self.resolve_hashes(root, |hash, node| {
                let bytes = codec::encode_node(&node).ok_or(CorruptionError::DanglingPendingNode)?;
                batch.put(keys::node_key(&hash), bytes);
                saved.push((hash, Arc::new(node)));
                Ok(())
            })?,
            None => EMPTY_HASH,
        };

        if self.latest != 0 {
            for hash in &self.orphans {
                let record = OrphanRecord { last_ref_version: self.latest, hash: *hash };
                batch.put(record.key(), Vec::new());
            }
        } else {
            batch.put(keys::HASH_FUNCTION_KEY, [self.config.hash_function.id()]);
        }
        batch.put(keys::version_key(version), root);
        batch.put(keys::LATEST_VERSION_KEY, keys::encode_latest_version(version));

        if self.fast_live {
            self.staged.stage_into(version, &mut batch);
            batch.put(keys::FAST_LIVE_KEY, keys::FAST_LIVE_VALUE);
        } else {
            batch.delete(keys::FAST_LIVE_KEY);
        }

        self.ndb.storage().write(batch)?;
        self.ndb.register_version(version, root)?;
        drop(write_guard);

        debug!(version, nodes = saved.len(), orphans = self.orphans.len(), "saved version");
        self.latest = version;
        self.saved_root = (root != EMPTY_HASH).then_some(root);
        self.root = self.saved_root.map(NodeRef::Stored);
        self.dirty.clear();
        self.orphans.clear();
        self.staged.clear();
        for (hash, node) in saved {
            self.ndb.cache_node(hash, node)?;
        }

        self.prune_versions();
        Ok((root, version))
    }

    /// Deletes `version` and garbage-collects the nodes only it references.
    ///
    /// If readers still hold the version, it disappears from the version index at once and its
    /// nodes are collected when the last reader is dropped.
    ///
    /// # Errors
    /// - `TreeError::VersionInUse` if `version` is the latest version.
    /// - `TreeError::VersionNotFound` if the version is not retained.
    /// - `TreeError::Storage` if the deletion cannot be committed.
    pub fn delete_version(&mut self, version: u64) -> Result<(), TreeError> {
        self.ndb.delete_version(version, self.latest)
    }

    /// Deletes each of `versions`, one atomic batch per version, stopping at the first failure.
    ///
    /// # Errors
    /// See [`delete_version`](Self::delete_version).
    pub fn delete_versions(&mut self, versions: &[u64]) -> Result<(), TreeError> {
        if versions.contains(&self.latest) {
            return Err(TreeError::VersionInUse(self.latest));
        }
        for &version in versions {
            self.delete_version(version)?;
        }
        Ok(())
    }

    /// Deletes every retained version in `[from, to)`.
    ///
    /// # Errors
    /// - `TreeError::VersionInUse` if the range contains the latest version; nothing is deleted
    ///   then.
    /// - `TreeError::Storage` if a deletion cannot be committed.
    pub fn delete_versions_range(&mut self, from: u64, to: u64) -> Result<(), TreeError> {
        if (from..to).contains(&self.latest) {
            return Err(TreeError::VersionInUse(self.latest));
        }
        let targets: Vec<u64> =
            self.available_versions()?.into_iter().filter(|v| (from..to).contains(v)).collect();
        for version in targets {
            self.delete_version(version)?;
        }
        Ok(())
    }

    /// Starts importing an exported tree, to be committed as `version`.
    ///
    /// # Errors
    /// Returns `TreeError::InvalidArgument` if the store already holds versions or the working
    /// tree has changes, or if `version` is 0.
    pub fn import(&mut self, version: u64) -> Result<Importer<'_, S>, TreeError> {
        if version == 0 {
            return Err(TreeError::InvalidArgument("cannot import as version 0".to_string()));
        }
        if self.latest != 0 || self.ndb.version_count()? != 0 || self.root.is_some() {
            return Err(TreeError::InvalidArgument(
                "import requires an empty store".to_string(),
            ));
        }

        // the fast cache is not live until the import is committed
        let fast = self.fast_live;
        if fast {
            let mut batch = WriteBatch::new();
            batch.delete(keys::FAST_LIVE_KEY);
            self.ndb.storage().write(batch)?;
            self.fast_live = false;
        }
        Ok(Importer::new(self, version, fast))
    }

    // INTERNALS
    // --------------------------------------------------------------------------------------------

    pub(crate) fn node_db(&self) -> &NodeDb<S> {
        &self.ndb
    }

    #[cfg(test)]
    pub(crate) fn working_root(&self) -> Option<NodeRef> {
        self.root
    }

    /// Writes the final batch of an import and makes the imported version the latest one.
    pub(crate) fn commit_import(
        &mut self,
        version: u64,
        root: NodeHash,
        mut batch: WriteBatch,
    ) -> Result<(), TreeError> {
        let fast = self.config.fast_cache_enabled;
        let write_guard = self.ndb.write_lock()?;
        batch.put(keys::HASH_FUNCTION_KEY, [self.config.hash_function.id()]);
        batch.put(keys::version_key(version), root);
        batch.put(keys::LATEST_VERSION_KEY, keys::encode_latest_version(version));
        if fast {
            batch.put(keys::FAST_LIVE_KEY, keys::FAST_LIVE_VALUE);
        }
        self.ndb.storage().write(batch)?;
        self.ndb.register_version(version, root)?;
        drop(write_guard);

        self.latest = version;
        self.saved_root = (root != EMPTY_HASH).then_some(root);
        self.root = self.saved_root.map(NodeRef::Stored);
        self.fast_live = fast;
        Ok(())
    }

    /// Deletes the oldest versions beyond the retention window.
    fn prune_versions(&mut self) {
        let Retention::KeepRecent(keep) = self.config.retention else {
            return;
        };
        let versions = match self.available_versions() {
            Ok(versions) => versions,
            Err(e) => {
                warn!(error = %e, "failed to list versions for pruning");
                return;
            },
        };
        let excess = (versions.len() as u64).saturating_sub(keep) as usize;
        for version in versions.into_iter().take(excess) {
            if let Err(e) = self.delete_version(version) {
                warn!(version, error = %e, "failed to prune version");
                return;
            }
        }
    }

    // WORKING TREE
    // --------------------------------------------------------------------------------------------

    fn stage(&mut self, node: Node) -> NodeRef {
        let id = self.next_pending;
        self.next_pending += 1;
        self.dirty.insert(id, Arc::new(node));
        self.undo.push(Undo::Staged(id));
        NodeRef::Pending(id)
    }

    /// Drops a node from the working tree. Saved nodes are remembered as orphans.
    fn discard(&mut self, node_ref: NodeRef) {
        match node_ref {
            NodeRef::Stored(hash) => {
                if self.orphans.insert(hash) {
                    self.undo.push(Undo::Orphaned(hash));
                }
            },
            NodeRef::Pending(id) => {
                if let Some(node) = self.dirty.remove(&id) {
                    self.undo.push(Undo::Discarded(id, node));
                }
            },
        }
    }

    /// Finishes a mutation: keeps its changes on success and reverts them on failure.
    fn settle<T>(&mut self, result: Result<T, TreeError>) -> Result<T, TreeError> {
        if result.is_err() {
            while let Some(change) = self.undo.pop() {
                match change {
                    Undo::Staged(id) => {
                        self.dirty.remove(&id);
                    },
                    Undo::Discarded(id, node) => {
                        self.dirty.insert(id, node);
                    },
                    Undo::Orphaned(hash) => {
                        self.orphans.remove(&hash);
                    },
                }
            }
        }
        self.undo.clear();
        result
    }

    /// Stages an inner node over `left` and `right`, computing its height and size.
    fn make_inner(
        &mut self,
        key: Vec<u8>,
        left: NodeRef,
        right: NodeRef,
        version: u64,
    ) -> Result<NodeRef, TreeError> {
        let (l, r) = (self.load(&left)?, self.load(&right)?);
        Ok(self.stage(Node::Inner(InnerNode {
            key,
            height: l.height().max(r.height()) + 1,
            size: l.size() + r.size(),
            version,
            left,
            right,
        })))
    }

    /// Stages an inner node over `left` and `right`, rotating if the children's heights differ
    /// by more than one.
    fn make_balanced(
        &mut self,
        key: Vec<u8>,
        left: NodeRef,
        right: NodeRef,
        version: u64,
    ) -> Result<NodeRef, TreeError> {
        let (l, r) = (self.load(&left)?, self.load(&right)?);
        let balance = i16::from(l.height()) - i16::from(r.height());

        if balance > 1 {
            let Node::Inner(li) = l.as_ref() else {
                return Err(CorruptionError::DanglingPendingNode.into());
            };
            let (ll, lr) = (self.load(&li.left)?, self.load(&li.right)?);
            self.discard(left);
            if ll.height() >= lr.height() {
                // single right rotation
                let new_right = self.make_inner(key, li.right, right, version)?;
                return self.make_inner(li.key.clone(), li.left, new_right, version);
            }
            // left-right rotation
            let Node::Inner(lri) = lr.as_ref() else {
                return Err(CorruptionError::DanglingPendingNode.into());
            };
            self.discard(li.right);
            let new_left = self.make_inner(li.key.clone(), li.left, lri.left, version)?;
            let new_right = self.make_inner(key, lri.right, right, version)?;
            return self.make_inner(lri.key.clone(), new_left, new_right, version);
        }

        if balance < -1 {
            let Node::Inner(ri) = r.as_ref() else {
                return Err(CorruptionError::DanglingPendingNode.into());
            };
            let (rl, rr) = (self.load(&ri.left)?, self.load(&ri.right)?);
            self.discard(right);
            if rr.height() >= rl.height() {
                // single left rotation
                let new_left = self.make_inner(key, left, ri.left, version)?;
                return self.make_inner(ri.key.clone(), new_left, ri.right, version);
            }
            // right-left rotation
            let Node::Inner(rli) = rl.as_ref() else {
                return Err(CorruptionError::DanglingPendingNode.into());
            };
            self.discard(ri.left);
            let new_left = self.make_inner(key, left, rli.left, version)?;
            let new_right = self.make_inner(ri.key.clone(), rli.right, ri.right, version)?;
            return self.make_inner(rli.key.clone(), new_left, new_right, version);
        }

        self.make_inner(key, left, right, version)
    }

    fn insert(
        &mut self,
        node_ref: NodeRef,
        key: &[u8],
        value: &[u8],
        version: u64,
    ) -> Result<(NodeRef, bool), TreeError> {
        let node = self.load(&node_ref)?;
        match node.as_ref() {
            Node::Leaf(leaf) => {
                let new_leaf = self.stage(Node::new_leaf(key.to_vec(), value.to_vec(), version));
                match key.cmp(&leaf.key) {
                    core::cmp::Ordering::Equal => {
                        self.discard(node_ref);
                        Ok((new_leaf, true))
                    },
                    core::cmp::Ordering::Less => {
                        let inner = self.make_inner(leaf.key.clone(), new_leaf, node_ref, version)?;
                        Ok((inner, false))
                    },
                    core::cmp::Ordering::Greater => {
                        let inner = self.make_inner(key.to_vec(), node_ref, new_leaf, version)?;
                        Ok((inner, false))
                    },
                }
            },
            Node::Inner(inner) => {
                let (left, right, updated) = if key < inner.key.as_slice() {
                    let (left, updated) = self.insert(inner.left, key, value, version)?;
                    (left, inner.right, updated)
                } else {
                    let (right, updated) = self.insert(inner.right, key, value, version)?;
                    (inner.left, right, updated)
                };
                self.discard(node_ref);
                let balanced = self.make_balanced(inner.key.clone(), left, right, version)?;
                Ok((balanced, updated))
            },
        }
    }

    /// Removes `key` from the subtree at `node_ref`. Returns `None` if the key is absent, in
    /// which case the working tree is untouched.
    fn remove_from(&mut self, node_ref: NodeRef, key: &[u8]) -> Result<Option<Removal>, TreeError> {
        let node = self.load(&node_ref)?;
        let version = self.working_version();
        match node.as_ref() {
            Node::Leaf(leaf) => {
                if leaf.key != key {
                    return Ok(None);
                }
                self.discard(node_ref);
                Ok(Some(Removal {
                    value: leaf.value.clone(),
                    replacement: None,
                    new_key: None,
                }))
            },
            Node::Inner(inner) if key < inner.key.as_slice() => {
                let Some(removal) = self.remove_from(inner.left, key)? else {
                    return Ok(None);
                };
                self.discard(node_ref);
                let Some(new_left) = removal.replacement else {
                    // the left child was the removed leaf; the right subtree takes our place and
                    // our split key becomes the smallest key of the result
                    return Ok(Some(Removal {
                        value: removal.value,
                        replacement: Some(inner.right),
                        new_key: Some(inner.key.clone()),
                    }));
                };
                let replacement =
                    self.make_balanced(inner.key.clone(), new_left, inner.right, version)?;
                Ok(Some(Removal {
                    value: removal.value,
                    replacement: Some(replacement),
                    new_key: removal.new_key,
                }))
            },
            Node::Inner(inner) => {
                let Some(removal) = self.remove_from(inner.right, key)? else {
                    return Ok(None);
                };
                self.discard(node_ref);
                let Some(new_right) = removal.replacement else {
                    return Ok(Some(Removal {
                        value: removal.value,
                        replacement: Some(inner.left),
                        new_key: None,
                    }));
                };
                let split = removal.new_key.unwrap_or_else(|| inner.key.clone());
                let replacement = self.make_balanced(split, inner.left, new_right, version)?;
                Ok(Some(Removal {
                    value: removal.value,
                    replacement: Some(replacement),
                    new_key: None,
                }))
            },
        }
    }

    /// Computes the hashes of the pending nodes below `root`, children first.
    ///
    /// `visit` receives every pending node, rewritten to reference its children by hash, together
    /// with its hash. Returns the hash of `root`.
    fn resolve_hashes(
        &self,
        root: NodeRef,
        mut visit: impl FnMut(NodeHash, Node) -> Result<(), TreeError>,
    ) -> Result<NodeHash, TreeError> {
        let root_id = match root {
            NodeRef::Stored(hash) => return Ok(hash),
            NodeRef::Pending(id) => id,
        };
        let hasher = self.config.hash_function;
        let mut resolved: HashMap<PendingId, NodeHash> = HashMap::new();
        let resolve = |node_ref: NodeRef, resolved: &HashMap<PendingId, NodeHash>| match node_ref {
            NodeRef::Stored(hash) => Ok(hash),
            NodeRef::Pending(id) => {
                resolved.get(&id).copied().ok_or(CorruptionError::DanglingPendingNode)
            },
        };

        let mut stack = vec![(root_id, false)];
        while let Some((id, expanded)) = stack.pop() {
            let node = self.dirty.get(&id).ok_or(CorruptionError::DanglingPendingNode)?;
            let node = match node.as_ref() {
                Node::Leaf(leaf) => Node::Leaf(leaf.clone()),
                Node::Inner(inner) if !expanded => {
                    stack.push((id, true));
                    for child in [inner.right, inner.left] {
                        if let NodeRef::Pending(child) = child {
                            stack.push((child, false));
                        }
                    }
                    continue;
                },
                Node::Inner(inner) => Node::Inner(InnerNode {
                    left: NodeRef::Stored(resolve(inner.left, &resolved)?),
                    right: NodeRef::Stored(resolve(inner.right, &resolved)?),
                    ..inner.clone()
                }),
            };
            let hash = node.hash(hasher).ok_or(CorruptionError::DanglingPendingNode)?;
            resolved.insert(id, hash);
            visit(hash, node)?;
        }

        Ok(resolve(root, &resolved)?)
    }
}

impl<S: KvStore> NodeSource for MutableTree<S> {
    fn load(&self, node: &NodeRef) -> Result<Arc<Node>, TreeError> {
        match node {
            NodeRef::Stored(hash) => self.ndb.get_node(hash),
            NodeRef::Pending(id) => {
                Ok(self.dirty.get(id).cloned().ok_or(CorruptionError::DanglingPendingNode)?)
            },
        }
    }
}

/// A change to the working tree, recorded so that a failed mutation can be reverted.
#[derive(Debug)]
enum Undo {
    Staged(PendingId),
    Discarded(PendingId, Arc<Node>),
    Orphaned(NodeHash),
}

// HELPERS
// ================================================================================================

/// Checks the hash function identifier persisted in `storage`, if any.
fn check_hash_function<S: KvStore>(storage: &S, configured: HashFunction) -> Result<(), TreeError> {
    let Some(bytes) = storage.get(keys::HASH_FUNCTION_KEY)? else {
        return Ok(());
    };
    let id = match bytes.as_slice() {
        [id] => *id,
        _ => 0,
    };
    let stored = HashFunction::from_id(id).ok_or(CorruptionError::UnknownHashFunction(id))?;
    if stored != configured {
        return Err(TreeError::HashFunctionMismatch { stored, configured });
    }
    Ok(())
}
