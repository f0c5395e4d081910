use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::{
    codec,
    error::{CorruptionError, TreeError},
    keys::{self, OrphanRecord},
    node::Node,
    stats::Statistics,
    versions::VersionIndex,
};
use crate::{
    cache::{Cache, CacheEntry, LruCache},
    hash::{HashFunction, NodeHash},
    storage::{KvStore, WriteBatch},
};

// CACHED NODE
// ================================================================================================

/// A decoded node kept in the node cache, keyed by its hash.
#[derive(Debug, Clone)]
pub(crate) struct CachedNode {
    hash: NodeHash,
    node: Arc<Node>,
}

impl CacheEntry for CachedNode {
    type Key = NodeHash;

    fn cache_key(&self) -> &NodeHash {
        &self.hash
    }
}

// NODE DB
// ================================================================================================

/// Access layer shared by the mutable tree and every immutable tree of one store.
///
/// Owns the backend, the node cache and the in-memory version index. Every batch that changes
/// the version index (save, delete, deferred collection) is written while holding `write_lock`,
/// so those batches are totally ordered.
#[derive(Debug)]
pub(crate) struct NodeDb<S: KvStore> {
    storage: S,
    hasher: HashFunction,
    cache: Mutex<LruCache<CachedNode>>,
    stats: Statistics,
    versions: RwLock<VersionIndex>,
    write_lock: Mutex<()>,
}

impl<S: KvStore> NodeDb<S> {
    pub fn new(storage: S, hasher: HashFunction, cache_capacity: usize) -> Self {
        Self {
            storage,
            hasher,
            cache: Mutex::new(LruCache::new(cache_capacity)),
            stats: Statistics::default(),
            versions: RwLock::new(VersionIndex::default()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn hasher(&self) -> HashFunction {
        self.hasher
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Serializes writers of the version index.
    pub fn write_lock(&self) -> Result<MutexGuard<'_, ()>, TreeError> {
        Ok(self.write_lock.lock()?)
    }

    // NODES
    // --------------------------------------------------------------------------------------------

    /// Loads the node stored under `hash`, consulting the node cache first.
    ///
    /// Nodes read from the backend are verified against their hash before they are cached.
    ///
    /// # Errors
    /// - `TreeError::Corrupt` if the node is missing, fails to decode, or hashes to a different
    ///   value.
    /// - `TreeError::Storage` if the backend read fails.
    pub fn get_node(&self, hash: &NodeHash) -> Result<Arc<Node>, TreeError> {
        if let Some(entry) = self.cache.lock()?.get(hash) {
            self.stats.record_cache_hit();
            return Ok(entry.node.clone());
        }
        self.stats.record_cache_miss();

        let bytes = self
            .storage
            .get(&keys::node_key(hash))?
            .ok_or(CorruptionError::MissingNode(*hash))?;
        let node = codec::decode_node(&bytes)?;
        // decoded nodes only have stored children, so the hash is always defined
        let found = node.hash(self.hasher).ok_or(CorruptionError::DanglingPendingNode)?;
        if &found != hash {
            return Err(CorruptionError::HashMismatch { expected: *hash, found }.into());
        }

        let node = Arc::new(node);
        self.cache_node(*hash, node.clone())?;
        Ok(node)
    }

    pub fn cache_node(&self, hash: NodeHash, node: Arc<Node>) -> Result<(), TreeError> {
        self.cache.lock()?.add(CachedNode { hash, node });
        Ok(())
    }

    fn evict_nodes(&self, hashes: &[NodeHash]) -> Result<(), TreeError> {
        let mut cache = self.cache.lock()?;
        for hash in hashes {
            cache.remove(hash);
        }
        Ok(())
    }

    // FAST NODES
    // --------------------------------------------------------------------------------------------

    /// Reads the fast node of `key` as `(version, value)`.
    pub fn get_fast_node(&self, key: &[u8]) -> Result<Option<(u64, Vec<u8>)>, TreeError> {
        match self.storage.get(&keys::fast_key(key))? {
            Some(bytes) => Ok(Some(codec::decode_fast_node(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn is_fast_cache_live(&self) -> Result<bool, TreeError> {
        Ok(self.storage.get(keys::FAST_LIVE_KEY)?.as_deref() == Some(keys::FAST_LIVE_VALUE))
    }

    // VERSION INDEX
    // --------------------------------------------------------------------------------------------

    /// Reads the persisted version index into memory.
    ///
    /// # Errors
    /// Returns `TreeError::Corrupt` if an entry is malformed.
    pub fn load_version_index(&self) -> Result<(), TreeError> {
        let (start, end) = keys::version_range();
        let mut index = self.versions.write()?;
        for item in self.storage.iter(Some(&start), Some(&end), false)? {
            let (key, value) = item?;
            let version = keys::parse_version_key(&key).ok_or(CorruptionError::BadVersionEntry)?;
            let root: NodeHash =
                value.as_slice().try_into().map_err(|_| CorruptionError::BadVersionEntry)?;
            index.insert(version, root);
        }
        Ok(())
    }

    /// Reads the latest-version pointer; 0 if nothing was ever committed.
    pub fn load_latest_version(&self) -> Result<u64, TreeError> {
        match self.storage.get(keys::LATEST_VERSION_KEY)? {
            Some(value) => {
                Ok(keys::decode_latest_version(&value).ok_or(CorruptionError::BadLatestPointer)?)
            },
            None => Ok(0),
        }
    }

    pub fn root_of(&self, version: u64) -> Result<Option<NodeHash>, TreeError> {
        Ok(self.versions.read()?.get(version))
    }

    pub fn version_exists(&self, version: u64) -> Result<bool, TreeError> {
        Ok(self.versions.read()?.contains(version))
    }

    pub fn versions(&self) -> Result<Vec<u64>, TreeError> {
        Ok(self.versions.read()?.versions().collect())
    }

    pub fn version_count(&self) -> Result<usize, TreeError> {
        Ok(self.versions.read()?.len())
    }

    /// Records a version whose batch has been committed.
    pub fn register_version(&self, version: u64, root: NodeHash) -> Result<(), TreeError> {
        self.versions.write()?.insert(version, root);
        Ok(())
    }

    /// Pins `version` for a reader, returning its root hash and the pin.
    ///
    /// # Errors
    /// Returns `TreeError::VersionNotFound` if the version is not retained.
    pub fn pin(self: &Arc<Self>, version: u64) -> Result<(NodeHash, VersionPin<S>), TreeError> {
        let mut index = self.versions.write()?;
        let root = index.get(version).ok_or(TreeError::VersionNotFound(version))?;
        index.pin(version);
        Ok((root, VersionPin { ndb: self.clone(), version }))
    }

    // GARBAGE COLLECTION
    // --------------------------------------------------------------------------------------------

    /// Deletes `version` and the nodes no other retained version references.
    ///
    /// If readers still hold the version, it is removed from the index at once and its nodes
    /// are collected when the last reader drops it.
    ///
    /// # Errors
    /// - `TreeError::VersionInUse` if `version` is `latest`.
    /// - `TreeError::VersionNotFound` if `version` is not retained.
    /// - `TreeError::Corrupt` if an orphan record is malformed.
    /// - `TreeError::Storage` if the batch cannot be committed; the version is then kept.
    pub fn delete_version(&self, version: u64, latest: u64) -> Result<(), TreeError> {
        if version == latest {
            return Err(TreeError::VersionInUse(version));
        }
        let _guard = self.write_lock()?;

        // Taking the version out of the index first keeps new readers from pinning it while
        // its nodes are collected.
        let (root, deferred) = {
            let mut index = self.versions.write()?;
            let root = index.remove(version).ok_or(TreeError::VersionNotFound(version))?;
            let deferred = index.is_pinned(version);
            if deferred {
                index.defer(version);
            }
            (root, deferred)
        };

        let result = self.delete_version_batch(version, deferred);
        match result {
            Ok(removed) => {
                self.evict_nodes(&removed)?;
                debug!(version, deferred, nodes_removed = removed.len(), "deleted version");
                Ok(())
            },
            Err(e) => {
                let mut index = self.versions.write()?;
                index.insert(version, root);
                index.clear_deferred(version);
                Err(e)
            },
        }
    }

    fn delete_version_batch(&self, version: u64, deferred: bool) -> Result<Vec<NodeHash>, TreeError> {
        let mut batch = WriteBatch::new();
        batch.delete(keys::version_key(version));
        let removed = if deferred {
            Vec::new()
        } else {
            self.collect_orphans(version, &mut batch)?
        };
        self.storage.write(batch)?;
        Ok(removed)
    }

    /// Stages the collection of every node whose last referencing version is `version`.
    ///
    /// A node created at or before the closest live version below `version` is still referenced
    /// by it, so its orphan record is moved to that version; any other node is deleted. Returns
    /// the deleted hashes.
    fn collect_orphans(
        &self,
        version: u64,
        batch: &mut WriteBatch,
    ) -> Result<Vec<NodeHash>, TreeError> {
        let predecessor = self.versions.read()?.predecessor(version);
        let (start, end) = keys::orphan_range(version);

        let mut removed = Vec::new();
        for item in self.storage.iter(Some(&start), Some(&end), false)? {
            let (key, _) = item?;
            let record = OrphanRecord::from_key(&key).ok_or(CorruptionError::BadOrphanRecord)?;
            batch.delete(key);
            let still_referenced = match predecessor {
                Some(previous) => self.get_node(&record.hash)?.version() <= previous,
                None => false,
            };
            match predecessor {
                Some(previous) if still_referenced => {
                    let moved = OrphanRecord { last_ref_version: previous, ..record };
                    batch.put(moved.key(), Vec::new());
                },
                _ => {
                    batch.delete(keys::node_key(&record.hash));
                    removed.push(record.hash);
                },
            }
        }
        Ok(removed)
    }

    /// Drops a reader of `version`, collecting the version if it was deleted meanwhile.
    fn release(&self, version: u64) {
        let collect = self.versions.write().unwrap_or_else(PoisonError::into_inner).unpin(version);
        if collect {
            if let Err(e) = self.collect_deferred(version) {
                warn!(version, error = %e, "failed to collect deleted version");
            }
        }
    }

    fn collect_deferred(&self, version: u64) -> Result<(), TreeError> {
        let _guard = self.write_lock()?;
        {
            let index = self.versions.read()?;
            if !index.is_deferred(version) || index.is_pinned(version) {
                return Ok(());
            }
        }

        let mut batch = WriteBatch::new();
        let removed = self.collect_orphans(version, &mut batch)?;
        self.storage.write(batch)?;
        self.versions.write()?.clear_deferred(version);
        self.evict_nodes(&removed)?;
        debug!(version, nodes_removed = removed.len(), "collected deferred version");
        Ok(())
    }

    /// Collects orphan records left behind by versions that are no longer indexed.
    ///
    /// Such records remain when a store is closed while a deleted version still had readers.
    pub fn recover_orphans(&self) -> Result<(), TreeError> {
        let _guard = self.write_lock()?;
        let mut from = 0u64;
        loop {
            let (start, end) = keys::orphans_from(from);
            let next = self.storage.iter(Some(&start), Some(&end), false)?.next().transpose()?;
            let Some((key, _)) = next else {
                return Ok(());
            };
            let record = OrphanRecord::from_key(&key).ok_or(CorruptionError::BadOrphanRecord)?;
            let version = record.last_ref_version;

            if !self.versions.read()?.contains(version) {
                let mut batch = WriteBatch::new();
                let removed = self.collect_orphans(version, &mut batch)?;
                self.storage.write(batch)?;
                self.evict_nodes(&removed)?;
                info!(version, nodes_removed = removed.len(), "collected orphans of deleted version");
            }

            match version.checked_add(1) {
                Some(next) => from = next,
                None => return Ok(()),
            }
        }
    }
}

// VERSION PIN
// ================================================================================================

/// Keeps a version's nodes alive while a reader holds it.
#[derive(Debug)]
pub(crate) struct VersionPin<S: KvStore> {
    ndb: Arc<NodeDb<S>>,
    version: u64,
}

impl<S: KvStore> Clone for VersionPin<S> {
    fn clone(&self) -> Self {
        self.ndb
            .versions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_reader(self.version);
        Self { ndb: self.ndb.clone(), version: self.version }
    }
}

impl<S: KvStore> Drop for VersionPin<S> {
    fn drop(&mut self) {
        self.ndb.release(self.version);
    }
}
