use std::collections::{BTreeMap, BTreeSet};

use crate::hash::NodeHash;

/// In-memory view of the version index together with reader pins.
///
/// A version that is deleted while readers still hold it leaves `roots` immediately, so it can
/// no longer be loaded, but stays in `deferred` until the last reader is gone. Nodes of deferred
/// versions are kept in the backend until then.
#[derive(Debug, Default)]
pub(crate) struct VersionIndex {
    roots: BTreeMap<u64, NodeHash>,
    readers: BTreeMap<u64, usize>,
    deferred: BTreeSet<u64>,
}

impl VersionIndex {
    pub fn insert(&mut self, version: u64, root: NodeHash) {
        self.roots.insert(version, root);
    }

    pub fn remove(&mut self, version: u64) -> Option<NodeHash> {
        self.roots.remove(&version)
    }

    pub fn get(&self, version: u64) -> Option<NodeHash> {
        self.roots.get(&version).copied()
    }

    pub fn contains(&self, version: u64) -> bool {
        self.roots.contains_key(&version)
    }

    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.roots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Returns the greatest version below `version` whose nodes must stay in the backend.
    pub fn predecessor(&self, version: u64) -> Option<u64> {
        let retained = self.roots.range(..version).next_back().map(|(v, _)| *v);
        let deferred = self.deferred.range(..version).next_back().copied();
        retained.max(deferred)
    }

    // READERS
    // --------------------------------------------------------------------------------------------

    /// Registers a reader of a retained version. Returns false if the version is not retained.
    pub fn pin(&mut self, version: u64) -> bool {
        if !self.contains(version) {
            return false;
        }
        self.add_reader(version);
        true
    }

    /// Registers another reader of a version that already has one.
    pub fn add_reader(&mut self, version: u64) {
        *self.readers.entry(version).or_insert(0) += 1;
    }

    /// Drops a reader. Returns true if this was the last reader of a deferred version, whose
    /// nodes may now be collected.
    pub fn unpin(&mut self, version: u64) -> bool {
        let Some(count) = self.readers.get_mut(&version) else {
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.readers.remove(&version);
        self.deferred.contains(&version)
    }

    pub fn is_pinned(&self, version: u64) -> bool {
        self.readers.contains_key(&version)
    }

    // DEFERRED COLLECTION
    // --------------------------------------------------------------------------------------------

    pub fn defer(&mut self, version: u64) {
        self.deferred.insert(version);
    }

    pub fn is_deferred(&self, version: u64) -> bool {
        self.deferred.contains(&version)
    }

    /// Forgets a deferred version, either because it was collected or because its deletion
    /// failed.
    pub fn clear_deferred(&mut self, version: u64) {
        self.deferred.remove(&version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pins_track_readers() {
        let mut index = VersionIndex::default();
        index.insert(1, [1; 32]);
        assert!(!index.pin(2));
        assert!(index.pin(1));
        index.add_reader(1);
        assert!(!index.unpin(1));
        assert!(index.is_pinned(1));
        assert!(!index.unpin(1));
        assert!(!index.is_pinned(1));
        assert!(!index.unpin(1));
    }

    #[test]
    fn last_reader_of_deferred_version_triggers_collection() {
        let mut index = VersionIndex::default();
        index.insert(3, [3; 32]);
        assert!(index.pin(3));
        index.remove(3);
        index.defer(3);
        assert!(index.unpin(3));
    }

    #[test]
    fn predecessor_considers_deferred_versions() {
        let mut index = VersionIndex::default();
        index.insert(1, [1; 32]);
        index.insert(5, [5; 32]);
        assert_eq!(index.predecessor(5), Some(1));
        assert_eq!(index.predecessor(1), None);
        index.defer(3);
        assert_eq!(index.predecessor(5), Some(3));
        assert_eq!(index.predecessor(3), Some(1));
        assert_eq!(index.predecessor(9), Some(5));
    }
}
