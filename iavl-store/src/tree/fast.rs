//! Fast cache: a flat `key -> (version, value)` index of the head kept under [FAST_PREFIX].
//!
//! [FAST_PREFIX]: super::keys::FAST_PREFIX

use std::{collections::BTreeMap, iter::Peekable, ops::Bound, vec};

use tracing::info;

use super::{
    codec,
    error::{CorruptionError, TreeError},
    keys,
    node::NodeRef,
    node_db::NodeDb,
    walk::{LeafWalk, NodeSource},
};
use crate::storage::{KvIter, KvPair, KvStore, WriteBatch};

// STAGED CHANGES
// ================================================================================================

/// Fast cache changes made since the last commit.
///
/// `Some(value)` stages a write of `value` at the working version, `None` stages a deletion.
#[derive(Debug, Default, Clone)]
pub(crate) struct StagedChanges {
    entries: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl StagedChanges {
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.entries.insert(key.to_vec(), Some(value.to_vec()));
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.entries.insert(key.to_vec(), None);
    }

    /// Returns `Some(None)` for a staged deletion and `None` if the key is untouched.
    pub fn get(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.entries.get(key).map(Option::as_deref)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Adds the staged changes, committed at `version`, to `batch`.
    pub fn stage_into(&self, version: u64, batch: &mut WriteBatch) {
        for (key, value) in &self.entries {
            match value {
                Some(value) => batch.put(keys::fast_key(key), codec::encode_fast_node(version, value)),
                None => batch.delete(keys::fast_key(key)),
            }
        }
    }

    /// Copies the staged changes within `[start, end)`, in iteration order.
    fn snapshot(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        let lower = start.map_or(Bound::Unbounded, Bound::Included);
        let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Vec::new();
            }
        }
        let range = self
            .entries
            .range::<[u8], _>((lower, upper))
            .map(|(key, value)| (key.clone(), value.clone()));
        if reverse {
            range.rev().collect()
        } else {
            range.collect()
        }
    }
}

// FAST ITERATOR
// ================================================================================================

/// Ordered iteration over the head through the fast cache.
///
/// Merges a backend cursor over the committed fast nodes with a copy of the staged changes taken
/// when the iterator is created. Staged entries take precedence over committed ones.
pub(crate) struct FastIter<'a> {
    backend: KvIter<'a>,
    backend_head: Option<KvPair>,
    backend_done: bool,
    staged: Peekable<vec::IntoIter<(Vec<u8>, Option<Vec<u8>>)>>,
    reverse: bool,
}

impl<'a> FastIter<'a> {
    pub fn new<S: KvStore>(
        ndb: &'a NodeDb<S>,
        staged: &StagedChanges,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Result<Self, TreeError> {
        let (fast_start, fast_end) = keys::fast_range(start, end);
        let backend = ndb.storage().iter(Some(&fast_start), Some(&fast_end), reverse)?;
        Ok(Self {
            backend,
            backend_head: None,
            backend_done: false,
            staged: staged.snapshot(start, end, reverse).into_iter().peekable(),
            reverse,
        })
    }

    fn fill(&mut self) -> Result<(), TreeError> {
        if self.backend_head.is_some() || self.backend_done {
            return Ok(());
        }
        match self.backend.next() {
            None => self.backend_done = true,
            Some(item) => {
                let (key, bytes) = item?;
                let key = keys::strip_fast_prefix(&key).ok_or(CorruptionError::BadFastNode)?;
                let (_, value) = codec::decode_fast_node(&bytes)?;
                self.backend_head = Some((key.to_vec(), value));
            },
        }
        Ok(())
    }
}

impl Iterator for FastIter<'_> {
    type Item = Result<KvPair, TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Err(e) = self.fill() {
                self.backend_done = true;
                self.backend_head = None;
                return Some(Err(e));
            }

            let take_staged = match (&self.backend_head, self.staged.peek()) {
                (None, None) => return None,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (Some((committed, _)), Some((staged, _))) => {
                    (staged < committed) != self.reverse || staged == committed
                },
            };
            if !take_staged {
                return self.backend_head.take().map(Ok);
            }

            // a staged entry shadows the committed entry with the same key
            let shadowed = matches!(
                (&self.backend_head, self.staged.peek()),
                (Some((committed, _)), Some((staged, _))) if staged == committed
            );
            if shadowed {
                self.backend_head = None;
            }
            if let Some((key, Some(value))) = self.staged.next() {
                return Some(Ok((key, value)));
            }
        }
    }
}

// REBUILD
// ================================================================================================

/// Replaces the fast cache with the leaves of the tree rooted at `root`.
///
/// Stale fast nodes are deleted and the live flag is set in the same batch.
pub(crate) fn rebuild<S: KvStore>(
    ndb: &NodeDb<S>,
    source: &dyn NodeSource,
    root: Option<NodeRef>,
) -> Result<(), TreeError> {
    let mut batch = WriteBatch::new();
    let (start, end) = keys::fast_range(None, None);
    let mut stale = 0usize;
    for item in ndb.storage().iter(Some(&start), Some(&end), false)? {
        let (key, _) = item?;
        batch.delete(key);
        stale += 1;
    }

    let mut written = 0usize;
    let mut leaves = LeafWalk::new(source, root, None, None, false);
    while let Some(leaf) = leaves.next_leaf() {
        let leaf = leaf?;
        batch.put(keys::fast_key(&leaf.key), codec::encode_fast_node(leaf.version, &leaf.value));
        written += 1;
    }
    batch.put(keys::FAST_LIVE_KEY, keys::FAST_LIVE_VALUE);

    ndb.storage().write(batch)?;
    info!(stale, written, "rebuilt fast cache");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_respects_bounds_and_direction() {
        let mut staged = StagedChanges::default();
        staged.set(b"a", b"1");
        staged.remove(b"b");
        staged.set(b"c", b"3");

        let forward = staged.snapshot(Some(b"b".as_slice()), None, false);
        assert_eq!(forward, vec![(b"b".to_vec(), None), (b"c".to_vec(), Some(b"3".to_vec()))]);

        let reverse = staged.snapshot(None, Some(b"c".as_slice()), true);
        assert_eq!(reverse, vec![(b"b".to_vec(), None), (b"a".to_vec(), Some(b"1".to_vec()))]);

        assert!(staged.snapshot(Some(b"c".as_slice()), Some(b"a".as_slice()), false).is_empty());
        assert_eq!(staged.get(b"b"), Some(None));
        assert_eq!(staged.get(b"a"), Some(Some(b"1".as_slice())));
        assert_eq!(staged.get(b"z"), None);
    }

    #[test]
    fn staged_changes_go_into_batch() {
        let mut staged = StagedChanges::default();
        staged.set(b"k", b"v");
        staged.remove(b"gone");

        let mut batch = WriteBatch::new();
        staged.stage_into(4, &mut batch);
        assert_eq!(batch.get(&keys::fast_key(b"gone")), Some(None));
        let encoded = codec::encode_fast_node(4, b"v");
        assert_eq!(batch.get(&keys::fast_key(b"k")), Some(Some(encoded.as_slice())));
    }
}
