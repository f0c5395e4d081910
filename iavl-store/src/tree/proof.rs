//! Merkle proofs of presence and absence of keys.

use super::{
    codec,
    error::{CorruptionError, TreeError},
    node::{Node, NodeRef},
    walk::{self, NodeSource},
};
use crate::hash::{HashFunction, NodeHash, EMPTY_HASH};

// PROOF STEP
// ================================================================================================

/// Side of the parent at which the sibling of a proof path sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    Left,
    Right,
}

/// One level of a proof path: the sibling subtree and the metadata of the parent inner node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProofStep {
    pub side: Side,
    pub sibling: NodeHash,
    pub height: u8,
    pub size: u64,
    pub version: u64,
}

impl ProofStep {
    /// Hashes the parent of `child` and the sibling.
    fn parent_hash(&self, hasher: HashFunction, child: &NodeHash) -> NodeHash {
        let (left, right) = match self.side {
            Side::Left => (&self.sibling, child),
            Side::Right => (child, &self.sibling),
        };
        codec::inner_hash(hasher, self.height, self.size, self.version, left, right)
    }
}

// EXISTENCE PROOF
// ================================================================================================

/// Proof that a leaf with `key`, `value` and `version` is part of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExistenceProof {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Version at which the value was assigned.
    pub version: u64,
    /// Steps from the leaf up to the root.
    pub path: Vec<ProofStep>,
}

impl ExistenceProof {
    /// Recomputes the root hash implied by this proof.
    pub fn compute_root(&self, hasher: HashFunction) -> NodeHash {
        let leaf = codec::leaf_hash(hasher, &self.key, &self.value, self.version);
        self.path.iter().fold(leaf, |hash, step| step.parent_hash(hasher, &hash))
    }

    /// Returns true if this proof rebuilds `root`.
    pub fn verify(&self, root: &NodeHash, hasher: HashFunction) -> bool {
        &self.compute_root(hasher) == root
    }

    /// True if the leaf is the leftmost leaf of the tree.
    fn is_leftmost(&self) -> bool {
        self.path.iter().all(|step| step.side == Side::Right)
    }

    /// True if the leaf is the rightmost leaf of the tree.
    fn is_rightmost(&self) -> bool {
        self.path.iter().all(|step| step.side == Side::Left)
    }
}

// NON-EXISTENCE PROOF
// ================================================================================================

/// Proof that `key` is absent, given by the existence proofs of its neighbours.
///
/// `left` is the greatest key below `key` and `right` the smallest key above it; either is
/// missing when `key` falls outside the key range of the tree. Both are missing for the empty
/// tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NonExistenceProof {
    pub key: Vec<u8>,
    pub left: Option<ExistenceProof>,
    pub right: Option<ExistenceProof>,
}

impl NonExistenceProof {
    /// Returns true if both neighbours are proven against `root` and are adjacent leaves that
    /// bracket the key.
    pub fn verify(&self, root: &NodeHash, hasher: HashFunction) -> bool {
        match (&self.left, &self.right) {
            (None, None) => root == &EMPTY_HASH,
            (Some(left), None) => {
                left.key < self.key && left.is_rightmost() && left.verify(root, hasher)
            },
            (None, Some(right)) => {
                self.key < right.key && right.is_leftmost() && right.verify(root, hasher)
            },
            (Some(left), Some(right)) => {
                left.key < self.key
                    && self.key < right.key
                    && are_adjacent(left, right)
                    && left.verify(root, hasher)
                    && right.verify(root, hasher)
            },
        }
    }
}

/// Checks that two proven leaves are neighbours in key order.
///
/// Above their lowest common ancestor both paths are identical. At the ancestor the left leaf
/// descends left and the right leaf descends right. Below it the left leaf is the rightmost leaf
/// of its subtree and the right leaf the leftmost of its own.
fn are_adjacent(left: &ExistenceProof, right: &ExistenceProof) -> bool {
    let mut left_path = left.path.iter().rev();
    let mut right_path = right.path.iter().rev();
    loop {
        match (left_path.next(), right_path.next()) {
            (Some(l), Some(r)) if l == r => continue,
            (Some(l), Some(r)) => {
                return l.side == Side::Right
                    && r.side == Side::Left
                    && (l.height, l.size, l.version) == (r.height, r.size, r.version)
                    && left_path.all(|step| step.side == Side::Left)
                    && right_path.all(|step| step.side == Side::Right);
            },
            _ => return false,
        }
    }
}

// KEY PROOF
// ================================================================================================

/// Proof of either the presence or the absence of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyProof {
    Exists(ExistenceProof),
    Absent(NonExistenceProof),
}

impl KeyProof {
    pub fn verify(&self, root: &NodeHash, hasher: HashFunction) -> bool {
        match self {
            KeyProof::Exists(proof) => proof.verify(root, hasher),
            KeyProof::Absent(proof) => proof.verify(root, hasher),
        }
    }
}

// PROOF GENERATION
// ================================================================================================

pub(crate) fn prove(
    source: &dyn NodeSource,
    root: Option<NodeRef>,
    key: &[u8],
) -> Result<KeyProof, TreeError> {
    if let Some(proof) = existence_proof(source, root, key)? {
        return Ok(KeyProof::Exists(proof));
    }

    let (index, _) = walk::get_with_index(source, root, key)?;
    let left = match index.checked_sub(1) {
        Some(left) => neighbour_proof(source, root, left)?,
        None => None,
    };
    let right = neighbour_proof(source, root, index)?;
    Ok(KeyProof::Absent(NonExistenceProof { key: key.to_vec(), left, right }))
}

fn neighbour_proof(
    source: &dyn NodeSource,
    root: Option<NodeRef>,
    index: u64,
) -> Result<Option<ExistenceProof>, TreeError> {
    match walk::get_by_index(source, root, index)? {
        Some((key, _)) => existence_proof(source, root, &key),
        None => Ok(None),
    }
}

/// Builds the existence proof of `key`, or returns `None` if the key is absent.
fn existence_proof(
    source: &dyn NodeSource,
    root: Option<NodeRef>,
    key: &[u8],
) -> Result<Option<ExistenceProof>, TreeError> {
    let Some(mut current) = root else {
        return Ok(None);
    };
    let mut path = Vec::new();
    loop {
        let node = source.load(&current)?;
        match node.as_ref() {
            Node::Leaf(leaf) => {
                if leaf.key != key {
                    return Ok(None);
                }
                path.reverse();
                return Ok(Some(ExistenceProof {
                    key: leaf.key.clone(),
                    value: leaf.value.clone(),
                    version: leaf.version,
                    path,
                }));
            },
            Node::Inner(inner) => {
                let (next, side, sibling) = if key < inner.key.as_slice() {
                    (inner.left, Side::Right, inner.right)
                } else {
                    (inner.right, Side::Left, inner.left)
                };
                let sibling = *sibling.stored_hash().ok_or(CorruptionError::DanglingPendingNode)?;
                path.push(ProofStep {
                    side,
                    sibling,
                    height: inner.height,
                    size: inner.size,
                    version: inner.version,
                });
                current = next;
            },
        }
    }
}
