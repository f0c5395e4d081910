use super::codec;
use crate::hash::{HashFunction, NodeHash};

// NODE REFERENCES
// ================================================================================================

/// Identifier of a node that exists only in the working tree's dirty set.
pub(crate) type PendingId = u64;

/// A reference from an inner node (or the tree root) to a child.
///
/// Saved nodes are content-addressed by their hash. Nodes created since the last commit have
/// no hash yet and are addressed by a placeholder into the dirty set; placeholders are resolved
/// to hashes when the version is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NodeRef {
    Stored(NodeHash),
    Pending(PendingId),
}

impl NodeRef {
    /// Returns the hash of a stored node, or `None` for a pending one.
    pub fn stored_hash(&self) -> Option<&NodeHash> {
        match self {
            NodeRef::Stored(hash) => Some(hash),
            NodeRef::Pending(_) => None,
        }
    }
}

// NODES
// ================================================================================================

/// A vertex of the AVL+ tree.
///
/// Values live only in leaves. Inner nodes route lookups by their split key, which is the
/// smallest key of their right subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Leaf(LeafNode),
    Inner(InnerNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LeafNode {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Version at which the value was last assigned.
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InnerNode {
    /// Smallest key of the right subtree.
    pub key: Vec<u8>,
    /// One more than the height of the taller child; leaves have height 0.
    pub height: u8,
    /// Number of leaves below this node.
    pub size: u64,
    /// Version at which this node was created or last restructured.
    pub version: u64,
    pub left: NodeRef,
    pub right: NodeRef,
}

impl Node {
    pub fn new_leaf(key: Vec<u8>, value: Vec<u8>, version: u64) -> Self {
        Node::Leaf(LeafNode { key, value, version })
    }

    /// Returns the leaf key or the split key of an inner node.
    pub fn key(&self) -> &[u8] {
        match self {
            Node::Leaf(leaf) => &leaf.key,
            Node::Inner(inner) => &inner.key,
        }
    }

    pub fn height(&self) -> u8 {
        match self {
            Node::Leaf(_) => 0,
            Node::Inner(inner) => inner.height,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Node::Leaf(_) => 1,
            Node::Inner(inner) => inner.size,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Node::Leaf(leaf) => leaf.version,
            Node::Inner(inner) => inner.version,
        }
    }

    /// Computes the hash of this node.
    ///
    /// Returns `None` for an inner node with a pending child, whose hash is not known yet.
    pub fn hash(&self, hasher: HashFunction) -> Option<NodeHash> {
        match self {
            Node::Leaf(leaf) => Some(codec::leaf_hash(hasher, &leaf.key, &leaf.value, leaf.version)),
            Node::Inner(inner) => Some(codec::inner_hash(
                hasher,
                inner.height,
                inner.size,
                inner.version,
                inner.left.stored_hash()?,
                inner.right.stored_hash()?,
            )),
        }
    }
}
