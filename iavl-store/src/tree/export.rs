//! Streaming export of a committed tree and reconstruction of the same tree in another store.

use std::sync::Arc;

use tracing::info;

use super::{
    codec,
    error::TreeError,
    keys,
    mutable::MutableTree,
    node::{InnerNode, Node, NodeRef},
    walk::NodeSource,
};
use crate::{
    hash::{NodeHash, EMPTY_HASH},
    storage::{KvStore, WriteBatch},
};

// CONSTANTS
// ================================================================================================

/// Number of node records an [Importer] buffers before writing them to the backend.
pub const IMPORT_BATCH_SIZE: usize = 10_000;

// EXPORT NODE
// ================================================================================================

/// A node of an exported tree.
///
/// Leaves have height 0 and carry a value. Inner nodes carry their split key and no value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportNode {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub version: u64,
    pub height: u8,
}

// EXPORTER
// ================================================================================================

/// Iterator over the nodes of a committed tree in post-order.
///
/// Children are always yielded before their parent, which is the order [Importer::add] expects.
pub struct Exporter<'a> {
    source: &'a dyn NodeSource,
    stack: Vec<Frame>,
}

enum Frame {
    Visit(NodeRef),
    Emit(Arc<Node>),
}

impl<'a> Exporter<'a> {
    pub(crate) fn new(source: &'a dyn NodeSource, root: Option<NodeRef>) -> Self {
        Self {
            source,
            stack: root.map(Frame::Visit).into_iter().collect(),
        }
    }
}

impl Iterator for Exporter<'_> {
    type Item = Result<ExportNode, TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            let node = match frame {
                Frame::Emit(node) => node,
                Frame::Visit(node_ref) => {
                    let node = match self.source.load(&node_ref) {
                        Ok(node) => node,
                        Err(e) => {
                            self.stack.clear();
                            return Some(Err(e));
                        },
                    };
                    if let Node::Inner(inner) = node.as_ref() {
                        let (left, right) = (inner.left, inner.right);
                        self.stack.push(Frame::Emit(node));
                        self.stack.push(Frame::Visit(right));
                        self.stack.push(Frame::Visit(left));
                        continue;
                    }
                    node
                },
            };

            return Some(Ok(match node.as_ref() {
                Node::Leaf(leaf) => ExportNode {
                    key: leaf.key.clone(),
                    value: Some(leaf.value.clone()),
                    version: leaf.version,
                    height: 0,
                },
                Node::Inner(inner) => ExportNode {
                    key: inner.key.clone(),
                    value: None,
                    version: inner.version,
                    height: inner.height,
                },
            }));
        }
        None
    }
}

impl core::fmt::Debug for Exporter<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Exporter").field("pending", &self.stack.len()).finish()
    }
}

// IMPORTER
// ================================================================================================

/// Summary of an imported subtree, enough to validate the parent that adopts it.
#[derive(Debug)]
struct Subtree {
    hash: NodeHash,
    height: u8,
    size: u64,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
}

/// Rebuilds an exported tree in an empty store and commits it as a single version.
///
/// Nodes must be added in the post-order produced by [Exporter]. Node records are written in
/// chunks of [IMPORT_BATCH_SIZE]; the version only becomes visible on [commit](Self::commit).
/// Dropping the importer without committing leaves unreferenced node records behind.
#[derive(Debug)]
pub struct Importer<'a, S: KvStore> {
    tree: &'a mut MutableTree<S>,
    version: u64,
    /// Whether fast nodes are written along with the leaves.
    fast: bool,
    /// Subtrees built so far that have no parent yet.
    stack: Vec<Subtree>,
    batch: WriteBatch,
    imported: u64,
}

impl<'a, S: KvStore> Importer<'a, S> {
    pub(crate) fn new(tree: &'a mut MutableTree<S>, version: u64, fast: bool) -> Self {
        Self {
            tree,
            version,
            fast,
            stack: Vec::new(),
            batch: WriteBatch::new(),
            imported: 0,
        }
    }

    /// Adds the next node of the export stream.
    ///
    /// # Errors
    /// - `TreeError::InvalidArgument` if the node does not fit the nodes added before it.
    /// - `TreeError::Storage` if a chunk of node records cannot be written.
    pub fn add(&mut self, node: ExportNode) -> Result<(), TreeError> {
        if node.key.is_empty() {
            return Err(TreeError::EmptyKey);
        }
        if node.version > self.version {
            return Err(TreeError::InvalidArgument(format!(
                "node version {} is newer than the imported version {}",
                node.version, self.version
            )));
        }

        let (built, min_key, max_key) = if node.height == 0 {
            let value = node.value.ok_or_else(|| {
                TreeError::InvalidArgument("leaf node without a value".to_string())
            })?;
            if self.fast {
                self.batch
                    .put(keys::fast_key(&node.key), codec::encode_fast_node(node.version, &value));
            }
            let (min_key, max_key) = (node.key.clone(), node.key.clone());
            (Node::new_leaf(node.key, value, node.version), min_key, max_key)
        } else {
            if node.value.is_some() {
                return Err(TreeError::InvalidArgument("inner node with a value".to_string()));
            }
            let (Some(right), Some(left)) = (self.stack.pop(), self.stack.pop()) else {
                return Err(TreeError::InvalidArgument(
                    "inner node without two children".to_string(),
                ));
            };
            if left.height.max(right.height).checked_add(1) != Some(node.height) {
                return Err(TreeError::InvalidArgument(format!(
                    "inner node height {} does not match its children",
                    node.height
                )));
            }
            if left.height.abs_diff(right.height) > 1 {
                return Err(TreeError::InvalidArgument(format!(
                    "inner node children heights {} and {} are unbalanced",
                    left.height, right.height
                )));
            }
            if left.max_key >= node.key {
                return Err(TreeError::InvalidArgument(
                    "left subtree keys are not below the split key".to_string(),
                ));
            }
            if node.key != right.min_key {
                return Err(TreeError::InvalidArgument(
                    "split key is not the smallest key of the right subtree".to_string(),
                ));
            }
            let inner = Node::Inner(InnerNode {
                key: node.key,
                height: node.height,
                size: left.size + right.size,
                version: node.version,
                left: NodeRef::Stored(left.hash),
                right: NodeRef::Stored(right.hash),
            });
            (inner, left.min_key, right.max_key)
        };

        let hasher = self.tree.node_db().hasher();
        let hash = built.hash(hasher).ok_or_else(|| {
            TreeError::InvalidArgument("imported node has unresolved children".to_string())
        })?;
        let bytes = codec::encode_node(&built).ok_or_else(|| {
            TreeError::InvalidArgument("imported node has unresolved children".to_string())
        })?;
        self.batch.put(keys::node_key(&hash), bytes);
        self.stack.push(Subtree {
            hash,
            height: built.height(),
            size: built.size(),
            min_key,
            max_key,
        });
        self.imported += 1;

        if self.batch.len() >= IMPORT_BATCH_SIZE {
            self.tree.node_db().storage().write(core::mem::take(&mut self.batch))?;
        }
        Ok(())
    }

    /// Commits the imported tree as the importer's version and returns its root hash.
    ///
    /// # Errors
    /// - `TreeError::InvalidArgument` if the added nodes do not form a single tree.
    /// - `TreeError::Storage` if the final batch cannot be written.
    pub fn commit(mut self) -> Result<NodeHash, TreeError> {
        if self.stack.len() > 1 {
            return Err(TreeError::InvalidArgument(format!(
                "import left {} subtrees without a parent",
                self.stack.len()
            )));
        }
        let root = self.stack.pop().map_or(EMPTY_HASH, |subtree| subtree.hash);
        let batch = core::mem::take(&mut self.batch);
        self.tree.commit_import(self.version, root, batch)?;
        info!(version = self.version, nodes = self.imported, "imported tree");
        Ok(root)
    }
}
