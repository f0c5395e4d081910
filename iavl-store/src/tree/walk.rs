//! Read-only traversals shared by the working tree and committed versions.

use std::sync::Arc;

use super::{
    error::TreeError,
    node::{LeafNode, Node, NodeRef},
};

// NODE SOURCE
// ================================================================================================

/// Resolves node references into decoded nodes.
pub(crate) trait NodeSource {
    fn load(&self, node: &NodeRef) -> Result<Arc<Node>, TreeError>;
}

// POINT READS
// ================================================================================================

/// Returns the value stored under `key` in the tree rooted at `root`.
pub(crate) fn get(
    source: &dyn NodeSource,
    root: Option<NodeRef>,
    key: &[u8],
) -> Result<Option<Vec<u8>>, TreeError> {
    let Some(mut current) = root else {
        return Ok(None);
    };
    loop {
        let node = source.load(&current)?;
        match node.as_ref() {
            Node::Leaf(leaf) => {
                return Ok((leaf.key == key).then(|| leaf.value.clone()));
            },
            Node::Inner(inner) => {
                current = if key < inner.key.as_slice() { inner.left } else { inner.right };
            },
        }
    }
}

/// Returns the rank `key` has, or would have if inserted, together with its value.
pub(crate) fn get_with_index(
    source: &dyn NodeSource,
    root: Option<NodeRef>,
    key: &[u8],
) -> Result<(u64, Option<Vec<u8>>), TreeError> {
    let Some(mut current) = root else {
        return Ok((0, None));
    };
    let mut index = 0;
    loop {
        let node = source.load(&current)?;
        match node.as_ref() {
            Node::Leaf(leaf) => {
                return Ok(match key.cmp(&leaf.key) {
                    core::cmp::Ordering::Less => (index, None),
                    core::cmp::Ordering::Equal => (index, Some(leaf.value.clone())),
                    core::cmp::Ordering::Greater => (index + 1, None),
                });
            },
            Node::Inner(inner) => {
                if key < inner.key.as_slice() {
                    current = inner.left;
                } else {
                    index += source.load(&inner.left)?.size();
                    current = inner.right;
                }
            },
        }
    }
}

/// Returns the entry of rank `index` in key order.
pub(crate) fn get_by_index(
    source: &dyn NodeSource,
    root: Option<NodeRef>,
    mut index: u64,
) -> Result<Option<(Vec<u8>, Vec<u8>)>, TreeError> {
    let Some(mut current) = root else {
        return Ok(None);
    };
    loop {
        let node = source.load(&current)?;
        match node.as_ref() {
            Node::Leaf(leaf) => {
                return Ok((index == 0).then(|| (leaf.key.clone(), leaf.value.clone())));
            },
            Node::Inner(inner) => {
                if index >= inner.size {
                    return Ok(None);
                }
                let left_size = source.load(&inner.left)?.size();
                if index < left_size {
                    current = inner.left;
                } else {
                    index -= left_size;
                    current = inner.right;
                }
            },
        }
    }
}

/// Returns `(size, height)` of the tree rooted at `root`.
pub(crate) fn shape(source: &dyn NodeSource, root: Option<NodeRef>) -> Result<(u64, u8), TreeError> {
    match root {
        Some(root) => {
            let node = source.load(&root)?;
            Ok((node.size(), node.height()))
        },
        None => Ok((0, 0)),
    }
}

// LEAF WALK
// ================================================================================================

/// In-order walk over the leaves of a tree, restricted to keys in `[start, end)`.
///
/// Subtrees whose key range lies entirely outside the bounds are never loaded.
pub(crate) struct LeafWalk<'a> {
    source: &'a dyn NodeSource,
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
    reverse: bool,
    stack: Vec<NodeRef>,
}

impl<'a> LeafWalk<'a> {
    pub fn new(
        source: &'a dyn NodeSource,
        root: Option<NodeRef>,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Self {
        Self {
            source,
            start: start.map(<[u8]>::to_vec),
            end: end.map(<[u8]>::to_vec),
            reverse,
            stack: root.into_iter().collect(),
        }
    }

    fn in_range(&self, key: &[u8]) -> bool {
        self.start.as_deref().map_or(true, |start| key >= start)
            && self.end.as_deref().map_or(true, |end| key < end)
    }

    /// Returns the next leaf in walk order.
    pub fn next_leaf(&mut self) -> Option<Result<LeafNode, TreeError>> {
        while let Some(current) = self.stack.pop() {
            let node = match self.source.load(&current) {
                Ok(node) => node,
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                },
            };
            match node.as_ref() {
                Node::Leaf(leaf) => {
                    if self.in_range(&leaf.key) {
                        return Some(Ok(leaf.clone()));
                    }
                },
                Node::Inner(inner) => {
                    // left subtree holds keys below the split key, right subtree the rest
                    let left = self.start.as_deref().map_or(true, |start| start < inner.key.as_slice());
                    let right = self.end.as_deref().map_or(true, |end| inner.key.as_slice() < end);
                    let (first, second) = if self.reverse {
                        ((right, inner.right), (left, inner.left))
                    } else {
                        ((left, inner.left), (right, inner.right))
                    };
                    if second.0 {
                        self.stack.push(second.1);
                    }
                    if first.0 {
                        self.stack.push(first.1);
                    }
                },
            }
        }
        None
    }
}

impl Iterator for LeafWalk<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>), TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_leaf().map(|leaf| leaf.map(|leaf| (leaf.key, leaf.value)))
    }
}
