//! Byte encodings of nodes and fast nodes, and the hash preimages of nodes.
//!
//! Node record layout:
//! - 1-byte tag (`LEAF_TAG` or `INNER_TAG`)
//! - varint height, varint size, varint version
//! - length-prefixed key
//! - leaves: length-prefixed value; inner nodes: 32-byte left hash, 32-byte right hash
//!
//! All integers use the protobuf varint encoding. Decoding rejects non-canonical (padded)
//! varints so that every node has exactly one valid encoding.

use bytes::Buf;
use prost::encoding::{decode_varint, encode_varint, encoded_len_varint};
use thiserror::Error;

use super::node::{InnerNode, LeafNode, Node, NodeRef};
use crate::hash::{HashFunction, NodeHash, HASH_LEN};

#[cfg(test)]
mod tests;

// CONSTANTS
// ================================================================================================

/// Tag byte of a leaf record.
pub(crate) const LEAF_TAG: u8 = 1;

/// Tag byte of an inner node record.
pub(crate) const INNER_TAG: u8 = 2;

/// Domain separator prepended to leaf hash preimages.
const LEAF_DOMAIN: u8 = 0x00;

/// Domain separator prepended to inner node hash preimages.
const INNER_DOMAIN: u8 = 0x01;

// ERRORS
// ================================================================================================

/// Errors raised while decoding a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record is truncated while reading {0}")]
    Truncated(&'static str),
    #[error("invalid varint while reading {0}")]
    InvalidVarint(&'static str),
    #[error("non-canonical varint while reading {0}")]
    NonCanonicalVarint(&'static str),
    #[error("unknown node tag {0}")]
    UnknownTag(u8),
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("leaf must have height 0 and size 1, found height {height} and size {size}")]
    InvalidLeaf { height: u64, size: u64 },
    #[error("inner node has invalid height {height} or size {size}")]
    InvalidInner { height: u64, size: u64 },
}

// HASHING
// ================================================================================================

/// Computes the hash of a leaf.
///
/// The value enters the preimage only through its own hash, so a proof path built from sibling
/// hashes never carries raw values.
pub(crate) fn leaf_hash(hasher: HashFunction, key: &[u8], value: &[u8], version: u64) -> NodeHash {
    let value_hash = hasher.digest(value);

    let mut preimage = Vec::with_capacity(1 + 3 + 10 + 10 + key.len() + 1 + HASH_LEN);
    preimage.push(LEAF_DOMAIN);
    encode_varint(0, &mut preimage);
    encode_varint(1, &mut preimage);
    encode_varint(version, &mut preimage);
    write_length_prefixed(key, &mut preimage);
    write_length_prefixed(&value_hash, &mut preimage);
    hasher.digest(&preimage)
}

/// Computes the hash of an inner node from its metadata and the hashes of its children.
pub(crate) fn inner_hash(
    hasher: HashFunction,
    height: u8,
    size: u64,
    version: u64,
    left: &NodeHash,
    right: &NodeHash,
) -> NodeHash {
    let mut preimage = Vec::with_capacity(1 + 2 + 10 + 10 + 2 * HASH_LEN);
    preimage.push(INNER_DOMAIN);
    encode_varint(u64::from(height), &mut preimage);
    encode_varint(size, &mut preimage);
    encode_varint(version, &mut preimage);
    preimage.extend_from_slice(left);
    preimage.extend_from_slice(right);
    hasher.digest(&preimage)
}

// NODE RECORDS
// ================================================================================================

/// Serializes a node whose children are all stored.
///
/// Returns `None` for an inner node with a pending child.
pub(crate) fn encode_node(node: &Node) -> Option<Vec<u8>> {
    let mut buf = Vec::with_capacity(64 + node.key().len());
    match node {
        Node::Leaf(leaf) => {
            buf.reserve(leaf.value.len());
            buf.push(LEAF_TAG);
            encode_varint(0, &mut buf);
            encode_varint(1, &mut buf);
            encode_varint(leaf.version, &mut buf);
            write_length_prefixed(&leaf.key, &mut buf);
            write_length_prefixed(&leaf.value, &mut buf);
        },
        Node::Inner(inner) => {
            let left = inner.left.stored_hash()?;
            let right = inner.right.stored_hash()?;
            buf.push(INNER_TAG);
            encode_varint(u64::from(inner.height), &mut buf);
            encode_varint(inner.size, &mut buf);
            encode_varint(inner.version, &mut buf);
            write_length_prefixed(&inner.key, &mut buf);
            buf.extend_from_slice(left);
            buf.extend_from_slice(right);
        },
    }
    Some(buf)
}

/// Deserializes a node record, checking its structural invariants.
///
/// # Errors
/// Returns a [DecodeError] if the record is truncated, carries trailing bytes, uses an unknown
/// tag or a non-canonical varint, or describes an impossible node.
pub(crate) fn decode_node(bytes: &[u8]) -> Result<Node, DecodeError> {
    let mut reader = Reader::new(bytes);
    let tag = reader.byte("tag")?;
    let height = reader.varint("height")?;
    let size = reader.varint("size")?;
    let version = reader.varint("version")?;
    let key = reader.length_prefixed("key")?;

    let node = match tag {
        LEAF_TAG => {
            if height != 0 || size != 1 {
                return Err(DecodeError::InvalidLeaf { height, size });
            }
            let value = reader.length_prefixed("value")?;
            Node::Leaf(LeafNode { key, value, version })
        },
        INNER_TAG => {
            // an inner node has at least two leaves and at most 2^height of them
            let height_ok = (1..=u64::from(u8::MAX)).contains(&height);
            if !height_ok || size < 2 || (height < 64 && size > 1u64 << height) {
                return Err(DecodeError::InvalidInner { height, size });
            }
            let left = reader.hash("left hash")?;
            let right = reader.hash("right hash")?;
            Node::Inner(InnerNode {
                key,
                height: height as u8,
                size,
                version,
                left: NodeRef::Stored(left),
                right: NodeRef::Stored(right),
            })
        },
        other => return Err(DecodeError::UnknownTag(other)),
    };

    reader.finish()?;
    Ok(node)
}

// FAST NODE RECORDS
// ================================================================================================

/// Serializes a fast node payload: `varint(version) || length_prefixed(value)`.
pub(crate) fn encode_fast_node(version: u64, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20 + value.len());
    encode_varint(version, &mut buf);
    write_length_prefixed(value, &mut buf);
    buf
}

/// Deserializes a fast node payload into `(version, value)`.
///
/// # Errors
/// Returns a [DecodeError] if the payload is malformed.
pub(crate) fn decode_fast_node(bytes: &[u8]) -> Result<(u64, Vec<u8>), DecodeError> {
    let mut reader = Reader::new(bytes);
    let version = reader.varint("fast node version")?;
    let value = reader.length_prefixed("fast node value")?;
    reader.finish()?;
    Ok((version, value))
}

// HELPERS
// ================================================================================================

fn write_length_prefixed(data: &[u8], buf: &mut Vec<u8>) {
    encode_varint(data.len() as u64, buf);
    buf.extend_from_slice(data);
}

/// Cursor over a record being decoded.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn byte(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        if !self.buf.has_remaining() {
            return Err(DecodeError::Truncated(what));
        }
        Ok(self.buf.get_u8())
    }

    fn varint(&mut self, what: &'static str) -> Result<u64, DecodeError> {
        if !self.buf.has_remaining() {
            return Err(DecodeError::Truncated(what));
        }
        let before = self.buf.remaining();
        let value = decode_varint(&mut self.buf).map_err(|_| DecodeError::InvalidVarint(what))?;
        if before - self.buf.remaining() != encoded_len_varint(value) {
            return Err(DecodeError::NonCanonicalVarint(what));
        }
        Ok(value)
    }

    fn slice(&mut self, what: &'static str, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() < len {
            return Err(DecodeError::Truncated(what));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn length_prefixed(&mut self, what: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.varint(what)?;
        let len = usize::try_from(len).map_err(|_| DecodeError::Truncated(what))?;
        Ok(self.slice(what, len)?.to_vec())
    }

    fn hash(&mut self, what: &'static str) -> Result<NodeHash, DecodeError> {
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(self.slice(what, HASH_LEN)?);
        Ok(hash)
    }

    fn finish(self) -> Result<(), DecodeError> {
        match self.buf.len() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}
