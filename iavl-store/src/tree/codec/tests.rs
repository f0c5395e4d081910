use assert_matches::assert_matches;

use super::*;
use crate::hash::EMPTY_HASH;

fn inner(left: NodeHash, right: NodeHash) -> Node {
    Node::Inner(InnerNode {
        key: b"m".to_vec(),
        height: 3,
        size: 5,
        version: 300,
        left: NodeRef::Stored(left),
        right: NodeRef::Stored(right),
    })
}

#[test]
fn leaf_layout_matches_schema() {
    let leaf = Node::new_leaf(b"key".to_vec(), b"value".to_vec(), 200);
    let bytes = encode_node(&leaf).unwrap();

    let mut expected = vec![LEAF_TAG, 0, 1, 0xc8, 0x01, 3];
    expected.extend_from_slice(b"key");
    expected.push(5);
    expected.extend_from_slice(b"value");
    assert_eq!(bytes, expected);
    assert_eq!(decode_node(&bytes).unwrap(), leaf);
}

#[test]
fn inner_layout_matches_schema() {
    let node = inner([1; 32], [2; 32]);
    let bytes = encode_node(&node).unwrap();

    assert_eq!(&bytes[..8], &[INNER_TAG, 3, 5, 0xac, 0x02, 1, b'm', 1]);
    assert_eq!(bytes.len(), 7 + 64);
    assert_eq!(&bytes[7..39], &[1; 32]);
    assert_eq!(&bytes[39..], &[2; 32]);
    assert_eq!(decode_node(&bytes).unwrap(), node);
}

#[test]
fn empty_value_is_preserved() {
    let leaf = Node::new_leaf(b"k".to_vec(), Vec::new(), 1);
    let decoded = decode_node(&encode_node(&leaf).unwrap()).unwrap();
    assert_matches!(decoded, Node::Leaf(LeafNode { ref value, .. }) if value.is_empty());
}

#[test]
fn pending_children_cannot_be_encoded() {
    let node = Node::Inner(InnerNode {
        key: b"b".to_vec(),
        height: 1,
        size: 2,
        version: 1,
        left: NodeRef::Stored(EMPTY_HASH),
        right: NodeRef::Pending(7),
    });
    assert_eq!(encode_node(&node), None);
    assert_eq!(node.hash(HashFunction::Sha256), None);
}

#[test]
fn decode_rejects_malformed_records() {
    let bytes = encode_node(&Node::new_leaf(b"key".to_vec(), b"value".to_vec(), 1)).unwrap();

    assert_matches!(decode_node(&[]), Err(DecodeError::Truncated("tag")));
    assert_matches!(decode_node(&bytes[..bytes.len() - 1]), Err(DecodeError::Truncated("value")));

    let mut trailing = bytes.clone();
    trailing.push(0);
    assert_matches!(decode_node(&trailing), Err(DecodeError::TrailingBytes(1)));

    let mut tagged = bytes.clone();
    tagged[0] = 9;
    assert_matches!(decode_node(&tagged), Err(DecodeError::UnknownTag(9)));

    let mut bad_leaf = bytes.clone();
    bad_leaf[1] = 1;
    assert_matches!(decode_node(&bad_leaf), Err(DecodeError::InvalidLeaf { height: 1, size: 1 }));

    // height 1 cannot hold more than two leaves
    let mut bad_inner = encode_node(&inner([1; 32], [2; 32])).unwrap();
    bad_inner[1] = 1;
    assert_matches!(decode_node(&bad_inner), Err(DecodeError::InvalidInner { height: 1, size: 5 }));
}

#[test]
fn decode_rejects_padded_varints() {
    // version 1 written as two bytes
    let record = [LEAF_TAG, 0, 1, 0x81, 0x00, 1, b'k', 0];
    assert_matches!(decode_node(&record), Err(DecodeError::NonCanonicalVarint("version")));
}

#[test]
fn fast_node_round_trip() {
    let bytes = encode_fast_node(300, b"v");
    assert_eq!(bytes, [0xac, 0x02, 1, b'v']);
    assert_eq!(decode_fast_node(&bytes).unwrap(), (300, b"v".to_vec()));
    assert_matches!(decode_fast_node(&bytes[..3]), Err(DecodeError::Truncated(_)));
}

#[test]
fn hashes_depend_on_every_field() {
    let h = HashFunction::Sha256;
    let base = leaf_hash(h, b"k", b"v", 1);
    assert_eq!(base, leaf_hash(h, b"k", b"v", 1));
    assert_ne!(base, leaf_hash(h, b"k", b"v", 2));
    assert_ne!(base, leaf_hash(h, b"k", b"w", 1));
    assert_ne!(base, leaf_hash(h, b"j", b"v", 1));
    assert_ne!(base, leaf_hash(HashFunction::Sha3_256, b"k", b"v", 1));

    let node = inner([1; 32], [2; 32]);
    let hash = node.hash(h).unwrap();
    assert_eq!(hash, inner_hash(h, 3, 5, 300, &[1; 32], &[2; 32]));
    assert_ne!(hash, inner_hash(h, 3, 5, 300, &[2; 32], &[1; 32]));
    assert_ne!(hash, inner_hash(h, 3, 5, 301, &[1; 32], &[2; 32]));
    assert_ne!(hash, EMPTY_HASH);
}

#[test]
fn split_key_is_not_part_of_inner_hash() {
    let h = HashFunction::Sha256;
    let mut other = inner([1; 32], [2; 32]);
    if let Node::Inner(ref mut node) = other {
        node.key = b"z".to_vec();
    }
    assert_eq!(inner([1; 32], [2; 32]).hash(h), other.hash(h));
}
