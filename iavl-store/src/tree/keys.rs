//! Backend key schema.
//!
//! Fixed one-byte prefixes partition the backend key space. Integers are big-endian so that
//! lexicographic key order matches numeric order in range scans.

use crate::hash::{NodeHash, HASH_LEN};

// CONSTANTS
// ================================================================================================

/// `NODE_PREFIX || hash` → node record.
pub(crate) const NODE_PREFIX: u8 = 0x01;

/// `VERSION_PREFIX || be(version)` → root hash of that version.
pub(crate) const VERSION_PREFIX: u8 = 0x02;

/// `ORPHAN_PREFIX || be(first_unref_version) || be(last_ref_version) || hash` → empty.
pub(crate) const ORPHAN_PREFIX: u8 = 0x03;

/// Singleton key holding `be(latest_version)`.
pub(crate) const LATEST_VERSION_KEY: &[u8] = &[0x04];

/// `FAST_PREFIX || key` → fast node payload.
pub(crate) const FAST_PREFIX: u8 = 0x05;

/// Singleton key present (with value `0x01`) while the fast cache is live.
pub(crate) const FAST_LIVE_KEY: &[u8] = &[0x06];

/// Value stored under [FAST_LIVE_KEY].
pub(crate) const FAST_LIVE_VALUE: &[u8] = &[0x01];

/// Singleton key holding the identifier of the store's hash function.
pub(crate) const HASH_FUNCTION_KEY: &[u8] = &[0x07];

const VERSION_KEY_LEN: usize = 1 + 8;
const ORPHAN_KEY_LEN: usize = 1 + 8 + 8 + HASH_LEN;

// NODES
// ================================================================================================

pub(crate) fn node_key(hash: &NodeHash) -> [u8; 1 + HASH_LEN] {
    let mut key = [0u8; 1 + HASH_LEN];
    key[0] = NODE_PREFIX;
    key[1..].copy_from_slice(hash);
    key
}

// VERSIONS
// ================================================================================================

pub(crate) fn version_key(version: u64) -> [u8; VERSION_KEY_LEN] {
    let mut key = [0u8; VERSION_KEY_LEN];
    key[0] = VERSION_PREFIX;
    key[1..].copy_from_slice(&version.to_be_bytes());
    key
}

/// Extracts the version from a version index key.
pub(crate) fn parse_version_key(key: &[u8]) -> Option<u64> {
    if key.len() != VERSION_KEY_LEN || key[0] != VERSION_PREFIX {
        return None;
    }
    Some(read_u64(&key[1..]))
}

/// Bounds covering the whole version index.
pub(crate) fn version_range() -> ([u8; 1], [u8; 1]) {
    ([VERSION_PREFIX], [VERSION_PREFIX + 1])
}

pub(crate) fn encode_latest_version(version: u64) -> [u8; 8] {
    version.to_be_bytes()
}

pub(crate) fn decode_latest_version(value: &[u8]) -> Option<u64> {
    (value.len() == 8).then(|| read_u64(value))
}

// ORPHANS
// ================================================================================================

/// A node that stopped being referenced after `last_ref_version`.
///
/// The first version no longer referencing the node is always `last_ref_version + 1`; the key
/// carries both so that records sort by the version at which the node became unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OrphanRecord {
    /// Last version whose tree contains the node.
    pub last_ref_version: u64,
    pub hash: NodeHash,
}

impl OrphanRecord {
    pub fn key(&self) -> [u8; ORPHAN_KEY_LEN] {
        let mut key = [0u8; ORPHAN_KEY_LEN];
        key[..17].copy_from_slice(&orphan_prefix(self.last_ref_version));
        key[17..].copy_from_slice(&self.hash);
        key
    }

    /// Parses an orphan key, rejecting keys whose two versions are not adjacent.
    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.len() != ORPHAN_KEY_LEN || key[0] != ORPHAN_PREFIX {
            return None;
        }
        let first_unref_version = read_u64(&key[1..9]);
        let last_ref_version = read_u64(&key[9..17]);
        if last_ref_version.checked_add(1) != Some(first_unref_version) {
            return None;
        }
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(&key[17..]);
        Some(Self { last_ref_version, hash })
    }
}

/// Bounds covering every orphan record whose last referencing version is `version`.
pub(crate) fn orphan_range(version: u64) -> (Vec<u8>, Vec<u8>) {
    let start = orphan_prefix(version).to_vec();
    let mut end = start.clone();
    end.extend_from_slice(&[u8::MAX; HASH_LEN + 1]);
    (start, end)
}

/// Bounds covering orphan records whose last referencing version is at least `version`.
pub(crate) fn orphans_from(version: u64) -> ([u8; VERSION_KEY_LEN], [u8; 1]) {
    let mut start = [0u8; VERSION_KEY_LEN];
    start[0] = ORPHAN_PREFIX;
    start[1..].copy_from_slice(&version.saturating_add(1).to_be_bytes());
    (start, [ORPHAN_PREFIX + 1])
}

fn orphan_prefix(last_ref_version: u64) -> [u8; 17] {
    let mut key = [0u8; 17];
    key[0] = ORPHAN_PREFIX;
    key[1..9].copy_from_slice(&last_ref_version.saturating_add(1).to_be_bytes());
    key[9..17].copy_from_slice(&last_ref_version.to_be_bytes());
    key
}

// FAST NODES
// ================================================================================================

pub(crate) fn fast_key(key: &[u8]) -> Vec<u8> {
    let mut fast = Vec::with_capacity(1 + key.len());
    fast.push(FAST_PREFIX);
    fast.extend_from_slice(key);
    fast
}

/// Translates a logical key range into the matching range of fast node keys.
pub(crate) fn fast_range(start: Option<&[u8]>, end: Option<&[u8]>) -> (Vec<u8>, Vec<u8>) {
    let start = start.map_or_else(|| vec![FAST_PREFIX], fast_key);
    let end = end.map_or_else(|| vec![FAST_PREFIX + 1], fast_key);
    (start, end)
}

/// Strips the fast prefix from a backend key.
pub(crate) fn strip_fast_prefix(key: &[u8]) -> Option<&[u8]> {
    match key.split_first() {
        Some((&FAST_PREFIX, rest)) => Some(rest),
        _ => None,
    }
}

// HELPERS
// ================================================================================================

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_keys_sort_numerically() {
        assert!(version_key(255) < version_key(256));
        assert!(version_key(1) < version_key(u64::MAX));
        assert_eq!(parse_version_key(&version_key(42)), Some(42));
        assert_eq!(parse_version_key(&node_key(&[0; 32])), None);
    }

    #[test]
    fn orphan_key_round_trip() {
        let record = OrphanRecord { last_ref_version: 9, hash: [7; 32] };
        let key = record.key();
        assert_eq!(key[0], ORPHAN_PREFIX);
        assert_eq!(OrphanRecord::from_key(&key), Some(record));
        assert_eq!(OrphanRecord::from_key(&key[..40]), None);

        let (start, end) = orphan_range(9);
        assert!(start.as_slice() <= key.as_slice() && key.as_slice() < end.as_slice());
        let (start, end) = orphan_range(10);
        assert!(key.as_slice() < start.as_slice() && key.as_slice() < end.as_slice());
    }

    #[test]
    fn fast_range_stays_within_prefix() {
        let (start, end) = fast_range(None, None);
        assert_eq!(start, [FAST_PREFIX]);
        assert_eq!(end, [FAST_LIVE_KEY[0]]);

        let (start, end) = fast_range(Some(b"a"), Some(b"b"));
        assert_eq!(start, [FAST_PREFIX, b'a']);
        assert_eq!(end, [FAST_PREFIX, b'b']);
        assert_eq!(strip_fast_prefix(&start), Some(b"a".as_slice()));
        assert_eq!(strip_fast_prefix(&version_key(1)), None);
    }
}
