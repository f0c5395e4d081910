//! Hash functions used to derive node and root hashes.
//!
//! The tree is agnostic to the concrete digest: every node hash is a 32-byte value produced by
//! the [HashFunction] the store was created with. The choice is persisted alongside the tree
//! data and must stay constant for the lifetime of a backend.

use core::fmt;

use sha2::{Digest, Sha256};
use sha3::Sha3_256;


// CONSTANTS
// ================================================================================================

/// Number of bytes in a node hash.
pub const HASH_LEN: usize = 32;

/// Hash of the empty tree.
///
/// This is the all-zero pattern, which no hash function produces for a real node with more than
/// negligible probability.
pub const EMPTY_HASH: NodeHash = [0; HASH_LEN];

// TYPES
// ================================================================================================

/// A 32-byte node or root hash.
pub type NodeHash = [u8; HASH_LEN];

/// The collision-resistant hash function applied to node preimages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HashFunction {
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA3-256.
    Sha3_256,
    /// RIPEMD-160. The 20-byte digest is zero-extended to 32 bytes.
    Ripemd160,
    /// BLAKE3 with its default 32-byte output.
    Blake3,
}

impl HashFunction {
    /// Hashes `data` into a 32-byte digest.
    pub fn digest(&self, data: &[u8]) -> NodeHash {
        match self {
            Self::Sha256 => widen(&Sha256::digest(data)),
            Self::Sha3_256 => widen(&Sha3_256::digest(data)),
            Self::Ripemd160 => widen(&ripemd::Ripemd160::digest(data)),
            Self::Blake3 => *blake3::hash(data).as_bytes(),
        }
    }

    /// Returns the identifier under which this function is persisted in the backend.
    pub const fn id(&self) -> u8 {
        match self {
            Self::Sha256 => 1,
            Self::Sha3_256 => 2,
            Self::Ripemd160 => 3,
            Self::Blake3 => 4,
        }
    }

    /// Returns the hash function with the given persisted identifier, if any.
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Sha256),
            2 => Some(Self::Sha3_256),
            3 => Some(Self::Ripemd160),
            4 => Some(Self::Blake3),
            _ => None,
        }
    }
}

impl fmt::Display for HashFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha256 => "sha256",
            Self::Sha3_256 => "sha3_256",
            Self::Ripemd160 => "ripemd160",
            Self::Blake3 => "blake3",
        };
        f.write_str(name)
    }
}

// HELPERS
// ================================================================================================

/// Copies a digest of at most [HASH_LEN] bytes into a zero-padded node hash.
fn widen(digest: &[u8]) -> NodeHash {
    let mut out = [0u8; HASH_LEN];
    out[..digest.len()].copy_from_slice(digest);
    out
}
