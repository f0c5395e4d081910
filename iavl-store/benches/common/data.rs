//! Data generation utilities for reproducible benchmark inputs.
//!
//! Random inputs are drawn from a seeded ChaCha generator, so repeated runs measure the same
//! workload.

use iavl_store::{storage::MemoryStorage, MutableTree, TreeConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::config::{CACHE_CAPACITY, KEY_LEN, VALUE_LEN};

const SEED: u64 = 0x1a71;

// === Key and Value Generation ===

/// Generate ascending, zero-padded keys
pub fn generate_keys_sequential(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| format!("{i:0width$}", width = KEY_LEN).into_bytes()).collect()
}

/// Generate random key-value pairs with a fixed seed
pub fn generate_entries_random(count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    (0..count)
        .map(|_| {
            let key: [u8; KEY_LEN] = rng.gen();
            let value: [u8; VALUE_LEN] = rng.gen();
            (key.to_vec(), value.to_vec())
        })
        .collect()
}

/// Generate random values for the given number of updates
pub fn generate_values_random(count: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(|_| rng.gen::<[u8; VALUE_LEN]>().to_vec()).collect()
}

// === Tree Construction ===

/// Build a tree holding `entries`, committed as version 1
pub fn generate_tree(
    entries: &[(Vec<u8>, Vec<u8>)],
    config: TreeConfig,
) -> MutableTree<MemoryStorage> {
    let mut tree =
        MutableTree::open(MemoryStorage::new(), config.with_cache_capacity(CACHE_CAPACITY))
            .unwrap();
    for (key, value) in entries {
        tree.set(key, value).unwrap();
    }
    tree.save_version().unwrap();
    tree
}
