//! Benchmark configuration constants.

use std::time::Duration;

// === Core Configuration ===
/// Default measurement time for most benchmarks
pub const DEFAULT_MEASUREMENT_TIME: Duration = Duration::from_secs(10);

/// Sample size for statistical significance
pub const DEFAULT_SAMPLE_SIZE: usize = 20;

// === Tree Configuration ===
/// Number of keys the tree is populated with before measuring
pub const TREE_SIZES: &[usize] = &[
    1_000,   // Small tree
    10_000,  // Medium tree
    100_000, // Large tree
];

/// Number of updates committed as one version
pub const BATCH_SIZES: &[usize] = &[
    1,     // Single update
    100,   // Small batch
    1_000, // Medium batch
];

/// Length of the generated keys, in bytes
pub const KEY_LEN: usize = 16;

/// Length of the generated values, in bytes
pub const VALUE_LEN: usize = 32;

/// Node cache capacity used by all benchmarks
pub const CACHE_CAPACITY: usize = 10_000;
