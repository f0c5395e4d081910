use crate::hash::HashFunction;

// CONSTANTS
// ================================================================================================

/// Default number of decoded nodes kept in the node cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

// RETENTION
// ================================================================================================

/// Which committed versions a tree keeps after each save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Retention {
    /// Keep every version until it is deleted explicitly.
    #[default]
    All,
    /// Keep only the given number of most recent versions; must be at least 1.
    KeepRecent(u64),
}

// TREE CONFIG
// ================================================================================================

/// Options for opening a [`MutableTree`](super::MutableTree).
///
/// # Examples
/// ```
/// use iavl_store::{HashFunction, Retention, TreeConfig};
///
/// let config = TreeConfig::new()
///     .with_cache_capacity(50_000)
///     .with_hash_function(HashFunction::Sha3_256)
///     .with_retention(Retention::KeepRecent(100));
/// assert!(config.fast_cache_enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TreeConfig {
    /// Maximum number of decoded nodes kept in memory; zero disables node caching.
    pub cache_capacity: usize,
    /// Hash function used for node hashes. Must match the one the store was created with.
    pub hash_function: HashFunction,
    /// Whether the fast cache is maintained and consulted for reads on the head.
    pub fast_cache_enabled: bool,
    /// Which versions are kept after each save.
    pub retention: Retention,
    /// Version assigned to the first commit of an empty store. Values below 1 mean 1.
    pub initial_version: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            hash_function: HashFunction::default(),
            fast_cache_enabled: true,
            retention: Retention::All,
            initial_version: 0,
        }
    }
}

impl TreeConfig {
    /// Returns the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_hash_function(mut self, hash_function: HashFunction) -> Self {
        self.hash_function = hash_function;
        self
    }

    pub fn with_fast_cache(mut self, enabled: bool) -> Self {
        self.fast_cache_enabled = enabled;
        self
    }

    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_initial_version(mut self, version: u64) -> Self {
        self.initial_version = version;
        self
    }
}
