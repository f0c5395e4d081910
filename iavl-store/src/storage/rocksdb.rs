use std::{path::PathBuf, sync::Arc};

use rocksdb::{
    BlockBasedOptions, Cache, DBCompactionStyle, DBCompressionType, FlushOptions, IteratorMode,
    Options, ReadOptions, WriteBatch as DbWriteBatch, WriteOptions, DB,
};

use super::{check_bounds, check_key, KvIter, KvStore, StorageError, WriteBatch};

/// A RocksDB-backed persistent implementation of the `KvStore` trait.
///
/// All tree data lives in the default column family; the tree's one-byte key prefixes already
/// partition the key space and keep related records adjacent for range scans. Cursors are
/// backed by RocksDB iterators, which pin an implicit snapshot at creation.
#[derive(Debug, Clone)]
pub struct RocksDbStorage {
    db: Arc<DB>,
}

impl RocksDbStorage {
    /// Opens or creates a RocksDB database at the path given in `config`.
    ///
    /// # Errors
    /// Returns `StorageError::Backend` if the database cannot be opened or configured,
    /// for example, due to path issues, permissions, or RocksDB internal errors.
    pub fn open(config: RocksDbConfig) -> Result<Self, StorageError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        // Tune compaction threads to match CPU cores
        db_opts.increase_parallelism(rayon::current_num_threads() as i32);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_max_background_jobs(rayon::current_num_threads() as i32);
        db_opts.set_max_total_wal_size(512 * 1024 * 1024);

        let cache = Cache::new_lru_cache(config.cache_size);

        let mut table_opts = BlockBasedOptions::default();
        table_opts.set_block_cache(&cache);
        // Node and fast-node lookups are point reads
        table_opts.set_bloom_filter(10.0, false);
        table_opts.set_whole_key_filtering(true);
        table_opts.set_pin_l0_filter_and_index_blocks_in_cache(true);

        db_opts.set_block_based_table_factory(&table_opts);
        // 128 MB memtable
        db_opts.set_write_buffer_size(128 << 20);
        db_opts.set_max_write_buffer_number(3);
        db_opts.set_min_write_buffer_number_to_merge(1);
        db_opts.set_compaction_style(DBCompactionStyle::Level);
        db_opts.set_target_file_size_base(512 << 20);
        db_opts.set_target_file_size_multiplier(2);
        db_opts.set_compression_type(DBCompressionType::Lz4);
        db_opts.set_level_zero_file_num_compaction_trigger(8);

        let db = DB::open(&db_opts, config.path)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Flushes memtables and the write-ahead log to disk.
    ///
    /// # Errors
    /// Returns `StorageError::Backend` if the flush operation fails.
    fn flush(&self) -> Result<(), StorageError> {
        let mut fopts = FlushOptions::default();
        fopts.set_wait(true);
        self.db.flush_opt(&fopts)?;
        self.db.flush_wal(true)?;
        Ok(())
    }
}

impl KvStore for RocksDbStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        check_key(key)?;
        Ok(self.db.get(key)?)
    }

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        check_key(key)?;
        Ok(self.db.get_pinned(key)?.is_some())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        Ok(self.db.put(key, value)?)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        Ok(self.db.delete(key)?)
    }

    /// Returns a cursor over `[start, end)` using RocksDB's native iterate bounds.
    ///
    /// # Errors
    /// Returns `StorageError::EmptyKey` for empty bounds.
    fn iter(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> Result<KvIter<'_>, StorageError> {
        check_bounds(start, end)?;
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Ok(Box::new(core::iter::empty()));
            }
        }

        let mut read_opts = ReadOptions::default();
        read_opts.set_total_order_seek(true);
        if let Some(start) = start {
            read_opts.set_iterate_lower_bound(start.to_vec());
        }
        if let Some(end) = end {
            read_opts.set_iterate_upper_bound(end.to_vec());
        }
        let mode = if reverse { IteratorMode::End } else { IteratorMode::Start };

        let iter = self.db.iterator_opt(mode, read_opts).map(|item| {
            item.map(|(key, value)| (key.into_vec(), value.into_vec()))
                .map_err(StorageError::from)
        });
        Ok(Box::new(iter))
    }

    /// Converts `batch` into a native RocksDB write batch and commits it.
    ///
    /// # Errors
    /// Returns `StorageError::EmptyKey` if the batch contains an empty key, or
    /// `StorageError::Backend` if RocksDB rejects the write.
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut db_batch = DbWriteBatch::default();
        for (key, op) in batch {
            check_key(&key)?;
            match op {
                Some(value) => db_batch.put(key, value),
                None => db_batch.delete(key),
            }
        }

        let mut write_opts = WriteOptions::default();
        // Durability is provided by the WAL; `sync` forces it to disk on demand.
        write_opts.set_sync(false);
        self.db.write_opt(db_batch, &write_opts)?;
        Ok(())
    }

    fn sync(&self) -> Result<(), StorageError> {
        self.flush()
    }
}

/// Flushes the database before the last handle is dropped.
impl Drop for RocksDbStorage {
    fn drop(&mut self) {
        if Arc::strong_count(&self.db) > 1 {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to flush RocksDB on drop");
        }
    }
}

// CONFIG
// ================================================================================================

/// Configuration for opening a [RocksDbStorage].
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// The filesystem path where the RocksDB database is stored.
    pub(crate) path: PathBuf,

    /// Size of the shared block cache, in bytes. Default: 1 GB.
    pub(crate) cache_size: usize,

    /// Maximum number of files RocksDB may keep open at the same time. Default: 512.
    pub(crate) max_open_files: i32,
}

impl RocksDbConfig {
    /// Creates a new RocksDbConfig with the given database path and default settings.
    ///
    /// # Examples
    /// ```
    /// use iavl_store::storage::RocksDbConfig;
    ///
    /// let config = RocksDbConfig::new("/path/to/database");
    /// ```
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            cache_size: 1 << 30,
            max_open_files: 512,
        }
    }

    /// Sets the block cache size for RocksDB, in bytes.
    ///
    /// # Examples
    /// ```
    /// use iavl_store::storage::RocksDbConfig;
    ///
    /// let config = RocksDbConfig::new("/path/to/database").with_cache_size(256 << 20);
    /// ```
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Sets the maximum number of files that RocksDB can have open simultaneously.
    ///
    /// # Examples
    /// ```
    /// use iavl_store::storage::RocksDbConfig;
    ///
    /// let config = RocksDbConfig::new("/path/to/database").with_max_open_files(1024);
    /// ```
    pub fn with_max_open_files(mut self, count: i32) -> Self {
        self.max_open_files = count;
        self
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::Backend(Box::new(e))
    }
}
