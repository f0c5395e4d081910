use std::{path::PathBuf, time::Instant};

use clap::{Parser, ValueEnum};
#[cfg(feature = "rocksdb")]
use iavl_store::storage::{RocksDbConfig, RocksDbStorage};
use iavl_store::{
    storage::{KvStore, MemoryStorage},
    HashFunction, MutableTree, Retention, TreeConfig, TreeError,
};
use rand::{seq::IteratorRandom, thread_rng, Rng};

type Storage = Box<dyn KvStore>;

#[derive(Parser, Debug)]
#[command(name = "Benchmark", about = "IAVL tree benchmark", version, rename_all = "kebab-case")]
pub struct BenchmarkCmd {
    /// Number of key-value pairs the tree is constructed with
    #[arg(short = 'n', long = "size", default_value = "100000")]
    size: usize,
    /// Number of single insertions, each followed by a commit
    #[arg(short = 'i', long = "insertions", default_value = "1000")]
    insertions: usize,
    /// Number of keys updated per batch
    #[arg(short = 'u', long = "updates", default_value = "10000")]
    updates: usize,
    /// Number of update batches, each committed as one version
    #[arg(short = 'b', long = "batches", default_value = "10")]
    batches: usize,
    /// Number of recent versions to keep; all versions are kept if unset
    #[arg(short = 'k', long = "keep-recent")]
    keep_recent: Option<u64>,
    /// Hash function used for node hashes
    #[arg(long = "hash", value_enum, default_value = "sha256")]
    hash: HashKind,
    /// Disable the fast cache
    #[arg(long = "no-fast-cache", default_value = "false")]
    no_fast_cache: bool,
    /// Path for the benchmark database
    #[arg(short = 'p', long = "path")]
    storage_path: Option<PathBuf>,
    /// Open existing database and skip construction
    #[arg(short = 'o', long = "open", default_value = "false")]
    open: bool,
    /// Storage backend to use at runtime: memory or rocksdb
    #[arg(short = 's', long = "storage", value_enum, default_value = "memory")]
    storage: StorageKind,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StorageKind {
    Memory,
    Rocksdb,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum HashKind {
    Sha256,
    Sha3,
    Ripemd160,
    Blake3,
}

impl From<HashKind> for HashFunction {
    fn from(kind: HashKind) -> Self {
        match kind {
            HashKind::Sha256 => HashFunction::Sha256,
            HashKind::Sha3 => HashFunction::Sha3_256,
            HashKind::Ripemd160 => HashFunction::Ripemd160,
            HashKind::Blake3 => HashFunction::Blake3,
        }
    }
}

fn main() -> Result<(), TreeError> {
    benchmark_tree()?;
    println!("Benchmark completed successfully");
    Ok(())
}

/// Runs a benchmark for [`MutableTree`].
pub fn benchmark_tree() -> Result<(), TreeError> {
    let args = BenchmarkCmd::parse();
    println!(
        "Running benchmark with {} storage",
        match args.storage {
            StorageKind::Memory => "memory",
            StorageKind::Rocksdb => "rocksdb",
        }
    );

    let mut config = TreeConfig::new()
        .with_hash_function(args.hash.into())
        .with_fast_cache(!args.no_fast_cache);
    if let Some(keep) = args.keep_recent {
        config = config.with_retention(Retention::KeepRecent(keep));
    }

    let storage = get_storage(args.storage_path.clone(), args.open, args.storage)?;
    let mut tree = if args.open {
        open_existing(storage, config)?
    } else {
        construction(storage, config, args.size)?
    };

    insertion(&mut tree, args.insertions)?;
    for _ in 0..args.batches {
        batched_update(&mut tree, args.updates)?;
    }
    reads(&tree)?;
    iteration(&tree)?;
    proof_generation(&tree)?;
    version_deletion(&mut tree)?;
    tree.close()
}

fn random_key() -> Vec<u8> {
    thread_rng().gen::<[u8; 16]>().to_vec()
}

/// Runs the construction benchmark, returning the constructed tree.
pub fn construction(
    storage: Storage,
    config: TreeConfig,
    size: usize,
) -> Result<MutableTree<Storage>, TreeError> {
    println!("Running a construction benchmark:");
    let now = Instant::now();
    let mut tree = MutableTree::open(storage, config)?;
    for i in 0..size {
        tree.set(&random_key(), &(i as u64).to_be_bytes())?;
    }
    let (root, version) = tree.save_version()?;
    let elapsed = now.elapsed().as_secs_f32();
    println!("Constructed a tree with {size} key-value pairs in {elapsed:.1} seconds");
    println!("Committed version {version} with root {}\n", hex::encode(root));
    Ok(tree)
}

pub fn open_existing(storage: Storage, config: TreeConfig) -> Result<MutableTree<Storage>, TreeError> {
    println!("Opening an existing database:");
    let now = Instant::now();
    let tree = MutableTree::open(storage, config)?;
    let elapsed = now.elapsed().as_secs_f32();
    println!(
        "Opened version {} with {} keys in {elapsed:.1} seconds\n",
        tree.latest_version(),
        tree.size()?
    );
    Ok(tree)
}

/// Runs the insertion benchmark, committing after every insert.
pub fn insertion(tree: &mut MutableTree<Storage>, insertions: usize) -> Result<(), TreeError> {
    println!("Running an insertion benchmark:");
    if insertions == 0 {
        return Ok(());
    }

    let size = tree.size()?;
    let mut set_times = Vec::with_capacity(insertions);
    let mut save_times = Vec::with_capacity(insertions);
    for i in 0..insertions {
        let key = random_key();
        let value = (size + i as u64).to_be_bytes();

        let now = Instant::now();
        tree.set(&key, &value)?;
        set_times.push(now.elapsed().as_micros());

        let now = Instant::now();
        tree.save_version()?;
        save_times.push(now.elapsed().as_micros());
    }

    println!(
        "The average insertion time measured by {insertions} inserts into a tree with {size} keys is {:.0} μs",
        set_times.iter().sum::<u128>() as f64 / insertions as f64,
    );
    println!(
        "The average commit time of a single insertion is {:.0} μs\n",
        save_times.iter().sum::<u128>() as f64 / insertions as f64,
    );
    Ok(())
}

/// Updates or removes randomly chosen existing keys and commits them as one version.
pub fn batched_update(tree: &mut MutableTree<Storage>, updates: usize) -> Result<(), TreeError> {
    const REMOVAL_PROBABILITY: f64 = 0.2;

    println!("Running a batched update benchmark:");
    let size = tree.size()?;
    let mut rng = thread_rng();

    let mut keys = Vec::with_capacity(updates);
    for entry in tree.iterator(None, None, false)? {
        keys.push(entry?.0);
    }
    let keys = keys.into_iter().choose_multiple(&mut rng, updates);
    let updates = keys.len();
    if updates == 0 {
        return Ok(());
    }

    let now = Instant::now();
    for key in &keys {
        if rng.gen_bool(REMOVAL_PROBABILITY) {
            tree.remove(key)?;
        } else {
            tree.set(key, &rng.gen::<u64>().to_be_bytes())?;
        }
    }
    let apply_elapsed = now.elapsed().as_secs_f64() * 1000_f64; // time in ms

    let now = Instant::now();
    let (_, version) = tree.save_version()?;
    let save_elapsed = now.elapsed().as_secs_f64() * 1000_f64; // time in ms

    println!(
        "The average update time measured by a {updates}-batch into a tree with {size} keys over {apply_elapsed:.1} ms is {:.0} μs",
        apply_elapsed * 1000_f64 / updates as f64,
    );
    println!("Committing version {version} took {save_elapsed:.1} ms\n");
    Ok(())
}

/// Compares point reads on the head with reads of the latest committed version.
pub fn reads(tree: &MutableTree<Storage>) -> Result<(), TreeError> {
    const NUM_READS: usize = 1000;

    println!("Running a read benchmark:");
    let mut keys = Vec::with_capacity(NUM_READS);
    for entry in tree.iterator(None, None, false)?.take(NUM_READS) {
        keys.push(entry?.0);
    }
    if keys.is_empty() {
        return Ok(());
    }

    let now = Instant::now();
    for key in &keys {
        tree.get(key)?;
    }
    let head = now.elapsed().as_micros() as f64 / keys.len() as f64;

    let snapshot = tree.load_version(tree.latest_version())?;
    let now = Instant::now();
    for key in &keys {
        snapshot.get(key)?;
    }
    let versioned = now.elapsed().as_micros() as f64 / keys.len() as f64;

    let stats = tree.statistics();
    println!("The average head read time is {head:.1} μs (fast cache: {})", tree.is_fast_cache_enabled());
    println!("The average versioned read time is {versioned:.1} μs");
    println!(
        "Node cache hits: {}, misses: {}; fast cache hits: {}, misses: {}\n",
        stats.cache_hits, stats.cache_misses, stats.fast_cache_hits, stats.fast_cache_misses
    );
    Ok(())
}

/// Iterates the full head and the full latest version.
pub fn iteration(tree: &MutableTree<Storage>) -> Result<(), TreeError> {
    println!("Running an iteration benchmark:");

    let now = Instant::now();
    let mut head = 0usize;
    for entry in tree.iterator(None, None, false)? {
        entry?;
        head += 1;
    }
    let head_elapsed = now.elapsed().as_secs_f64() * 1000_f64;

    let snapshot = tree.load_version(tree.latest_version())?;
    let now = Instant::now();
    let mut versioned = 0usize;
    for entry in snapshot.iterator(None, None, false)? {
        entry?;
        versioned += 1;
    }
    let versioned_elapsed = now.elapsed().as_secs_f64() * 1000_f64;

    println!("Iterated {head} keys of the head in {head_elapsed:.1} ms");
    println!("Iterated {versioned} keys of version {} in {versioned_elapsed:.1} ms\n", snapshot.version());
    Ok(())
}

/// Runs the proof generation benchmark on the latest version.
pub fn proof_generation(tree: &MutableTree<Storage>) -> Result<(), TreeError> {
    const NUM_PROOFS: usize = 100;

    println!("Running a proof generation benchmark:");
    let snapshot = tree.load_version(tree.latest_version())?;
    let size = snapshot.size()?;

    let mut proving_times = Vec::with_capacity(NUM_PROOFS);
    let mut verifying_times = Vec::with_capacity(NUM_PROOFS);
    for _ in 0..NUM_PROOFS {
        let key = random_key();

        let now = Instant::now();
        let proof = snapshot.prove(&key)?;
        proving_times.push(now.elapsed().as_micros());

        let now = Instant::now();
        let valid = proof.verify(&snapshot.hash(), tree.hash_function());
        verifying_times.push(now.elapsed().as_micros());
        if !valid {
            println!("Proof for key {} failed to verify", hex::encode(&key));
        }
    }

    println!(
        "The average proving time measured by {NUM_PROOFS} proofs in a tree with {size} keys is {:.0} μs",
        proving_times.iter().sum::<u128>() as f64 / NUM_PROOFS as f64,
    );
    println!(
        "The average verification time is {:.0} μs\n",
        verifying_times.iter().sum::<u128>() as f64 / NUM_PROOFS as f64,
    );
    Ok(())
}

/// Deletes every version but the latest one.
pub fn version_deletion(tree: &mut MutableTree<Storage>) -> Result<(), TreeError> {
    println!("Running a version deletion benchmark:");
    let latest = tree.latest_version();
    let count = tree.available_versions()?.len().saturating_sub(1);

    let now = Instant::now();
    tree.delete_versions_range(0, latest)?;
    let elapsed = now.elapsed().as_secs_f64() * 1000_f64;
    println!("Deleted {count} versions in {elapsed:.1} ms\n");
    Ok(())
}

#[allow(unused_variables)]
fn get_storage(
    database_path: Option<PathBuf>,
    open: bool,
    kind: StorageKind,
) -> Result<Storage, TreeError> {
    match kind {
        StorageKind::Memory => Ok(Box::new(MemoryStorage::new())),
        StorageKind::Rocksdb => {
            #[cfg(feature = "rocksdb")]
            {
                let path = database_path
                    .unwrap_or_else(|| std::env::temp_dir().join("iavl_store_benchmark"));
                println!("Using database path: {}", path.display());
                if !open && path.exists() {
                    // a fresh database is constructed
                    std::fs::remove_dir_all(&path).map_err(|e| {
                        TreeError::InvalidArgument(format!("cannot clear {}: {e}", path.display()))
                    })?;
                }
                let db = RocksDbStorage::open(
                    RocksDbConfig::new(path).with_cache_size(1 << 30).with_max_open_files(2048),
                )?;
                Ok(Box::new(db))
            }
            #[cfg(not(feature = "rocksdb"))]
            {
                eprintln!("rocksdb feature not enabled; falling back to memory storage");
                Ok(Box::new(MemoryStorage::new()))
            }
        },
    }
}
