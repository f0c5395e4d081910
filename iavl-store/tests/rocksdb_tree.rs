#![cfg(feature = "rocksdb")]

use std::path::Path;

use assert_matches::assert_matches;
use iavl_store::{
    storage::{RocksDbConfig, RocksDbStorage},
    MutableTree, Retention, TreeConfig, TreeError,
};
use tempfile::TempDir;

fn setup_storage() -> (RocksDbStorage, TempDir) {
    let temp_dir = tempfile::Builder::new()
        .prefix("test_iavl_rocksdb_")
        .tempdir()
        .expect("Failed to create temporary directory for RocksDB test");
    let storage = open_storage(temp_dir.path());
    (storage, temp_dir)
}

fn open_storage(path: &Path) -> RocksDbStorage {
    RocksDbStorage::open(RocksDbConfig::new(path))
        .expect("Failed to open RocksDbStorage in temporary directory")
}

fn key(i: u64) -> Vec<u8> {
    format!("key{i:06}").into_bytes()
}

#[test]
fn rocksdb_test_commit_and_reopen() {
    let (storage, temp_dir) = setup_storage();
    let mut tree = MutableTree::new(storage, 1_000).unwrap();
    for i in 0..500 {
        tree.set(&key(i), &i.to_be_bytes()).unwrap();
    }
    let (h1, _) = tree.save_version().unwrap();
    for i in (0..500).step_by(3) {
        tree.remove(&key(i)).unwrap();
    }
    let (h2, v2) = tree.save_version().unwrap();
    tree.close().unwrap();

    let tree = MutableTree::new(open_storage(temp_dir.path()), 1_000).unwrap();
    assert_eq!(tree.latest_version(), v2);
    assert_eq!(tree.hash(), h2);
    assert_eq!(tree.version_hash(1).unwrap(), h1);
    assert_eq!(tree.get(&key(0)).unwrap(), None);
    assert_eq!(tree.get(&key(1)).unwrap(), Some(1u64.to_be_bytes().to_vec()));
    assert_eq!(tree.get_versioned(&key(0), 1).unwrap(), Some(0u64.to_be_bytes().to_vec()));
    assert_eq!(tree.size().unwrap(), 333);
}

#[test]
fn rocksdb_test_fast_and_slow_iteration_agree() {
    let (storage, _temp_dir) = setup_storage();
    let mut tree = MutableTree::new(storage, 1_000).unwrap();
    for i in 0..300 {
        tree.set(&key(i), &(i * 2).to_be_bytes()).unwrap();
    }
    tree.save_version().unwrap();
    tree.set(&key(1000), b"pending").unwrap();
    tree.remove(&key(10)).unwrap();

    let snapshot = tree.load_version(1).unwrap();
    let start = key(5);
    let end = key(250);
    let stored: Vec<_> = snapshot
        .iterator(Some(&start), Some(&end), false)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    let head: Vec<_> = tree
        .iterator(Some(&start), Some(&end), false)
        .unwrap()
        .map(Result::unwrap)
        .collect();

    assert_eq!(stored.len(), 245);
    let expected: Vec<_> = stored.into_iter().filter(|(k, _)| k != &key(10)).collect();
    assert_eq!(head, expected);
}

#[test]
fn rocksdb_test_retention_and_garbage_collection() {
    let (storage, temp_dir) = setup_storage();
    let config = TreeConfig::new().with_retention(Retention::KeepRecent(3));
    let mut tree = MutableTree::open(storage, config.clone()).unwrap();
    for version in 1..=10u64 {
        for i in 0..20 {
            tree.set(&key(i), &version.to_be_bytes()).unwrap();
        }
        tree.save_version().unwrap();
    }
    assert_eq!(tree.available_versions().unwrap(), vec![8, 9, 10]);
    assert_matches!(tree.load_version(7), Err(TreeError::VersionNotFound(7)));
    assert_matches!(tree.delete_version(10), Err(TreeError::VersionInUse(10)));
    tree.close().unwrap();

    let tree = MutableTree::open(open_storage(temp_dir.path()), config).unwrap();
    assert_eq!(tree.available_versions().unwrap(), vec![8, 9, 10]);
    assert_eq!(tree.get_versioned(&key(3), 8).unwrap(), Some(8u64.to_be_bytes().to_vec()));
}

#[test]
fn rocksdb_test_export_import() {
    let (source_storage, _source_dir) = setup_storage();
    let mut source = MutableTree::new(source_storage, 1_000).unwrap();
    for i in 0..200 {
        source.set(&key(i), b"v").unwrap();
    }
    source.save_version().unwrap();
    let snapshot = source.load_version(1).unwrap();

    let (target_storage, _target_dir) = setup_storage();
    let mut target = MutableTree::new(target_storage, 1_000).unwrap();
    let mut importer = target.import(1).unwrap();
    for node in snapshot.export() {
        importer.add(node.unwrap()).unwrap();
    }
    assert_eq!(importer.commit().unwrap(), snapshot.hash());
    assert_eq!(target.get(&key(42)).unwrap(), Some(b"v".to_vec()));
    assert_eq!(target.size().unwrap(), 200);
}
