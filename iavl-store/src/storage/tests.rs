use assert_matches::assert_matches;

use super::*;

fn populated() -> MemoryStorage {
    let storage = MemoryStorage::new();
    for key in [b"a".as_slice(), b"b", b"c", b"d"] {
        storage.put(key, &[key[0].to_ascii_uppercase()]).unwrap();
    }
    storage
}

fn keys(iter: KvIter<'_>) -> Vec<Vec<u8>> {
    iter.map(|item| item.unwrap().0).collect()
}

#[test]
fn memory_get_put_delete() {
    let storage = MemoryStorage::new();
    assert_eq!(storage.get(b"k").unwrap(), None);
    assert!(!storage.has(b"k").unwrap());

    storage.put(b"k", b"").unwrap();
    assert_eq!(storage.get(b"k").unwrap(), Some(Vec::new()));
    assert!(storage.has(b"k").unwrap());

    storage.put(b"k", b"v").unwrap();
    assert_eq!(storage.get(b"k").unwrap(), Some(b"v".to_vec()));

    storage.delete(b"k").unwrap();
    storage.delete(b"k").unwrap();
    assert_eq!(storage.get(b"k").unwrap(), None);
}

#[test]
fn memory_rejects_empty_keys() {
    let storage = MemoryStorage::new();
    assert_matches!(storage.put(b"", b"v"), Err(StorageError::EmptyKey));
    assert_matches!(storage.get(b""), Err(StorageError::EmptyKey));
    assert_matches!(storage.iter(Some(b""), None, false).err(), Some(StorageError::EmptyKey));
    assert_matches!(storage.iter(None, Some(b""), true).err(), Some(StorageError::EmptyKey));

    let mut batch = WriteBatch::new();
    batch.put(b"x".to_vec(), b"1".to_vec());
    batch.put(Vec::new(), b"2".to_vec());
    assert_matches!(storage.write(batch), Err(StorageError::EmptyKey));
    assert_eq!(storage.get(b"x").unwrap(), None, "a rejected batch must not be partially applied");
}

#[test]
fn memory_iter_is_half_open() {
    let storage = populated();
    assert_eq!(keys(storage.iter(None, None, false).unwrap()), [b"a", b"b", b"c", b"d"]);
    assert_eq!(keys(storage.iter(Some(b"b"), Some(b"d"), false).unwrap()), [b"b", b"c"]);
    assert_eq!(keys(storage.iter(Some(b"b"), Some(b"d"), true).unwrap()), [b"c", b"b"]);
    assert_eq!(keys(storage.iter(None, Some(b"b"), true).unwrap()), [b"a"]);
    assert_eq!(keys(storage.iter(Some(b"bb"), None, false).unwrap()), [b"c", b"d"]);
    assert!(keys(storage.iter(Some(b"d"), Some(b"a"), false).unwrap()).is_empty());
}

#[test]
fn memory_iter_is_a_snapshot() {
    let storage = populated();
    let iter = storage.iter(None, None, false).unwrap();
    storage.put(b"e", b"E").unwrap();
    storage.delete(b"a").unwrap();
    assert_eq!(keys(iter), [b"a", b"b", b"c", b"d"]);
}

#[test]
fn memory_batch_applies_all_operations() {
    let storage = populated();
    let mut batch = WriteBatch::new();
    batch.put(b"e".to_vec(), b"E".to_vec());
    batch.delete(b"a".to_vec());
    batch.put(b"b".to_vec(), b"B2".to_vec());
    // a later operation on the same key replaces the earlier one
    batch.put(b"z".to_vec(), b"Z".to_vec());
    batch.delete(b"z".to_vec());
    assert_eq!(batch.len(), 4);
    assert_eq!(batch.get(b"z"), Some(None));

    storage.write(batch).unwrap();
    assert_eq!(keys(storage.iter(None, None, false).unwrap()), [b"b", b"c", b"d", b"e"]);
    assert_eq!(storage.get(b"b").unwrap(), Some(b"B2".to_vec()));
    assert_eq!(storage.len().unwrap(), 4);
}

#[test]
fn boxed_storage_is_storage() {
    let storage: Box<dyn KvStore> = Box::new(populated());
    assert_eq!(storage.get(b"c").unwrap(), Some(b"C".to_vec()));
    assert_eq!(keys(storage.iter(None, None, true).unwrap()), [b"d", b"c", b"b", b"a"]);
}
