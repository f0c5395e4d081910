use assert_matches::assert_matches;
use iavl_store::{storage::MemoryStorage, KeyProof, MutableTree, TreeError};

fn new_tree() -> MutableTree<MemoryStorage> {
    MutableTree::new(MemoryStorage::new(), 1_000).unwrap()
}

fn ascending_tree() -> MutableTree<MemoryStorage> {
    let mut tree = new_tree();
    for i in 1..=1000u32 {
        tree.set(format!("{i:04}").as_bytes(), i.to_string().as_bytes()).unwrap();
    }
    assert_eq!(tree.save_version().unwrap().1, 1);
    tree
}

#[test]
fn test_insert_and_retrieve() {
    let mut tree = new_tree();
    tree.set(b"alpha", b"1").unwrap();
    let (root, version) = tree.save_version().unwrap();
    assert_eq!(version, 1);
    assert_eq!(tree.hash(), root);
    assert_eq!(tree.get(b"alpha").unwrap(), Some(b"1".to_vec()));
    assert!(!tree.has(b"beta").unwrap());
}

#[test]
fn test_update_keeps_versions_immutable() {
    let mut tree = new_tree();
    tree.set(b"alpha", b"1").unwrap();
    let (h1, v1) = tree.save_version().unwrap();
    tree.set(b"alpha", b"2").unwrap();
    let (h2, v2) = tree.save_version().unwrap();

    assert_eq!((v1, v2), (1, 2));
    assert_eq!(tree.load_version(1).unwrap().get(b"alpha").unwrap(), Some(b"1".to_vec()));
    assert_eq!(tree.load_version(2).unwrap().get(b"alpha").unwrap(), Some(b"2".to_vec()));
    assert_ne!(h1, h2);
}

#[test]
fn test_balance_after_ascending_inserts() {
    let tree = ascending_tree();
    let snapshot = tree.load_version(1).unwrap();
    assert!(snapshot.height().unwrap() <= 15);
    assert_eq!(snapshot.size().unwrap(), 1000);

    for i in (1..=1000u32).step_by(7) {
        let key = format!("{i:04}");
        let expected = Some(i.to_string().into_bytes());
        assert_eq!(snapshot.get(key.as_bytes()).unwrap(), expected);
        assert_eq!(tree.get(key.as_bytes()).unwrap(), expected);
    }
}

#[test]
fn test_fast_and_slow_iteration_parity() {
    let tree = ascending_tree();
    let head: Vec<_> = tree.iterator(None, None, false).unwrap().map(Result::unwrap).collect();
    let snapshot = tree.load_version(1).unwrap();
    let stored: Vec<_> =
        snapshot.iterator(None, None, false).unwrap().map(Result::unwrap).collect();

    let expected: Vec<_> = (1..=1000u32)
        .map(|i| (format!("{i:04}").into_bytes(), i.to_string().into_bytes()))
        .collect();
    assert_eq!(head, expected);
    assert_eq!(stored, expected);

    let head: Vec<_> = tree
        .iterator(Some(b"0100"), Some(b"0200"), true)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    let stored: Vec<_> = snapshot
        .iterator(Some(b"0100"), Some(b"0200"), true)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(head.len(), 100);
    assert_eq!(head.first().map(|(k, _)| k.as_slice()), Some(b"0199".as_slice()));
    assert_eq!(head, stored);
}

#[test]
fn test_delete_middle_version() {
    let mut tree = new_tree();
    for key in ["a", "b", "c"] {
        tree.set(key.as_bytes(), format!("{key}-value").as_bytes()).unwrap();
        tree.save_version().unwrap();
    }

    tree.delete_version(2).unwrap();
    assert_eq!(tree.load_version(1).unwrap().get(b"a").unwrap(), Some(b"a-value".to_vec()));
    assert_matches!(tree.load_version(2), Err(TreeError::VersionNotFound(2)));

    let latest = tree.load_version(3).unwrap();
    let entries: Vec<_> = latest.iterator(None, None, false).unwrap().map(Result::unwrap).collect();
    assert_eq!(
        entries,
        vec![
            (b"a".to_vec(), b"a-value".to_vec()),
            (b"b".to_vec(), b"b-value".to_vec()),
            (b"c".to_vec(), b"c-value".to_vec()),
        ]
    );
}

#[test]
fn test_latest_version_cannot_be_deleted() {
    let mut tree = new_tree();
    tree.set(b"alpha", b"1").unwrap();
    for _ in 0..7 {
        tree.save_version().unwrap();
    }
    assert_eq!(tree.latest_version(), 7);
    assert_matches!(tree.delete_version(7), Err(TreeError::VersionInUse(7)));
    assert!(tree.version_exists(7).unwrap());
}

#[test]
fn test_proofs_against_committed_root() {
    let tree = ascending_tree();
    let snapshot = tree.load_version(1).unwrap();
    let root = snapshot.hash();

    let proof = snapshot.prove(b"0500").unwrap();
    assert_matches!(&proof, KeyProof::Exists(p) if p.value == b"500");
    assert!(proof.verify(&root, tree.hash_function()));

    let proof = snapshot.prove(b"0500a").unwrap();
    assert_matches!(&proof, KeyProof::Absent(_));
    assert!(proof.verify(&root, tree.hash_function()));
}
