use std::hint;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use iavl_store::{storage::MemoryStorage, MutableTree, TreeConfig};

mod common;
use common::*;

use crate::{
    common::data::{generate_entries_random, generate_tree, generate_values_random},
    config::{BATCH_SIZES, DEFAULT_MEASUREMENT_TIME, DEFAULT_SAMPLE_SIZE, TREE_SIZES},
};

benchmark_sizes! {
    mutable_tree_construction,
    "mutable-tree-construction",
    TREE_SIZES,
    |b: &mut criterion::Bencher, size: usize| {
        let entries = generate_entries_random(size);
        b.iter(|| hint::black_box(generate_tree(&entries, TreeConfig::new()).hash()))
    },
    |size| Some(criterion::Throughput::Elements(size as u64))
}

benchmark_sizes! {
    mutable_tree_save_version,
    "mutable-tree-save-version",
    BATCH_SIZES,
    |b: &mut criterion::Bencher, size: usize| {
        let entries = generate_entries_random(10_000);
        let values = generate_values_random(size, 7);
        b.iter_batched(
            || generate_tree(&entries, TreeConfig::new()),
            |mut tree: MutableTree<MemoryStorage>| {
                for ((key, _), value) in entries.iter().zip(&values) {
                    tree.set(key, value).unwrap();
                }
                hint::black_box(tree.save_version().unwrap())
            },
            BatchSize::LargeInput,
        )
    },
    |size| Some(criterion::Throughput::Elements(size as u64))
}

benchmark_with_setup_data! {
    mutable_tree_get_versioned,
    DEFAULT_MEASUREMENT_TIME,
    DEFAULT_SAMPLE_SIZE,
    "mutable-tree-get-versioned",
    || {
        let entries = generate_entries_random(10_000);
        let tree = generate_tree(&entries, TreeConfig::new());
        (tree, entries)
    },
    |b: &mut criterion::Bencher, (tree, entries): &(MutableTree<MemoryStorage>, Vec<(Vec<u8>, Vec<u8>)>)| {
        let snapshot = tree.load_version(1).unwrap();
        b.iter(|| {
            for (key, _) in entries.iter().take(100) {
                hint::black_box(snapshot.get(key).unwrap());
            }
        })
    },
}

benchmark_with_setup_data! {
    mutable_tree_prove,
    DEFAULT_MEASUREMENT_TIME,
    DEFAULT_SAMPLE_SIZE,
    "mutable-tree-prove",
    || {
        let entries = generate_entries_random(10_000);
        let tree = generate_tree(&entries, TreeConfig::new());
        (tree, entries)
    },
    |b: &mut criterion::Bencher, (tree, entries): &(MutableTree<MemoryStorage>, Vec<(Vec<u8>, Vec<u8>)>)| {
        let snapshot = tree.load_version(1).unwrap();
        b.iter(|| {
            for (key, _) in entries.iter().take(100) {
                hint::black_box(snapshot.prove(key).unwrap());
            }
        })
    },
}

benchmark_sizes! {
    mutable_tree_delete_version,
    "mutable-tree-delete-version",
    BATCH_SIZES,
    |b: &mut criterion::Bencher, size: usize| {
        let entries = generate_entries_random(10_000);
        let values = generate_values_random(size, 11);
        b.iter_batched(
            || {
                let mut tree = generate_tree(&entries, TreeConfig::new());
                for ((key, _), value) in entries.iter().zip(&values) {
                    tree.set(key, value).unwrap();
                }
                tree.save_version().unwrap();
                tree
            },
            |mut tree: MutableTree<MemoryStorage>| tree.delete_version(1).unwrap(),
            BatchSize::LargeInput,
        )
    },
    |size| Some(criterion::Throughput::Elements(size as u64))
}

criterion_group!(
    mutable_tree_benchmark_group,
    mutable_tree_construction,
    mutable_tree_save_version,
    mutable_tree_get_versioned,
    mutable_tree_prove,
    mutable_tree_delete_version,
);

criterion_main!(mutable_tree_benchmark_group);
