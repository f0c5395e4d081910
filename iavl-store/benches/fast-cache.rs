use std::hint;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use iavl_store::TreeConfig;

mod common;
use common::*;

use crate::{
    common::data::{generate_entries_random, generate_keys_sequential, generate_tree},
    config::TREE_SIZES,
};

fn tree_config(fast: bool) -> TreeConfig {
    TreeConfig::new().with_fast_cache(fast)
}

benchmark_sizes! {
    fast_cache_get,
    "fast-cache-get",
    TREE_SIZES,
    |b: &mut criterion::Bencher, size: usize| {
        let entries = generate_entries_random(size);
        let tree = generate_tree(&entries, tree_config(true));
        b.iter(|| {
            for (key, _) in entries.iter().take(100) {
                hint::black_box(tree.get(key).unwrap());
            }
        })
    },
    |_| Some(criterion::Throughput::Elements(100))
}

benchmark_sizes! {
    slow_get,
    "slow-get",
    TREE_SIZES,
    |b: &mut criterion::Bencher, size: usize| {
        let entries = generate_entries_random(size);
        let tree = generate_tree(&entries, tree_config(false));
        b.iter(|| {
            for (key, _) in entries.iter().take(100) {
                hint::black_box(tree.get(key).unwrap());
            }
        })
    },
    |_| Some(criterion::Throughput::Elements(100))
}

benchmark_sizes! {
    fast_cache_iterate,
    "fast-cache-iterate",
    TREE_SIZES,
    |b: &mut criterion::Bencher, size: usize| {
        let keys = generate_keys_sequential(size);
        let entries: Vec<_> = keys.into_iter().map(|key| (key.clone(), key)).collect();
        let tree = generate_tree(&entries, tree_config(true));
        b.iter(|| hint::black_box(tree.iterator(None, None, false).unwrap().count()))
    },
    |size| Some(criterion::Throughput::Elements(size as u64))
}

benchmark_sizes! {
    slow_iterate,
    "slow-iterate",
    TREE_SIZES,
    |b: &mut criterion::Bencher, size: usize| {
        let keys = generate_keys_sequential(size);
        let entries: Vec<_> = keys.into_iter().map(|key| (key.clone(), key)).collect();
        let tree = generate_tree(&entries, tree_config(false));
        b.iter(|| hint::black_box(tree.iterator(None, None, false).unwrap().count()))
    },
    |size| Some(criterion::Throughput::Elements(size as u64))
}

criterion_group!(
    fast_cache_benchmark_group,
    fast_cache_get,
    slow_get,
    fast_cache_iterate,
    slow_iterate,
);

criterion_main!(fast_cache_benchmark_group);
