// Benchmark macros to reduce boilerplate code

// Creates a benchmark whose input is built once, outside of the measurement
//
// # Usage
// ```no_run
// benchmark_with_setup_data!(
//     mutable_tree_get,
//     DEFAULT_MEASUREMENT_TIME,
//     DEFAULT_SAMPLE_SIZE,
//     "mutable-tree-get",
//     || generate_tree(&generate_entries_random(1_000), TreeConfig::new()),
//     |b: &mut criterion::Bencher, tree: &MutableTree<MemoryStorage>| b.iter(|| tree.size())
// );
// ```
#[macro_export]
macro_rules! benchmark_with_setup_data {
    (
        $func_name:ident,
        $measurement_time:expr,
        $sample_size:expr,
        $group_name:literal,
        $setup:expr,
        $closure:expr
    ) => {
        fn $func_name(c: &mut Criterion) {
            let mut group = c.benchmark_group($group_name);
            group.measurement_time($measurement_time);
            group.sample_size($sample_size as usize);

            let setup_data = $setup();

            group.bench_function("benchmark", |b| $closure(b, &setup_data));

            group.finish();
        }
    };
    (
        $func_name:ident,
        $measurement_time:expr,
        $sample_size:expr,
        $group_name:literal,
        $setup:expr,
        $closure:expr,
    ) => {
        benchmark_with_setup_data!(
            $func_name,
            $measurement_time,
            $sample_size,
            $group_name,
            $setup,
            $closure
        );
    };
}

// Creates a benchmark parameterized over a list of sizes
//
// # Usage
// ```no_run
// benchmark_sizes!(
//     mutable_tree_set,
//     "mutable-tree-set",
//     TREE_SIZES,
//     |b: &mut criterion::Bencher, size: usize| { /* ... */ },
//     |size| Some(criterion::Throughput::Elements(size as u64))
// );
// ```
#[macro_export]
macro_rules! benchmark_sizes {
    ($func_name:ident, $group_name:literal, $sizes:expr, $closure:expr, $throughput:expr) => {
        fn $func_name(c: &mut Criterion) {
            let mut group = c.benchmark_group($group_name);
            group.measurement_time($crate::common::config::DEFAULT_MEASUREMENT_TIME);
            group.sample_size($crate::common::config::DEFAULT_SAMPLE_SIZE);

            for size_ref in $sizes {
                let size = *size_ref;
                if let Some(t) = $throughput(size) {
                    group.throughput(t);
                }
                group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
                    $closure(b, size)
                });
            }

            group.finish();
        }
    };
}
