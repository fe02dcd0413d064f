use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;
use tierkv::Config;

fn tree_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tree::insert");

    for run_capacity in [100, 800] {
        group.bench_function(format!("Tree::insert - {run_capacity} keys per run"), |b| {
            let folder = tempfile::tempdir().unwrap();
            let tree = Config::new(&folder)
                .buffer_run_capacity(run_capacity)
                .open()
                .unwrap();

            let mut rng = rand::rng();

            b.iter(|| {
                let key = rng.random_range(0..1_000_000);
                tree.insert(key, key).unwrap();
            });
        });
    }
}

fn tree_point_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tree::get");

    for bloom_fp_rate in [None, Some(0.01)] {
        let folder = tempfile::tempdir().unwrap();
        let tree = Config::new(&folder)
            .buffer_run_capacity(100)
            .buffer_run_count(10)
            .bloom_fp_rate(bloom_fp_rate)
            .open()
            .unwrap();

        for key in 0..100_000 {
            tree.insert(key * 2, key).unwrap();
        }
        tree.wait_for_compaction().unwrap();

        let mut rng = rand::rng();

        group.bench_function(format!("Tree::get (existing), bloom: {bloom_fp_rate:?}"), |b| {
            b.iter(|| {
                let key = rng.random_range(0..100_000) * 2;
                assert!(tree.get(key).unwrap().is_some());
            });
        });

        group.bench_function(format!("Tree::get (missing), bloom: {bloom_fp_rate:?}"), |b| {
            b.iter(|| {
                let key = rng.random_range(0..100_000) * 2 + 1;
                assert!(tree.get(key).unwrap().is_none());
            });
        });
    }
}

fn tree_range(c: &mut Criterion) {
    let folder = tempfile::tempdir().unwrap();
    let tree = Config::new(&folder)
        .buffer_run_capacity(100)
        .buffer_run_count(10)
        .open()
        .unwrap();

    for key in 0..100_000 {
        tree.insert(key, key).unwrap();
    }
    tree.wait_for_compaction().unwrap();

    let mut group = c.benchmark_group("Tree::range");

    for width in [10, 1_000] {
        group.bench_function(format!("Tree::range - {width} keys"), |b| {
            let mut rng = rand::rng();

            b.iter(|| {
                let lo = rng.random_range(0..100_000 - width);
                assert_eq!(width as usize, tree.range(lo, lo + width).unwrap().len());
            });
        });
    }
}

criterion_group!(benches, tree_insert, tree_point_read, tree_range);
criterion_main!(benches);
