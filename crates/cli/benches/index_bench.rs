use container::fixtures::{jpeg_payload, ContainerBuilder, RecordSpec};
use container::{ContainerReader, RecordSet, VERSION_10};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use mapper::HashMapper;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rbtree::RbTree;
use std::io::Cursor;

const N_KEYS: u64 = 100_000;

fn shuffled_keys() -> Vec<u64> {
    let mut keys: Vec<u64> = (1..=N_KEYS).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(0x5eed));
    keys
}

fn rbtree_insert_benchmark(c: &mut Criterion) {
    let keys = shuffled_keys();
    c.bench_function("rbtree_insert_100k_shuffled", |b| {
        b.iter(|| {
            let mut t = RbTree::new();
            for &k in &keys {
                t.insert(k, k).unwrap();
            }
            t
        });
    });
}

fn rbtree_lookup_benchmark(c: &mut Criterion) {
    let keys = shuffled_keys();
    let mut t = RbTree::new();
    for &k in &keys {
        t.insert(k, ()).unwrap();
    }
    c.bench_function("rbtree_find_100k", |b| {
        b.iter(|| keys.iter().filter(|k| t.find(k).is_some()).count());
    });
}

fn rbtree_remove_benchmark(c: &mut Criterion) {
    let keys = shuffled_keys();
    c.bench_function("rbtree_remove_100k", |b| {
        b.iter_batched(
            || {
                let mut t = RbTree::new();
                for &k in &keys {
                    t.insert(k, ()).unwrap();
                }
                t
            },
            |mut t| {
                for k in &keys {
                    t.remove_key(k).unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn mapper_build_benchmark(c: &mut Criterion) {
    let mut builder = ContainerBuilder::new(VERSION_10);
    for i in 0..10_000u64 {
        // every tenth hash collides with its predecessor
        let hash = 1 + i - u64::from(i % 10 == 9);
        builder = builder.record(RecordSpec::new(hash, "r", &jpeg_payload(8)));
    }
    let parsed = ContainerReader::from_reader(Cursor::new(builder.build().bytes), "bench.db")
        .unwrap()
        .parse(|| false)
        .unwrap();
    let mut base = RecordSet::new();
    for r in parsed.records {
        base.insert(r);
    }

    c.bench_function("mapper_build_index_10k", |b| {
        b.iter_batched(
            || base.clone(),
            |mut set| {
                let mut m = HashMapper::new();
                m.build_index(&mut set)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    rbtree_insert_benchmark,
    rbtree_lookup_benchmark,
    rbtree_remove_benchmark,
    mapper_build_benchmark
);
criterion_main!(benches);
