use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use relkv::core::config::Config;
use relkv::core::store::StoreManager;
use relkv::core::types::Record;
use relkv::storage::key::TableKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    value: f64,
    tags: Vec<String>,
}
impl Record for Reading {}

/// Helper to create a random reading
fn create_reading(rng: &mut impl Rng) -> Reading {
    let sensors = ["north", "south", "east", "west"];
    Reading {
        sensor: sensors[rng.gen_range(0..sensors.len())].to_string(),
        value: rng.gen_range(0.0..100.0),
        tags: (0..rng.gen_range(0..4)).map(|i| format!("tag{}", i)).collect(),
    }
}

fn seeded_store(rows: usize) -> StoreManager {
    let store = StoreManager::in_memory(Config::default());
    let mut rng = rand::thread_rng();
    for _ in 0..rows {
        store.insert(&create_reading(&mut rng)).unwrap();
    }
    store
}

/// Benchmark single record insertion
fn bench_insert(c: &mut Criterion) {
    let store = StoreManager::in_memory(Config::default());
    let mut rng = rand::thread_rng();

    c.bench_function("insert", |b| {
        b.iter(|| {
            let reading = create_reading(&mut rng);
            black_box(store.insert(&reading).unwrap());
        });
    });
}

/// Benchmark parallel scans over tables of growing size
fn bench_find_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_all");

    for rows in [100, 1_000, 10_000].iter() {
        let store = seeded_store(*rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, _| {
            b.iter(|| {
                let hot = store.find_all::<Reading, _>(|_, r| r.value > 90.0);
                black_box(hot.len());
            });
        });
    }

    group.finish();
}

/// Benchmark cascading delete of a fan-out tree
fn bench_deep_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_delete");
    group.sample_size(20);

    for fan_out in [10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(fan_out), fan_out, |b, &fan_out| {
            b.iter_with_setup(
                || {
                    let store = StoreManager::in_memory(Config::default());
                    let mut rng = rand::thread_rng();
                    let root = store.insert(&create_reading(&mut rng)).unwrap();
                    let children: Vec<TableKey> = (0..fan_out)
                        .map(|_| store.insert(&create_reading(&mut rng)).unwrap())
                        .collect();
                    store.link(&root, false, &children).unwrap();
                    (store, root)
                },
                |(store, root)| {
                    store.deep_delete(&root).unwrap();
                    black_box(store.count_all());
                },
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_find_all, bench_deep_delete);
criterion_main!(benches);
