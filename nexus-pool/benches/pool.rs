//! Throughput benchmarks for the hash index and slot store.
//!
//! Run with: cargo bench --bench pool
//!
//! The index is compared against `std::collections::HashMap<u64, u32>`
//! keyed by the same precomputed hashes.

use std::collections::HashMap;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use nexus_pool::{HashIndex, SlotStore, SlotStoreBuilder};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const ITEMS: usize = 100_000;

fn hashes() -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..ITEMS).map(|_| rng.r#gen()).collect()
}

// ============================================================================
// HashIndex
// ============================================================================

fn bench_index_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_add");
    group.throughput(Throughput::Elements(ITEMS as u64));
    let hashes = hashes();

    // Allocate once, reuse via clear()
    let mut index: HashIndex = HashIndex::for_items(ITEMS);
    let mut map: HashMap<u64, u32> = HashMap::with_capacity(ITEMS);

    group.bench_function("nexus-pool", |b| {
        b.iter(|| {
            for (id, &hash) in hashes.iter().enumerate() {
                black_box(index.add(hash, id as u32));
            }
            index.clear();
        });
    });

    group.bench_function("std-hashmap", |b| {
        b.iter(|| {
            for (id, &hash) in hashes.iter().enumerate() {
                black_box(map.insert(hash, id as u32));
            }
            map.clear();
        });
    });

    group.finish();
}

fn bench_index_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_find");
    group.throughput(Throughput::Elements(ITEMS as u64));

    let hashes = hashes();
    let mut order: Vec<usize> = (0..ITEMS).collect();
    order.shuffle(&mut StdRng::seed_from_u64(7));

    let mut index: HashIndex = HashIndex::for_items(ITEMS);
    let mut map: HashMap<u64, u32> = HashMap::with_capacity(ITEMS);
    for (id, &hash) in hashes.iter().enumerate() {
        index.add(hash, id as u32);
        map.insert(hash, id as u32);
    }

    group.bench_function("nexus-pool", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for &i in &order {
                let hash = hashes[i];
                let found = index.find(hash, |id| hashes[id as usize] == hash);
                sum += black_box(found.unwrap_or(0)) as u64;
            }
            sum
        });
    });

    group.bench_function("std-hashmap", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for &i in &order {
                sum += black_box(*map.get(&hashes[i]).unwrap_or(&0)) as u64;
            }
            sum
        });
    });

    group.finish();
}

fn bench_index_remove_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_remove_add");
    group.throughput(Throughput::Elements(1000));

    let hashes = hashes();
    // Few buckets so most removals hit a chain and promote
    let mut index: HashIndex = HashIndex::new(ITEMS / 8);
    for (id, &hash) in hashes.iter().enumerate() {
        index.add(hash, id as u32);
    }

    group.bench_function("nexus-pool/load-8", |b| {
        b.iter(|| {
            for (id, &hash) in hashes.iter().enumerate().take(1000) {
                black_box(index.remove(hash, id as u32));
                index.add(hash, id as u32);
            }
        });
    });

    group.finish();
}

// ============================================================================
// SlotStore
// ============================================================================

fn bench_store_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_release_acquire");
    group.throughput(Throughput::Elements(ITEMS as u64));

    let mut store: SlotStore<u64> = SlotStoreBuilder::default()
        .capacity(ITEMS)
        .build()
        .unwrap();
    let mut ids = vec![0u32; ITEMS];
    store.create_active(&mut ids);

    group.bench_function("batch", |b| {
        b.iter(|| {
            black_box(store.release(&ids));
            black_box(store.acquire(&mut ids));
        });
    });

    group.bench_function("one-at-a-time", |b| {
        b.iter(|| {
            for &id in &ids {
                black_box(store.release_one(id));
            }
            for _ in 0..ITEMS {
                black_box(store.acquire_idle().map(|(id, _)| id));
            }
        });
    });

    group.finish();
}

fn bench_store_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_read_random");
    group.throughput(Throughput::Elements(ITEMS as u64));

    let mut store: SlotStore<u64> = SlotStore::with_capacity(ITEMS);
    let mut ids = vec![0u32; ITEMS];
    store.create_active(&mut ids);
    for &id in &ids {
        store.write(id, id as u64);
    }
    ids.shuffle(&mut StdRng::seed_from_u64(11));

    let vec: Vec<u64> = (0..ITEMS as u64).collect();
    let vec_ids = ids.clone();

    group.bench_function("nexus-pool", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for &id in &ids {
                sum += black_box(store[id]);
            }
            sum
        });
    });

    group.bench_function("vec", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for &id in &vec_ids {
                sum += black_box(vec[id as usize]);
            }
            sum
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_index_add,
    bench_index_find,
    bench_index_remove_add,
    bench_store_cycle,
    bench_store_read,
);
criterion_main!(benches);
