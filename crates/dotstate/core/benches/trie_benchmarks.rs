// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Throughput benchmarks for the trie, the versioned tree and GC
//!
//! Inputs are generated from a fixed seed so runs stay comparable.

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use dotstate_core::gc::{GcOptions, GcStrategy, RetentionPolicy};
use dotstate_core::hashing::{Blake3Hasher, Keccak256Hasher};
use dotstate_core::jmt::JellyfishTree;
use dotstate_core::mpt::MerklePatriciaTrie;
use dotstate_core::storage::MemoryStore;
use dotstate_core::TrieDatabase;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Records = Vec<(Vec<u8>, Vec<u8>)>;

fn records(count: usize, value_size: usize) -> Records {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let mut key = vec![0u8; 32];
            let mut value = vec![0u8; value_size];
            rng.fill(&mut key[..]);
            rng.fill(&mut value[..]);
            (key, value)
        })
        .collect()
}

fn bench_trie_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpt_insert");
    for count in [100usize, 1_000, 10_000] {
        let data = records(count, 64);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("keccak256", count), &data, |b, data| {
            b.iter_batched(
                || MerklePatriciaTrie::new(MemoryStore::new(), Keccak256Hasher),
                |mut trie| {
                    for (key, value) in data {
                        trie.put(key, value.clone()).unwrap();
                    }
                    black_box(trie.root_hash())
                },
                BatchSize::LargeInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("blake3", count), &data, |b, data| {
            b.iter_batched(
                || MerklePatriciaTrie::new(MemoryStore::new(), Blake3Hasher),
                |mut trie| {
                    for (key, value) in data {
                        trie.put(key, value.clone()).unwrap();
                    }
                    black_box(trie.root_hash())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("versioned_commit");
    for batch in [100usize, 1_000] {
        let data = records(batch, 64);
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("mpt_database", batch), &data, |b, data| {
            b.iter_batched(
                || TrieDatabase::new(MemoryStore::new(), Keccak256Hasher),
                |db| black_box(db.commit(1, data.iter().map(|(k, v)| (k.clone(), Some(v.clone())))).unwrap()),
                BatchSize::LargeInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("jellyfish", batch), &data, |b, data| {
            b.iter_batched(
                || JellyfishTree::new(MemoryStore::new(), Keccak256Hasher),
                |tree| black_box(tree.put(1, data.iter().map(|(k, v)| (k.clone(), Some(v.clone())))).unwrap()),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_proofs(c: &mut Criterion) {
    let data = records(10_000, 64);
    let mut trie = MerklePatriciaTrie::new(MemoryStore::new(), Keccak256Hasher);
    for (key, value) in &data {
        trie.put(key, value.clone()).unwrap();
    }
    let tree = JellyfishTree::new(MemoryStore::new(), Keccak256Hasher);
    tree.put(1, data.iter().map(|(k, v)| (k.clone(), Some(v.clone())))).unwrap();
    let (key, value) = &data[data.len() / 2];

    let mut group = c.benchmark_group("proofs");
    group.bench_function("mpt_generate", |b| b.iter(|| black_box(trie.get_proof(black_box(key)).unwrap())));
    let proof = trie.get_proof(key).unwrap();
    group.bench_function("mpt_verify", |b| {
        b.iter(|| black_box(trie.verify_proof(black_box(key), Some(value), true, &proof)))
    });
    group.bench_function("jellyfish_generate", |b| b.iter(|| black_box(tree.get_proof(black_box(key), 1).unwrap())));
    group.finish();
}

fn bench_gc(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_keep_latest_1");
    group.sample_size(10);
    for strategy in [GcStrategy::RefCount, GcStrategy::MarkAndSweep] {
        group.bench_function(strategy.name(), |b| {
            b.iter_batched(
                || {
                    let db = TrieDatabase::new(MemoryStore::new(), Keccak256Hasher);
                    for version in 1..=10u64 {
                        let updates = records(200, 32).into_iter().map(|(k, mut v)| {
                            v[0] = version as u8;
                            (k, Some(v))
                        });
                        db.commit(version, updates).unwrap();
                    }
                    db
                },
                |db| {
                    let policy = RetentionPolicy::keep_latest(1).unwrap();
                    black_box(db.collect_garbage(strategy, &policy, &GcOptions::default()).unwrap())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_trie_insert, bench_commit, bench_proofs, bench_gc);
criterion_main!(benches);
