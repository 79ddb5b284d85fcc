//! Micro-benchmarks for keyvault-lsm core operations.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- put       # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use keyvault_lsm::cluster::{EngineConfig, TableCluster};
use keyvault_lsm::record::Record;
use keyvault_lsm::value::Value;
use std::time::Duration;
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Default value payload for benchmarks (128 bytes).
const VALUE_128B_LEN: usize = 128;

/// Larger value payload (1 KiB).
const VALUE_1K_LEN: usize = 1024;

fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

fn make_bytes_value(len: usize) -> Value {
    Value::Bytes(vec![0xAB; len])
}

/// Background intervals far longer than any single benchmark iteration,
/// so flush/compaction only happen via the explicit `trigger_*` calls a
/// given benchmark issues itself.
fn no_background_workers() -> EngineConfig {
    EngineConfig {
        compaction_interval: Duration::from_secs(3600),
        mem_flush_interval: Duration::from_secs(3600),
        ..EngineConfig::default()
    }
}

/// Open a cluster with a small write buffer so level-0 SFTs are small and
/// plentiful, exercising the on-disk read path rather than the memtable.
fn open_small_buffer(dir: &std::path::Path) -> TableCluster {
    let cfg = EngineConfig {
        write_buffer_size: 4 * 1024,
        mem_max_num: usize::MAX,
        ..no_background_workers()
    };
    TableCluster::open(dir, cfg).unwrap()
}

/// Open a cluster with a `MemMaxNum` high enough that nothing flushes
/// during the benchmark, isolating the pure memtable path.
fn open_memtable_only(dir: &std::path::Path) -> TableCluster {
    let cfg = EngineConfig {
        mem_max_num: usize::MAX,
        ..no_background_workers()
    };
    TableCluster::open(dir, cfg).unwrap()
}

/// Bulk-loads `count` sequential keys directly as level-0 SFTs (bypassing
/// the memtable, via `AddRecords`) so reads exercise bloom + sparse index.
fn prepopulate_on_disk(dir: &std::path::Path, count: u64, value_len: usize) -> TableCluster {
    let cluster = open_small_buffer(dir);
    let records: Vec<Record> = (0..count)
        .map(|i| Record::put(make_key(i), make_bytes_value(value_len)))
        .collect();
    cluster.add_records(records).unwrap();
    cluster
}

// ================================================================================================
// Write benchmarks
// ================================================================================================

/// Benchmark group for `put` operations.
///
/// `memtable_only/{128B,1K}`: pure `BTreeMap` insertion cost, no flush.
/// `sequential_with_flush`: sequential keys against a 4 KiB write buffer,
/// so flush is triggered by the benchmark loop's own `TriggerMemFlush`
/// calls at a fixed cadence, measuring amortized flush overhead.
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    for &(label, len) in &[("128B", VALUE_128B_LEN), ("1K", VALUE_1K_LEN)] {
        group.bench_function(BenchmarkId::new("memtable_only", label), |b| {
            let dir = TempDir::new().unwrap();
            let cluster = open_memtable_only(dir.path());
            let mut seq = 0u64;

            b.iter(|| {
                let key = make_key(seq);
                cluster.put(black_box(key), black_box(make_bytes_value(len)));
                seq += 1;
            });
        });
    }

    group.bench_function("sequential_with_periodic_flush", |b| {
        let dir = TempDir::new().unwrap();
        let cluster = open_small_buffer(dir.path());
        let mut seq = 0u64;

        b.iter(|| {
            let key = make_key(seq);
            cluster.put(black_box(key), black_box(make_bytes_value(VALUE_128B_LEN)));
            seq += 1;
            if seq % 256 == 0 {
                cluster.trigger_mem_flush();
            }
        });
    });

    group.finish();
}

// ================================================================================================
// Read benchmarks
// ================================================================================================

/// Benchmark group for `get` operations.
///
/// `memtable_hit`/`memtable_miss`: 10,000 keys resident only in the
/// memtable — pure `BTreeMap` lookup latency, the fastest read path.
/// `sstable_hit`/`sstable_miss`: 5,000 keys bulk-loaded as level-0 SFTs via
/// `AddRecords`, so reads exercise bloom-filter probe -> sparse-index
/// binary search -> bounded linear scan. A miss should be faster than a
/// hit: a well-tuned bloom filter rejects it before any data-file read.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    {
        let dir = TempDir::new().unwrap();
        let cluster = open_memtable_only(dir.path());
        for i in 0..10_000u64 {
            cluster.put(make_key(i), make_bytes_value(VALUE_128B_LEN));
        }

        group.bench_function("memtable_hit", |b| {
            let mut seq = 0u64;
            b.iter(|| {
                let key = make_key(seq % 10_000);
                black_box(cluster.get(black_box(&key)));
                seq += 1;
            });
        });

        group.bench_function("memtable_miss", |b| {
            let mut seq = 0u64;
            b.iter(|| {
                let key = make_key(20_000 + seq % 10_000);
                black_box(cluster.get(black_box(&key)));
                seq += 1;
            });
        });
    }

    {
        let dir = TempDir::new().unwrap();
        let cluster = prepopulate_on_disk(dir.path(), 5_000, VALUE_128B_LEN);

        group.bench_function("sstable_hit", |b| {
            let mut seq = 0u64;
            b.iter(|| {
                let key = make_key(seq % 5_000);
                black_box(cluster.get(black_box(&key)));
                seq += 1;
            });
        });

        group.bench_function("sstable_miss", |b| {
            let mut seq = 0u64;
            b.iter(|| {
                let key = make_key(50_000 + seq % 5_000);
                black_box(cluster.get(black_box(&key)));
                seq += 1;
            });
        });
    }

    group.finish();
}

/// `delete`: writes a tombstone for a freshly-inserted key, measuring the
/// same memtable-insert path `put` takes (a tombstone is just another
/// memtable entry).
fn bench_delete(c: &mut Criterion) {
    c.bench_function("delete", |b| {
        let dir = TempDir::new().unwrap();
        let cluster = open_memtable_only(dir.path());
        let mut seq = 0u64;

        b.iter_batched(
            || {
                let key = make_key(seq);
                cluster.put(key.clone(), make_bytes_value(VALUE_128B_LEN));
                seq += 1;
                key
            },
            |key| cluster.delete(black_box(key)),
            BatchSize::SmallInput,
        );
    });
}

/// `overwrite`: repeatedly puts the same key, measuring the cost of a
/// `BTreeMap` entry replacement rather than an insertion.
fn bench_overwrite(c: &mut Criterion) {
    c.bench_function("overwrite_same_key", |b| {
        let dir = TempDir::new().unwrap();
        let cluster = open_memtable_only(dir.path());
        let key = make_key(0);
        let mut version = 0i64;

        b.iter(|| {
            cluster.put(key.clone(), black_box(Value::Int64(version)));
            version += 1;
        });
    });
}

// ================================================================================================
// Background-operation benchmarks
// ================================================================================================

/// `flush`: time to snapshot and clear a memtable of 5,000 entries into a
/// new level-0 SFT via `TriggerMemFlush`.
fn bench_flush(c: &mut Criterion) {
    c.bench_function("flush_5000_entries", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let cluster = open_memtable_only(dir.path());
                for i in 0..5_000u64 {
                    cluster.put(make_key(i), make_bytes_value(VALUE_128B_LEN));
                }
                (dir, cluster)
            },
            |(_dir, cluster)| cluster.trigger_mem_flush(),
            BatchSize::LargePoint,
        );
    });
}

/// `compaction`: time to merge 4 level-0 tables of 1,000 records each (no
/// level-1 overlap yet, so this exercises the pure level-0 k-way merge
/// plus a fresh level-1 SFT build).
fn bench_compaction(c: &mut Criterion) {
    c.bench_function("compact_4x1000_level0_tables", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let cfg = EngineConfig {
                    lvl0_max_table_num: usize::MAX,
                    ..no_background_workers()
                };
                let cluster = TableCluster::open(dir.path(), cfg).unwrap();
                for batch in 0..4u64 {
                    let records: Vec<Record> = (0..1_000u64)
                        .map(|i| {
                            Record::put(
                                make_key(batch * 1_000 + i),
                                make_bytes_value(VALUE_128B_LEN),
                            )
                        })
                        .collect();
                    cluster.add_records(records).unwrap();
                }
                (dir, cluster)
            },
            |(_dir, cluster)| cluster.trigger_compaction(),
            BatchSize::LargePoint,
        );
    });
}

/// `recovery`: time to reopen a cluster and `LoadMetadata` a catalog
/// covering 5,000 records already compacted into level 1.
fn bench_recovery(c: &mut Criterion) {
    c.bench_function("load_metadata_5000_records", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let cfg = no_background_workers();
                let cluster = TableCluster::open(dir.path(), cfg.clone()).unwrap();
                let records: Vec<Record> = (0..5_000u64)
                    .map(|i| Record::put(make_key(i), make_bytes_value(VALUE_128B_LEN)))
                    .collect();
                cluster.add_records(records).unwrap();
                cluster.trigger_compaction();
                cluster.snapshot_metadata().unwrap();
                (dir, cfg)
            },
            |(dir, cfg)| {
                let cluster = TableCluster::open(dir.path(), cfg).unwrap();
                cluster.load_metadata().unwrap();
                black_box(cluster.get(&make_key(0)));
            },
            BatchSize::LargePoint,
        );
    });
}

// ================================================================================================
// Concurrency benchmark
// ================================================================================================

/// `concurrent_put_get`: 4 writer threads and 4 reader threads hammering a
/// shared cluster, measuring throughput under the crate's per-level
/// `RwLock` / memtable-`Mutex` contention model.
fn bench_concurrent(c: &mut Criterion) {
    use std::sync::Arc;
    use std::thread;

    c.bench_function("concurrent_put_get_4x4", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let cluster = Arc::new(open_memtable_only(dir.path()));
                for i in 0..1_000u64 {
                    cluster.put(make_key(i), make_bytes_value(VALUE_128B_LEN));
                }
                (dir, cluster)
            },
            |(_dir, cluster)| {
                let mut handles = Vec::new();
                for t in 0..4u64 {
                    let cluster = Arc::clone(&cluster);
                    handles.push(thread::spawn(move || {
                        for i in 0..250u64 {
                            cluster.put(make_key(1_000 + t * 250 + i), make_bytes_value(VALUE_128B_LEN));
                        }
                    }));
                }
                for _ in 0..4 {
                    let cluster = Arc::clone(&cluster);
                    handles.push(thread::spawn(move || {
                        for i in 0..250u64 {
                            black_box(cluster.get(&make_key(i)));
                        }
                    }));
                }
                for h in handles {
                    h.join().unwrap();
                }
            },
            BatchSize::LargePoint,
        );
    });
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_delete,
    bench_overwrite,
    bench_flush,
    bench_compaction,
    bench_recovery,
    bench_concurrent,
);
criterion_main!(benches);
