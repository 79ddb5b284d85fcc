//! # keyvault-lsm
//!
//! An embeddable, ordered key-value store built on a two-level
//! **log-structured merge (LSM) tree**. Writes land first in an in-memory
//! ordered map and are periodically flushed to immutable, sorted on-disk
//! tables; a background compaction worker merges accumulated tables to
//! bound read amplification and reclaim space held by overwritten or
//! deleted keys.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     TableCluster                        │
//! │                                                          │
//! │   ┌───────────┐   flush    ┌─────────────────────────┐  │
//! │   │ Memtable  │ ─────────► │ Level 0 (overlapping)   │  │
//! │   │ (Mutex)   │            │ sorted file tables       │  │
//! │   └───────────┘            └───────────┬─────────────┘  │
//! │                                         │ compact         │
//! │                                         ▼                │
//! │                             ┌─────────────────────────┐  │
//! │                             │ Level 1 (disjoint)       │  │
//! │                             │ sorted file tables       │  │
//! │                             └─────────────────────────┘  │
//! │                                                          │
//! │           persistent catalog: `master-metadata`         │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`value`] | Self-describing tagged value payload |
//! | [`record`] | Binary record layout and codec |
//! | [`bloom`] | Probabilistic set-membership filter |
//! | [`memtable`] | Ordered in-memory write buffer |
//! | [`sstable`] | Immutable, sorted, on-disk tables with bloom filter + sparse index |
//! | [`merge`] | Level-0 k-way merge, level-0×level-1 streaming merge, overlap finder |
//! | [`cluster`] | Table cluster: public contract, flush/compaction workers, persistent catalog |
//! | [`encoding`] | Deterministic binary codec shared by every on-disk structure |
//!
//! ## Key properties
//!
//! - **Two fixed levels** — level 0 holds overlapping, append-ordered
//!   tables; level 1 holds disjoint, range-partitioned tables. There is no
//!   deeper hierarchy.
//! - **Bloom filter + sparse index lookups** — each table carries a bloom
//!   filter for fast negative point lookups and a sparse index bounding the
//!   linear scan needed to confirm a positive.
//! - **Per-level locking** — level 0 and level 1 are each guarded by their
//!   own reader-writer lock, acquired in ascending order; the memtable has
//!   a separate mutex, held across a flush's full splice so no write is
//!   ever lost.
//! - **No write-ahead log** — a crash loses whatever has not yet been
//!   flushed. This crate does not implement crash-consistent durability,
//!   multi-writer transactions, range scans, secondary indexes, more than
//!   two on-disk levels, snapshot isolation, or cross-process sharing.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use keyvault_lsm::cluster::{EngineConfig, TableCluster};
//! use keyvault_lsm::value::Value;
//!
//! let cfg = EngineConfig {
//!     mem_flush_interval: Duration::from_secs(1),
//!     compaction_interval: Duration::from_secs(5),
//!     ..EngineConfig::default()
//! };
//! let cluster = TableCluster::open("/tmp/my-kv-store", cfg).unwrap();
//!
//! cluster.put(b"hello".to_vec(), Value::Str("world".to_string()));
//! assert_eq!(cluster.get(b"hello"), Some(Value::Str("world".to_string())));
//!
//! cluster.delete(b"hello".to_vec());
//! assert_eq!(cluster.get(b"hello"), None);
//!
//! cluster.trigger_mem_flush();
//! cluster.trigger_compaction();
//! cluster.snapshot_metadata().unwrap();
//! ```

pub mod bloom;
pub mod cluster;
pub mod encoding;
pub mod memtable;
pub mod merge;
pub mod record;
pub mod sstable;
pub mod value;
