//! Merge engine and overlap finder.
//!
//! Grounded on `examples/original_source/table_cluster.go`'s `compactingLvl0`
//! (level-0 k-way slot-array merge and the level-0×level-1 streaming merge)
//! and `findOverlapTablesRange` (overlap finder), per spec.md §4.5–§4.6.


use std::cmp::Ordering;

use crate::record::Record;
use crate::sstable::Table;

/// Capacity of the bounded handoff channel between the level-0×level-1
/// merge producer and the sorted-stream SFT constructor (spec.md §5).
const CHANNEL_CAPACITY: usize = 64;

/// Merges the given level-0 tables (captured as a fixed slice — the caller
/// is responsible for taking only the prefix present at the start of
/// compaction, per spec.md §4.8 step 1) into a single sorted, duplicate-free
/// sequence, newest table wins on key ties.
///
/// Grounded on `compactingLvl0`'s slot-array loop: a fixed-size array of
/// "current record" slots, one per input table, refilled lazily and scanned
/// newest-to-oldest each iteration to find the minimum key.
pub fn merge_level0(tables: &[Table]) -> Vec<Record> {
    let last_index = tables.len();
    if last_index == 0 {
        return Vec::new();
    }

    let mut offsets = vec![0u64; last_index];
    let mut current: Vec<Option<Record>> = (0..last_index).map(|_| None).collect();
    let mut out = Vec::new();

    loop {
        for i in (0..last_index).rev() {
            if current[i].is_some() || offsets[i] >= tables[i].size_in_bytes() {
                continue;
            }
            match tables[i].read_record_at(&mut offsets[i]) {
                Ok(record) => current[i] = Some(record),
                Err(e) => tracing::warn!("error reading record during level-0 merge: {e}"),
            }
        }

        let mut min_idx: Option<usize> = None;
        for i in (0..last_index).rev() {
            if current[i].is_none() {
                continue;
            }
            min_idx = match min_idx {
                None => Some(i),
                Some(m) => {
                    match current[i].as_ref().unwrap().key.cmp(&current[m].as_ref().unwrap().key) {
                        Ordering::Less => Some(i),
                        Ordering::Equal => {
                            // Duplicate: `m` is newer (found first, scanning
                            // newest-to-oldest), so the older slot `i` is
                            // discarded without emission.
                            current[i] = None;
                            Some(m)
                        }
                        Ordering::Greater => Some(m),
                    }
                }
            };
        }

        match min_idx {
            None => break,
            Some(i) => out.push(current[i].take().unwrap()),
        }
    }

    out
}

/// Runs the level-0×level-1 streaming merge producer on a scoped thread,
/// handing records off through a bounded channel to `consumer`, which
/// typically builds a new level-1 SFT from the stream (spec.md §4.5's
/// "delivered via a bounded handoff channel to the sorted-stream SFT
/// constructor running concurrently").
///
/// Tie-break rule (spec.md §4.5): on equal keys, if the level-0 record is a
/// tombstone, both records are dropped (the deletion has taken effect); if
/// live, the level-0 record replaces the level-1 record.
pub fn merge_level0_x_level1<F, R>(level0: &[Record], level1_tables: &[&Table], consumer: F) -> R
where
    F: FnOnce(crossbeam::channel::Receiver<Record>) -> R + Send,
    R: Send,
{
    let (tx, rx) = crossbeam::channel::bounded(CHANNEL_CAPACITY);
    std::thread::scope(|scope| {
        scope.spawn(|| produce_merged_stream(tx, level0, level1_tables));
        consumer(rx)
    })
}

fn produce_merged_stream(
    tx: crossbeam::channel::Sender<Record>,
    level0: &[Record],
    level1_tables: &[&Table],
) {
    let mut lvl1_idx = 0usize;
    let mut offset = 0u64;
    let mut lvl0_idx = 0usize;
    let mut lvl1_record: Option<Record> = None;

    while lvl1_idx < level1_tables.len() && lvl0_idx < level0.len() {
        if lvl1_record.is_none() {
            if offset < level1_tables[lvl1_idx].size_in_bytes() {
                match level1_tables[lvl1_idx].read_record_at(&mut offset) {
                    Ok(record) => lvl1_record = Some(record),
                    Err(e) => {
                        tracing::warn!("error reading level-1 record during merge: {e}");
                        break;
                    }
                }
            } else if lvl1_idx + 1 < level1_tables.len() {
                lvl1_idx += 1;
                offset = 0;
                continue;
            } else {
                break;
            }
        }

        let l1record = lvl1_record.as_ref().expect("checked above");
        match level0[lvl0_idx].key.cmp(&l1record.key) {
            Ordering::Less => {
                if tx.send(level0[lvl0_idx].clone()).is_err() {
                    return;
                }
                lvl0_idx += 1;
            }
            Ordering::Greater => {
                if tx.send(lvl1_record.take().expect("checked above")).is_err() {
                    return;
                }
            }
            Ordering::Equal => {
                if !level0[lvl0_idx].tombstone && tx.send(level0[lvl0_idx].clone()).is_err() {
                    return;
                }
                lvl1_record = None;
                lvl0_idx += 1;
            }
        }
    }

    // The main loop above can exit (level-0 exhausted) while a level-1
    // record has already been read off disk into `lvl1_record` but not yet
    // emitted. Flush it before the drain loop resumes sequential reads,
    // otherwise it would be silently dropped.
    if let Some(record) = lvl1_record.take() {
        if tx.send(record).is_err() {
            return;
        }
    }

    while lvl1_idx < level1_tables.len() {
        if offset < level1_tables[lvl1_idx].size_in_bytes() {
            match level1_tables[lvl1_idx].read_record_at(&mut offset) {
                Ok(record) => {
                    if tx.send(record).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("error reading level-1 record during merge drain: {e}");
                    break;
                }
            }
        } else if lvl1_idx + 1 < level1_tables.len() {
            lvl1_idx += 1;
            offset = 0;
        } else {
            break;
        }
    }

    while lvl0_idx < level0.len() {
        if tx.send(level0[lvl0_idx].clone()).is_err() {
            return;
        }
        lvl0_idx += 1;
    }
}

/// Finds the half-open index range `[minI, maxI)` of `tables` (a level ≥ 1
/// sequence, sorted and disjoint by `min_key`) whose key ranges might
/// overlap `[min_key, max_key]`, per spec.md §4.6.
///
/// Grounded on `findOverlapTablesRange`'s two-binary-search approach: since
/// level ≥ 1 tables are disjoint and sorted by `min_key`, `minI` is the first
/// table whose `max_key ≥ min_key` and `maxI` is one past the last table
/// whose `min_key ≤ max_key`. `isOverlap` holds iff that range is non-empty —
/// a non-empty range implies `tables[minI].max_key ≥ min_key` and
/// `tables[maxI-1].min_key ≤ max_key`, i.e. both ends of the query range are
/// bracketed by some table in the slice.
pub fn overlap_range(tables: &[Table], min_key: &[u8], max_key: &[u8]) -> (usize, usize, bool) {
    if tables.is_empty() {
        return (0, 0, false);
    }

    let min_i = tables.partition_point(|t| t.max_key() < min_key);
    let max_i = tables.partition_point(|t| t.min_key() <= max_key);
    let is_overlap = min_i < max_i;

    (min_i, max_i, is_overlap)
}
