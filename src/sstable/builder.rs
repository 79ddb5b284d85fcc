//! Sorted file table construction.
//!
//! Grounded on `examples/original_source/table.go`'s `NewFTableWithUnsortedRecord`
//! and `NewFTableWithSortedRecordCh`, which share a single `writeRecordToFile`
//! helper. Mirrored here as [`BuildState`], fed either by an in-memory sort
//! ([`build_from_unsorted_batch`]) or by an arbitrary pre-sorted iterator
//! ([`build_from_sorted_stream`], driven by the merge engine over a bounded
//! channel).

use std::fs::OpenOptions;
use std::path::Path;

use crate::bloom::BloomFilter;
use crate::record::Record;

use super::{SparseIndexEntry, SstError, Table, data_file_name};

/// The subset of engine configuration the SFT builder needs: index stride,
/// write-buffer flush threshold, and bloom false-positive target
/// (spec.md §6).
#[derive(Debug, Clone)]
pub struct SstConfig {
    /// Stride for sparse index sampling (every Nth record is indexed).
    pub index_skip_num: usize,
    /// Byte threshold at which the in-memory write buffer is flushed.
    pub write_buffer_size: usize,
    /// Target bloom filter false-positive rate.
    pub false_positive_rate: f64,
}

/// Accumulates sparse-index, bloom, and min/max-key state while streaming
/// records into a data file, shared by both construction paths.
struct BuildState {
    sparse_index: Vec<SparseIndexEntry>,
    bloom: BloomFilter,
    min_key: Option<Vec<u8>>,
    max_key: Vec<u8>,
    offset: u64,
    written: usize,
}

impl BuildState {
    fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        Self {
            sparse_index: Vec::new(),
            bloom: BloomFilter::new(expected_elements.max(1), false_positive_rate),
            min_key: None,
            max_key: Vec::new(),
            offset: 0,
            written: 0,
        }
    }

    /// Encodes one record, folding it into the sparse index / bloom / key
    /// bounds, and returns the encoded bytes to append to the write buffer.
    /// Returns `None` if the record failed to encode — the caller logs and
    /// skips it, per spec.md §7.
    fn feed(&mut self, record: &Record, index_skip_num: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        let (key_len, value_len) = match record.encode_to(&mut buf) {
            Ok(lens) => lens,
            Err(e) => {
                tracing::warn!("skipping record during SFT construction: {e}");
                return None;
            }
        };

        if self.min_key.is_none() {
            self.min_key = Some(record.key.clone());
        }
        self.max_key = record.key.clone();

        self.written += 1;
        if index_skip_num > 0 && self.written % index_skip_num == 0 {
            self.sparse_index.push(SparseIndexEntry {
                key: record.key.clone(),
                tombstone: record.tombstone,
                key_len,
                value_len,
                offset: self.offset,
            });
        }
        self.bloom.add(&record.key);
        self.offset += buf.len() as u64;

        Some(buf)
    }
}

/// Buffers bytes in memory and flushes to the underlying file whenever the
/// buffer exceeds `write_buffer_size`, per spec.md §5 "the write buffer
/// inside construction is a single growable byte buffer".
struct BufferedWriter {
    file: std::fs::File,
    buf: Vec<u8>,
    threshold: usize,
}

impl BufferedWriter {
    fn new(file: std::fs::File, threshold: usize) -> Self {
        Self {
            file,
            buf: Vec::new(),
            threshold,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SstError> {
        use std::io::Write;
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.threshold {
            self.file.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    fn finish(mut self) -> Result<std::fs::File, SstError> {
        use std::io::Write;
        if !self.buf.is_empty() {
            self.file.write_all(&self.buf)?;
        }
        Ok(self.file)
    }
}

/// Builds a level-0 SFT from an unsorted in-memory batch, per spec.md §4.4
/// "Construction from an unsorted batch".
pub fn build_from_unsorted_batch(
    level: u8,
    dir: &Path,
    mut records: Vec<Record>,
    cfg: &SstConfig,
) -> Result<Table, SstError> {
    if records.is_empty() {
        return Err(SstError::EmptyBatch);
    }
    records.sort_by(|a, b| a.key.cmp(&b.key));

    let path = dir.join(data_file_name(level));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    let mut writer = BufferedWriter::new(file, cfg.write_buffer_size);

    let mut state = BuildState::new(records.len(), cfg.false_positive_rate);
    for record in &records {
        if let Some(bytes) = state.feed(record, cfg.index_skip_num) {
            writer.write(&bytes)?;
        }
    }

    let data_file = writer.finish()?;
    let min_key = state.min_key.ok_or(SstError::EmptyBatch)?;

    Ok(Table {
        path,
        data_file,
        level,
        n_records: state.written,
        size_in_bytes: state.offset,
        min_key,
        max_key: state.max_key,
        sparse_index: state.sparse_index,
        bloom: state.bloom,
    })
}

/// Builds an SFT from a pre-sorted stream of records, per spec.md §4.4
/// "Construction from a sorted stream" — no in-memory sort, enabling
/// arbitrarily large outputs. `expected_elements` is a sizing hint for the
/// bloom filter only (the merge engine knows only an upper bound on the
/// final count, since ties drop duplicates).
pub fn build_from_sorted_stream(
    level: u8,
    dir: &Path,
    records: impl Iterator<Item = Record>,
    expected_elements: usize,
    cfg: &SstConfig,
) -> Result<Table, SstError> {
    let path = dir.join(data_file_name(level));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    let mut writer = BufferedWriter::new(file, cfg.write_buffer_size);

    let mut state = BuildState::new(expected_elements, cfg.false_positive_rate);
    for record in records {
        if let Some(bytes) = state.feed(&record, cfg.index_skip_num) {
            writer.write(&bytes)?;
        }
    }

    let data_file = writer.finish()?;
    let min_key = state.min_key.ok_or(SstError::EmptyBatch)?;

    Ok(Table {
        path,
        data_file,
        level,
        n_records: state.written,
        size_in_bytes: state.offset,
        min_key,
        max_key: state.max_key,
        sparse_index: state.sparse_index,
        bloom: state.bloom,
    })
}
