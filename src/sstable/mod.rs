//! Sorted file table (SFT) module.
//!
//! Grounded on `examples/original_source/table.go`'s `FTable`: an immutable,
//! append-only data file in ascending key order, covered by a sparse index
//! and a bloom filter. No block framing, no checksums, no mmap footer — the
//! on-disk format is simply a concatenation of records in the layout
//! `crate::record` defines.

pub mod builder;


use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use thiserror::Error;

use crate::bloom::BloomFilter;
use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::record::{Record, RecordError, HEADER_SIZE};
use crate::value::Value;

pub use builder::{SstConfig, build_from_sorted_stream, build_from_unsorted_batch};

/// Errors raised while constructing or querying a sorted file table.
#[derive(Debug, Error)]
pub enum SstError {
    /// Underlying I/O failure against the data file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record marshal/unmarshal failure.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Encoding failure while serializing table metadata.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A builder was asked to construct a table from an empty batch.
    #[error("cannot build a sorted file table from an empty batch")]
    EmptyBatch,
}

/// Result of a [`Table::get`] lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SstGet {
    /// The key has a live value in this table.
    Found(Value),
    /// The key was deleted by a tombstone in this table.
    Tombstone,
    /// This table has no evidence about the key either way.
    Absent,
}

/// A single entry in an SFT's in-memory sparse index: every `IndexSkipNum`-th
/// record's location, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseIndexEntry {
    /// The indexed record's key.
    pub key: Vec<u8>,
    /// Whether the indexed record is a tombstone.
    pub tombstone: bool,
    /// Encoded key length in bytes.
    pub key_len: u16,
    /// Encoded value length in bytes.
    pub value_len: u32,
    /// Byte offset of the record's header in the data file.
    pub offset: u64,
}

impl Encode for SparseIndexEntry {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.key.encode_to(buf)?;
        self.tombstone.encode_to(buf)?;
        self.key_len.encode_to(buf)?;
        self.value_len.encode_to(buf)?;
        self.offset.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for SparseIndexEntry {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (key, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        let (tombstone, n) = bool::decode_from(&buf[off..])?;
        off += n;
        let (key_len, n) = u16::decode_from(&buf[off..])?;
        off += n;
        let (value_len, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (offset, n) = u64::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                key,
                tombstone,
                key_len,
                value_len,
                offset,
            },
            off,
        ))
    }
}

/// An immutable, on-disk sorted file table.
///
/// Once constructed, a `Table` is never mutated — flush and compaction
/// always produce a brand new table and retire the inputs via [`Table::destroy`].
pub struct Table {
    path: PathBuf,
    data_file: File,
    level: u8,
    n_records: usize,
    size_in_bytes: u64,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    sparse_index: Vec<SparseIndexEntry>,
    bloom: BloomFilter,
}

impl Table {
    /// The level this table belongs to (0 or 1).
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Number of live records written to this table.
    pub fn n_records(&self) -> usize {
        self.n_records
    }

    /// Total size of the data file in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }

    /// The smallest key stored in this table.
    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    /// The largest key stored in this table.
    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    /// The on-disk file name, e.g. `0-1699999999999.kv`.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// The sparse index covering this table.
    pub fn sparse_index(&self) -> &[SparseIndexEntry] {
        &self.sparse_index
    }

    /// The bloom filter covering this table's keys.
    pub fn bloom(&self) -> &BloomFilter {
        &self.bloom
    }

    /// Reassembles a `Table` from previously persisted catalog metadata,
    /// reopening its data file read-only without rescanning its contents —
    /// per spec.md §4.9.
    #[allow(clippy::too_many_arguments)]
    pub fn from_metadata(
        path: PathBuf,
        level: u8,
        n_records: usize,
        size_in_bytes: u64,
        min_key: Vec<u8>,
        max_key: Vec<u8>,
        sparse_index: Vec<SparseIndexEntry>,
        bloom: BloomFilter,
    ) -> Result<Self, SstError> {
        let data_file = File::open(&path)?;
        Ok(Self {
            path,
            data_file,
            level,
            n_records,
            size_in_bytes,
            min_key,
            max_key,
            sparse_index,
            bloom,
        })
    }

    /// Point lookup, per spec.md §4.4 and §4.1's lookup order, which must
    /// distinguish a tombstone hit (stop searching, key is deleted) from a
    /// true absence (keep searching older tables/levels).
    pub fn get(&self, key: &[u8]) -> Result<SstGet, SstError> {
        if !self.bloom.might_contain(key) {
            return Ok(SstGet::Absent);
        }

        let idx = self
            .sparse_index
            .partition_point(|entry| entry.key.as_slice() < key);

        let (start, next) = if idx < self.sparse_index.len() && self.sparse_index[idx].key == key
        {
            if self.sparse_index[idx].tombstone {
                return Ok(SstGet::Tombstone);
            }
            (self.sparse_index[idx].offset, idx + 1)
        } else if idx > 0 {
            (self.sparse_index[idx - 1].offset, idx)
        } else {
            (0, idx)
        };

        let end = if next < self.sparse_index.len() {
            self.sparse_index[next].offset
        } else {
            self.size_in_bytes
        };

        let mut cursor = start;
        while cursor < end {
            let mut header_buf = [0u8; HEADER_SIZE];
            if let Err(e) = self.data_file.read_exact_at(&mut header_buf, cursor) {
                tracing::warn!("I/O error reading record header at offset {cursor}: {e}");
                return Ok(SstGet::Absent);
            }
            let header = Record::decode_header(&header_buf)?;
            let key_offset = cursor + HEADER_SIZE as u64;

            let mut key_buf = vec![0u8; header.key_len as usize];
            if let Err(e) = self.data_file.read_exact_at(&mut key_buf, key_offset) {
                tracing::warn!("I/O error reading record key at offset {key_offset}: {e}");
                return Ok(SstGet::Absent);
            }

            if key_buf == key {
                if header.tombstone {
                    return Ok(SstGet::Tombstone);
                }
                let value_offset = key_offset + header.key_len as u64;
                let mut value_buf = vec![0u8; header.value_len as usize];
                if let Err(e) = self.data_file.read_exact_at(&mut value_buf, value_offset) {
                    tracing::warn!("I/O error reading record value at offset {value_offset}: {e}");
                    return Ok(SstGet::Absent);
                }
                let (value, _) = Value::decode_from(&value_buf)?;
                return Ok(SstGet::Found(value));
            }
            cursor += header.record_size();
        }

        Ok(SstGet::Absent)
    }

    /// Reads every record in this table in ascending order, used by the
    /// level-0 and level-0×level-1 merges (§4.5).
    pub fn read_all(&self) -> Result<Vec<Record>, SstError> {
        let mut out = Vec::with_capacity(self.n_records);
        let mut cursor = 0u64;
        while cursor < self.size_in_bytes {
            let mut header_buf = [0u8; HEADER_SIZE];
            self.data_file.read_exact_at(&mut header_buf, cursor)?;
            let header = Record::decode_header(&header_buf)?;
            let key_offset = cursor + HEADER_SIZE as u64;

            let mut key_buf = vec![0u8; header.key_len as usize];
            self.data_file.read_exact_at(&mut key_buf, key_offset)?;

            let value_offset = key_offset + header.key_len as u64;
            let mut value_buf = vec![0u8; header.value_len as usize];
            self.data_file.read_exact_at(&mut value_buf, value_offset)?;

            cursor += header.record_size();
            out.push(Record::from_parts(header, key_buf, &value_buf)?);
        }
        Ok(out)
    }

    /// Reads a single record starting at `offset`, advancing it past the
    /// record that was read. Used by the streaming merge so it never loads
    /// an entire table into memory at once.
    pub(crate) fn read_record_at(&self, offset: &mut u64) -> Result<Record, SstError> {
        let mut header_buf = [0u8; HEADER_SIZE];
        self.data_file.read_exact_at(&mut header_buf, *offset)?;
        let header = Record::decode_header(&header_buf)?;
        let key_offset = *offset + HEADER_SIZE as u64;

        let mut key_buf = vec![0u8; header.key_len as usize];
        self.data_file.read_exact_at(&mut key_buf, key_offset)?;

        let value_offset = key_offset + header.key_len as u64;
        let mut value_buf = vec![0u8; header.value_len as usize];
        self.data_file.read_exact_at(&mut value_buf, value_offset)?;

        *offset += header.record_size();
        Record::from_parts(header, key_buf, &value_buf).map_err(SstError::from)
    }

    /// Serializes this table's catalog-relevant metadata (everything except
    /// the data file itself), per spec.md §4.9.
    pub fn snapshot_metadata(&self) -> Result<TableMetadata, SstError> {
        Ok(TableMetadata {
            file_name: self
                .file_name()
                .ok_or(SstError::Io(io::Error::other("table path has no file name")))?
                .to_string(),
            n_records: self.n_records,
            size_in_bytes: self.size_in_bytes,
            min_key: self.min_key.clone(),
            max_key: self.max_key.clone(),
            bloom: encoding::encode_to_vec(&self.bloom)?,
            sparse_index: self.sparse_index.clone(),
        })
    }

    /// Closes and unlinks the data file, dropping all in-memory indexes —
    /// per spec.md §4.4 "Destroy". Consumes `self` so a destroyed table
    /// cannot be queried again.
    pub fn destroy(self) -> Result<(), SstError> {
        let path = self.path.clone();
        drop(self.data_file);
        std::fs::remove_file(&path)?;
        Ok(())
    }
}

/// The persisted form of a [`Table`]'s metadata, as stored in the catalog
/// (spec.md §4.9). Does not include the data file's contents — only enough
/// to reopen and reconstruct the table without rescanning it.
#[derive(Debug, Clone)]
pub struct TableMetadata {
    /// File name of the table's data file, relative to the working directory.
    pub file_name: String,
    /// Number of live records in the table.
    pub n_records: usize,
    /// Size of the data file in bytes.
    pub size_in_bytes: u64,
    /// The table's smallest key.
    pub min_key: Vec<u8>,
    /// The table's largest key.
    pub max_key: Vec<u8>,
    /// Encoded bloom filter bytes (see [`crate::bloom::to_bytes`]).
    pub bloom: Vec<u8>,
    /// The table's sparse index.
    pub sparse_index: Vec<SparseIndexEntry>,
}

impl Encode for TableMetadata {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.file_name.encode_to(buf)?;
        (self.n_records as u64).encode_to(buf)?;
        self.size_in_bytes.encode_to(buf)?;
        self.min_key.encode_to(buf)?;
        self.max_key.encode_to(buf)?;
        self.bloom.encode_to(buf)?;
        encoding::encode_vec(&self.sparse_index, buf)?;
        Ok(())
    }
}

impl Decode for TableMetadata {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (file_name, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (n_records, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (size_in_bytes, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (min_key, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        let (max_key, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        let (bloom, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        let (sparse_index, n) = encoding::decode_vec::<SparseIndexEntry>(&buf[off..])?;
        off += n;
        Ok((
            Self {
                file_name,
                n_records: n_records as usize,
                size_in_bytes,
                min_key,
                max_key,
                bloom,
                sparse_index,
            },
            off,
        ))
    }
}

/// Builds the `<level>-<unix_millis>.kv` file name spec.md §6 specifies.
pub(crate) fn data_file_name(level: u8) -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis();
    format!("{level}-{millis}.kv")
}
