//! Persistent catalog: snapshot and restore of cluster metadata.
//!
//! Grounded on `examples/original_source/table_metadata.go`'s
//! `TableClusterMetadata`/`SnapshotTableClusterMetadata`/
//! `LoadTableClusterMetadata`, using this crate's own `Encode`/`Decode`
//! traits in place of the original's msgpack dependency, per spec.md §4.9.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bloom::BloomFilter;
use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::sstable::{SstError, Table, TableMetadata};

/// File name of the persisted catalog, relative to the cluster's directory.
pub const CATALOG_FILE_NAME: &str = "master-metadata";

/// Errors raised while snapshotting or loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying I/O failure against the catalog file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure encoding or decoding the catalog's wire format.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Failure reconstructing a table from persisted metadata.
    #[error("sorted file table error: {0}")]
    Sst(#[from] SstError),
}

/// The full persisted form of a cluster's on-disk state: one sequence of
/// table metadata per level.
struct ClusterMetadata {
    levels: Vec<Vec<TableMetadata>>,
}

impl Encode for ClusterMetadata {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        (self.levels.len() as u32).encode_to(buf)?;
        for level in &self.levels {
            encoding::encode_vec(level, buf)?;
        }
        Ok(())
    }
}

impl Decode for ClusterMetadata {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (n_levels, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let mut levels = Vec::with_capacity(n_levels as usize);
        for _ in 0..n_levels {
            let (level, n) = encoding::decode_vec::<TableMetadata>(&buf[off..])?;
            off += n;
            levels.push(level);
        }
        Ok((Self { levels }, off))
    }
}

/// Serializes the given levels' tables to the catalog file in `dir`,
/// replacing any previous snapshot. Written via a temp-file-then-rename so
/// a crash mid-write never leaves a truncated catalog in place.
pub fn snapshot(dir: &Path, level0: &[Table], level1: &[Table]) -> Result<(), CatalogError> {
    let metadata = ClusterMetadata {
        levels: vec![
            level0
                .iter()
                .map(Table::snapshot_metadata)
                .collect::<Result<Vec<_>, SstError>>()?,
            level1
                .iter()
                .map(Table::snapshot_metadata)
                .collect::<Result<Vec<_>, SstError>>()?,
        ],
    };

    let bytes = encoding::encode_to_vec(&metadata)?;
    let final_path = dir.join(CATALOG_FILE_NAME);
    let tmp_path = dir.join(format!("{CATALOG_FILE_NAME}.tmp"));
    fs::write(&tmp_path, &bytes)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

/// Loads the catalog from `dir`, reopening each table's data file read-only
/// and reconstructing it from stored metadata without rescanning its
/// contents. Returns `None` if no catalog file exists yet.
pub fn load(dir: &Path) -> Result<Option<(Vec<Table>, Vec<Table>)>, CatalogError> {
    let path = dir.join(CATALOG_FILE_NAME);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let (metadata, _) = encoding::decode_from_slice::<ClusterMetadata>(&bytes)?;
    let mut levels = Vec::with_capacity(metadata.levels.len());
    for (level, tables) in metadata.levels.into_iter().enumerate() {
        let mut reopened = Vec::with_capacity(tables.len());
        for table_metadata in tables {
            reopened.push(reopen_table(dir, level as u8, table_metadata)?);
        }
        levels.push(reopened);
    }

    let mut levels = levels.into_iter();
    let level0 = levels.next().unwrap_or_default();
    let level1 = levels.next().unwrap_or_default();
    Ok(Some((level0, level1)))
}

fn reopen_table(dir: &Path, level: u8, metadata: TableMetadata) -> Result<Table, CatalogError> {
    let path: PathBuf = dir.join(&metadata.file_name);
    let bloom = BloomFilter::decode_from(&metadata.bloom)?.0;
    Table::from_metadata(
        path,
        level,
        metadata.n_records,
        metadata.size_in_bytes,
        metadata.min_key,
        metadata.max_key,
        metadata.sparse_index,
        bloom,
    )
    .map_err(CatalogError::from)
}
