//! On-disk record layout and codec.
//!
//! Grounded on `examples/original_source/record.go`'s `Metadata`/`Record`
//! marshal pair, adapted to the fixed header this crate's spec requires:
//!
//! ```text
//! [1 byte  tombstone flag]
//! [2 bytes key length  u16]
//! [4 bytes value length u32]
//! [key bytes]
//! [value bytes, self-describing encoded]
//! ```
//!
//! All integers are little-endian. The header is a fixed 7 bytes.

use std::io;

use thiserror::Error;

use crate::encoding::{Decode, Encode, EncodingError};
use crate::value::Value;

/// Size in bytes of the fixed record header.
pub const HEADER_SIZE: usize = 1 + 2 + 4;

/// Errors raised while marshaling or unmarshaling a [`Record`].
#[derive(Debug, Error)]
pub enum RecordError {
    /// Underlying I/O failure while reading/writing a data file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Key or value encoding/decoding failure.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A key exceeds the 16-bit length field (65535 bytes).
    #[error("key length {0} exceeds u16::MAX")]
    KeyTooLong(usize),

    /// An encoded value exceeds the 32-bit length field.
    #[error("value length {0} exceeds u32::MAX")]
    ValueTooLong(usize),
}

/// A logical `(key, value, tombstone)` tuple as stored in a memtable,
/// SFT data file, or merge stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The record's key. Key ordering is lexicographic byte order.
    pub key: Vec<u8>,
    /// The stored value. `None` when `tombstone` is set.
    pub value: Option<Value>,
    /// Whether this record represents a deletion marker.
    pub tombstone: bool,
}

impl Record {
    /// Builds a live (non-tombstone) record.
    pub fn put(key: Vec<u8>, value: Value) -> Self {
        Self {
            key,
            value: Some(value),
            tombstone: false,
        }
    }

    /// Builds a tombstone record for `key`.
    pub fn tombstone(key: Vec<u8>) -> Self {
        Self {
            key,
            value: None,
            tombstone: true,
        }
    }

    /// Encodes this record into `buf` using the fixed on-disk layout.
    ///
    /// Returns the byte lengths `(key_len, value_len)` written, which
    /// callers use to maintain sparse-index offsets without re-parsing.
    pub fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(u16, u32), RecordError> {
        let key_len: u16 = self
            .key
            .len()
            .try_into()
            .map_err(|_| RecordError::KeyTooLong(self.key.len()))?;

        let value_bytes = match &self.value {
            Some(v) => {
                let mut vb = Vec::new();
                v.encode_to(&mut vb)?;
                vb
            }
            None => Vec::new(),
        };
        let value_len: u32 = value_bytes
            .len()
            .try_into()
            .map_err(|_| RecordError::ValueTooLong(value_bytes.len()))?;

        buf.push(u8::from(self.tombstone));
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(&value_len.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&value_bytes);

        Ok((key_len, value_len))
    }

    /// Decodes a record header from exactly [`HEADER_SIZE`] bytes.
    pub fn decode_header(bytes: &[u8]) -> Result<RecordHeader, RecordError> {
        if bytes.len() < HEADER_SIZE {
            return Err(RecordError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short record header",
            )));
        }
        let tombstone = bytes[0] != 0;
        let key_len = u16::from_le_bytes([bytes[1], bytes[2]]);
        let value_len = u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]);
        Ok(RecordHeader {
            tombstone,
            key_len,
            value_len,
        })
    }

    /// Reassembles a full [`Record`] from a decoded header plus the raw
    /// key and value byte slices that follow it.
    pub fn from_parts(
        header: RecordHeader,
        key: Vec<u8>,
        value_bytes: &[u8],
    ) -> Result<Self, RecordError> {
        let value = if header.tombstone {
            None
        } else {
            let (v, _) = Value::decode_from(value_bytes)?;
            Some(v)
        };
        Ok(Self {
            key,
            value,
            tombstone: header.tombstone,
        })
    }
}

/// A decoded fixed-size record header, prior to reading the variable-length
/// key/value payload that follows it.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    /// Whether the record is a tombstone.
    pub tombstone: bool,
    /// Key length in bytes.
    pub key_len: u16,
    /// Value length in bytes (self-describing encoded; 0 for tombstones).
    pub value_len: u32,
}

impl RecordHeader {
    /// Total on-disk size of this record: header + key + value.
    pub fn record_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.key_len as u64 + self.value_len as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_seven_bytes() {
        assert_eq!(HEADER_SIZE, 7);
    }

    #[test]
    fn round_trips_live_record() {
        let rec = Record::put(b"hello".to_vec(), Value::Str("world".to_string()));
        let mut buf = Vec::new();
        let (key_len, value_len) = rec.encode_to(&mut buf).unwrap();
        assert_eq!(key_len as usize, rec.key.len());

        let header = Record::decode_header(&buf[..HEADER_SIZE]).unwrap();
        assert!(!header.tombstone);
        assert_eq!(header.key_len, key_len);
        assert_eq!(header.value_len, value_len);

        let key = buf[HEADER_SIZE..HEADER_SIZE + key_len as usize].to_vec();
        let value_bytes = &buf[HEADER_SIZE + key_len as usize..];
        let decoded = Record::from_parts(header, key, value_bytes).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn round_trips_tombstone() {
        let rec = Record::tombstone(b"gone".to_vec());
        let mut buf = Vec::new();
        rec.encode_to(&mut buf).unwrap();
        let header = Record::decode_header(&buf[..HEADER_SIZE]).unwrap();
        assert!(header.tombstone);
        assert_eq!(header.value_len, 0);
    }

    #[test]
    fn rejects_oversized_key() {
        let rec = Record::put(vec![0u8; u16::MAX as usize + 1], Value::Int32(1));
        let mut buf = Vec::new();
        let err = rec.encode_to(&mut buf).unwrap_err();
        assert!(matches!(err, RecordError::KeyTooLong(_)));
    }
}
