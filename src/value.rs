//! Opaque value payloads stored by the engine.
//!
//! The engine never interprets a stored value beyond round-tripping it.
//! [`Value`] is the sum type callers hand to [`crate::cluster::TableCluster::put`]
//! — it mirrors the content-type convention of the HTTP façade (an external
//! collaborator, out of scope for this crate) without depending on it.

use crate::encoding::{Decode, Encode, EncodingError};

const TAG_INT32: u8 = 0;
const TAG_INT64: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_BYTES: u8 = 3;

/// A self-describing, tagged value payload.
///
/// Wire form: `[u8 tag][payload]`. The tag is preserved across a
/// write/read round trip so callers always get back the kind they put in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A 32-bit signed integer (`plain-text/int32`).
    Int32(i32),
    /// A 64-bit signed integer (`plain-text/int64`).
    Int64(i64),
    /// A UTF-8 string (`plain-text/string`).
    Str(String),
    /// An arbitrary structured payload, carried opaquely
    /// (`application/json` and friends).
    Bytes(Vec<u8>),
}

impl Encode for Value {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            Value::Int32(v) => {
                TAG_INT32.encode_to(buf)?;
                v.to_le_bytes().encode_to(buf)?;
            }
            Value::Int64(v) => {
                TAG_INT64.encode_to(buf)?;
                (*v as u64).encode_to(buf)?;
            }
            Value::Str(s) => {
                TAG_STR.encode_to(buf)?;
                s.encode_to(buf)?;
            }
            Value::Bytes(b) => {
                TAG_BYTES.encode_to(buf)?;
                b.encode_to(buf)?;
            }
        }
        Ok(())
    }
}

impl Decode for Value {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, mut off) = u8::decode_from(buf)?;
        let value = match tag {
            TAG_INT32 => {
                let (bytes, n) = <[u8; 4]>::decode_from(&buf[off..])?;
                off += n;
                Value::Int32(i32::from_le_bytes(bytes))
            }
            TAG_INT64 => {
                let (bits, n) = u64::decode_from(&buf[off..])?;
                off += n;
                Value::Int64(bits as i64)
            }
            TAG_STR => {
                let (s, n) = String::decode_from(&buf[off..])?;
                off += n;
                Value::Str(s)
            }
            TAG_BYTES => {
                let (b, n) = Vec::<u8>::decode_from(&buf[off..])?;
                off += n;
                Value::Bytes(b)
            }
            other => {
                return Err(EncodingError::InvalidTag {
                    tag: other as u32,
                    type_name: "Value",
                });
            }
        };
        Ok((value, off))
    }
}
