//! Probabilistic set-membership filter carried by every sorted file table.
//!
//! Grounded on `examples/original_source/bloom/bloom_filter.go`: a plain
//! bit array sized by the textbook optimal-size formula, hashed with
//! MurmurHash3-64 under `k` distinct seeds. Ported to Rust rather than
//! pulled in from a crate so the bit/hash-count formulas in spec.md §4.3
//! are reproduced exactly (the `bloomfilter` crate this repo's teacher
//! uses does not expose raw control over `m`/`k`).


use crate::encoding::{self, Decode, Encode, EncodingError};

/// A fixed-size bit-array bloom filter.
///
/// `Add` sets `k` bits derived from the key; `might_contain` returns
/// `false` only when at least one of those bits is unset — a definitive
/// negative. It never returns a false negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<bool>,
    m: usize,
    k: u32,
}

impl BloomFilter {
    /// Builds a filter sized for `expected_elements` items at the given
    /// target false-positive rate, per spec.md §4.3:
    ///
    /// `m = ceil(n * ln(p) / ln(1 / 2^ln2))`, `k = round((m/n) * ln2)`.
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        let n = expected_elements.max(1) as f64;
        let m = (n * false_positive_rate.ln() / (1.0 / 2f64.powf(2f64.ln())).ln()).ceil();
        let m = (m as usize).max(1);
        let k = (((m as f64) / n) * 2f64.ln()).round().max(1.0) as u32;
        Self {
            bits: vec![false; m],
            m,
            k,
        }
    }

    /// Inserts `key` into the filter, setting `k` bits.
    pub fn add(&mut self, key: &[u8]) {
        for seed in 0..self.k {
            let idx = self.hash_index(key, seed);
            self.bits[idx] = true;
        }
    }

    /// Returns `false` if `key` is definitely absent, `true` if it might
    /// be present.
    pub fn might_contain(&self, key: &[u8]) -> bool {
        (0..self.k).all(|seed| self.bits[self.hash_index(key, seed)])
    }

    fn hash_index(&self, key: &[u8], seed: u32) -> usize {
        (murmur3_64(key, seed) % self.m as u64) as usize
    }
}

impl Encode for BloomFilter {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        (self.m as u32).encode_to(buf)?;
        self.k.encode_to(buf)?;
        let mut packed = vec![0u8; self.m.div_ceil(8)];
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit {
                packed[i / 8] |= 1 << (i % 8);
            }
        }
        packed.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BloomFilter {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (m, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (k, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (packed, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;

        let m = m as usize;
        let mut bits = vec![false; m];
        for i in 0..m {
            let byte = packed.get(i / 8).copied().unwrap_or(0);
            bits[i] = (byte >> (i % 8)) & 1 == 1;
        }
        Ok((Self { bits, m, k }, off))
    }
}

/// MurmurHash3 x64 128-bit finalization, truncated to the low 64 bits,
/// seeded per spec.md §4.3 ("seeds 0..k-1").
fn murmur3_64(data: &[u8], seed: u32) -> u64 {
    const C1: u64 = 0x87c3_7b91_1142_53d5;
    const C2: u64 = 0x4cf5_ad43_2745_937f;

    let mut h1: u64 = seed as u64;
    let mut h2: u64 = seed as u64;

    let nblocks = data.len() / 16;
    for i in 0..nblocks {
        let block = &data[i * 16..i * 16 + 16];
        let mut k1 = u64::from_le_bytes(block[0..8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(block[8..16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dce729);

        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x38495ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;
    let tail_len = tail.len();
    if tail_len > 8 {
        for (i, b) in tail[8..].iter().enumerate() {
            k2 ^= (*b as u64) << (8 * i);
        }
        k2 = k2.wrapping_mul(C2);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;
    }
    if tail_len > 0 {
        for (i, b) in tail[..tail_len.min(8)].iter().enumerate() {
            k1 ^= (*b as u64) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u64;
    h2 ^= data.len() as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    // h2 = h2.wrapping_add(h1); // unused: only the low 64 bits are needed.

    h1
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^= k >> 33;
    k
}

/// Serializes a filter to bytes via the shared encoding traits, for
/// embedding in catalog snapshots (§4.9).
pub fn to_bytes(filter: &BloomFilter) -> Result<Vec<u8>, EncodingError> {
    encoding::encode_to_vec(filter)
}

/// Deserializes a filter previously produced by [`to_bytes`].
pub fn from_bytes(bytes: &[u8]) -> Result<BloomFilter, EncodingError> {
    let (filter, _) = encoding::decode_from_slice(bytes)?;
    Ok(filter)
}
