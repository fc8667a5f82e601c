//! Bloom Filter
//!
//! Per-SSTable probabilistic membership filter. A negative answer is
//! exact, so point lookups for absent keys skip the block read.
//!
//! Encoding: `[bit array][k (1 byte)]`.

/// Maximum number of hash functions per key
const MAX_HASHES: u32 = 30;

/// Minimum filter size in bits, so tiny tables still filter well
const MIN_BITS: usize = 64;

/// Immutable bloom filter over a set of key hashes
#[derive(Debug, Clone, PartialEq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    hash_count: u32,
}

impl BloomFilter {
    /// Hash a key for insertion or lookup
    pub fn hash(key: &[u8]) -> u32 {
        fmix32(crc32fast::hash(key))
    }

    /// Build a filter from precomputed key hashes
    pub fn from_hashes(hashes: &[u32], bits_per_key: usize) -> Self {
        // k = bits_per_key * ln(2) minimizes the false positive rate
        let hash_count = ((bits_per_key as f64 * 0.69) as u32).clamp(1, MAX_HASHES);

        let nbits = (hashes.len() * bits_per_key).max(MIN_BITS);
        let nbytes = (nbits + 7) / 8;
        let nbits = nbytes * 8;

        let mut bits = vec![0u8; nbytes];
        for &h in hashes {
            let delta = h.rotate_right(17);
            let mut h = h;
            for _ in 0..hash_count {
                let pos = h as usize % nbits;
                bits[pos / 8] |= 1 << (pos % 8);
                h = h.wrapping_add(delta);
            }
        }

        Self { bits, hash_count }
    }

    /// False means the key is definitely absent
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let nbits = self.bits.len() * 8;
        if nbits == 0 {
            return true;
        }

        let mut h = Self::hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..self.hash_count {
            let pos = h as usize % nbits;
            if self.bits[pos / 8] & (1 << (pos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }

    /// Serialize as `[bits][k]`
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bits.len() + 1);
        out.extend_from_slice(&self.bits);
        out.push(self.hash_count as u8);
        out
    }

    /// Decode a filter; `None` for an empty or malformed block
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (&hash_count, bits) = bytes.split_last()?;
        if bits.is_empty() || hash_count == 0 || u32::from(hash_count) > MAX_HASHES {
            return None;
        }
        Some(Self {
            bits: bits.to_vec(),
            hash_count: u32::from(hash_count),
        })
    }

    /// Size of the bit array in bytes
    pub fn byte_len(&self) -> usize {
        self.bits.len()
    }
}

/// Murmur3 finalizer; spreads CRC output across all bits
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
