//! Content fingerprinting.
//!
//! One pass over the payload feeds the SHA-256 digest and accumulates the two
//! scalar features the dimension encoder salts its sub-hashes with:
//!
//! - **Energy**: byte magnitude and Shannon entropy of the byte histogram.
//! - **Topology**: counts of rising/falling/flat byte transitions plus an
//!   FNV-1a signature over the ordered transition pairs.
//!
//! Every function here is pure; the empty payload is a valid input.

use ordered_float::OrderedFloat;
use sha2::{Digest, Sha256};

pub const DIGEST_BYTES: usize = 32;

const CHUNK_SIZE: usize = 64 * 1024;

/// FNV-1a offset basis (64-bit)
const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;

/// FNV-1a prime (64-bit)
const FNV_PRIME: u64 = 0x100000001b3;

/// Byte-value distribution of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Energy {
    /// Sum of all byte values.
    pub magnitude: u64,
    /// Mean byte value in [0, 255].
    pub mean: OrderedFloat<f64>,
    /// Shannon entropy in bits per byte, [0, 8].
    pub entropy: OrderedFloat<f64>,
}

impl Energy {
    pub fn to_salt(&self) -> [u8; 24] {
        let mut salt = [0u8; 24];
        salt[..8].copy_from_slice(&self.magnitude.to_be_bytes());
        salt[8..16].copy_from_slice(&self.mean.to_bits().to_be_bytes());
        salt[16..].copy_from_slice(&self.entropy.to_bits().to_be_bytes());
        salt
    }
}

/// Byte-to-byte transition structure of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topology {
    pub rises: u64,
    pub falls: u64,
    pub flats: u64,
    /// FNV-1a over `(prev, next)` pairs in payload order.
    pub signature: u64,
}

impl Topology {
    pub fn to_salt(&self) -> [u8; 32] {
        let mut salt = [0u8; 32];
        salt[..8].copy_from_slice(&self.rises.to_be_bytes());
        salt[8..16].copy_from_slice(&self.falls.to_be_bytes());
        salt[16..24].copy_from_slice(&self.flats.to_be_bytes());
        salt[24..].copy_from_slice(&self.signature.to_be_bytes());
        salt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub digest: [u8; DIGEST_BYTES],
    pub length: u64,
    pub energy: Energy,
    pub topology: Topology,
}

impl Fingerprint {
    /// Lower-case hex of the digest, 64 characters.
    pub fn data_hash(&self) -> String {
        hex::encode(self.digest)
    }
}

pub fn fingerprint(data: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    let mut histogram = [0u64; 256];
    let mut magnitude: u64 = 0;
    let mut rises: u64 = 0;
    let mut falls: u64 = 0;
    let mut flats: u64 = 0;
    let mut signature = FNV_OFFSET_BASIS;
    let mut prev: Option<u8> = None;

    for chunk in data.chunks(CHUNK_SIZE) {
        hasher.update(chunk);

        for &byte in chunk {
            histogram[byte as usize] += 1;
            magnitude += byte as u64;

            if let Some(p) = prev {
                match byte.cmp(&p) {
                    std::cmp::Ordering::Greater => rises += 1,
                    std::cmp::Ordering::Less => falls += 1,
                    std::cmp::Ordering::Equal => flats += 1,
                }
                for b in [p, byte] {
                    signature ^= b as u64;
                    signature = signature.wrapping_mul(FNV_PRIME);
                }
            }
            prev = Some(byte);
        }
    }

    let length = data.len() as u64;
    let (mean, entropy) = if length == 0 {
        (0.0, 0.0)
    } else {
        let n = length as f64;
        let entropy = histogram
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| {
                let p = count as f64 / n;
                p * (n / count as f64).log2()
            })
            .sum::<f64>();
        (magnitude as f64 / n, entropy)
    };

    Fingerprint {
        digest: hasher.finalize().into(),
        length,
        energy: Energy {
            magnitude,
            mean: OrderedFloat(mean),
            entropy: OrderedFloat(entropy),
        },
        topology: Topology { rises, falls, flats, signature },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_matches_sha256_of_empty_string() {
        let fp = fingerprint(&[]);
        assert_eq!(
            fp.data_hash(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fp.length, 0);
        assert_eq!(fp.energy.magnitude, 0);
        assert_eq!(fp.topology.rises + fp.topology.falls + fp.topology.flats, 0);
    }

    #[test]
    fn test_digest_agrees_with_single_shot() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let single_shot: [u8; DIGEST_BYTES] = Sha256::digest(&data).into();
        assert_eq!(fingerprint(&data).digest, single_shot);
    }

    #[test]
    fn test_energy_tracks_byte_magnitude() {
        let zeros = fingerprint(&[0x00; 64]).energy;
        let mid = fingerprint(&[0x80; 64]).energy;
        let ones = fingerprint(&[0xFF; 64]).energy;
        assert!(zeros.mean < mid.mean && mid.mean < ones.mean);
        assert_eq!(zeros.entropy, OrderedFloat(0.0));
        assert_eq!(ones.mean, OrderedFloat(255.0));
    }

    #[test]
    fn test_entropy_of_uniform_bytes_is_eight_bits() {
        let data: Vec<u8> = (0..=255u8).collect();
        let e = fingerprint(&data).energy.entropy.into_inner();
        assert!((e - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_topology_is_order_sensitive() {
        let up: Vec<u8> = (0..32u8).collect();
        let down: Vec<u8> = up.iter().rev().copied().collect();
        let a = fingerprint(&up);
        let b = fingerprint(&down);
        assert_eq!(a.energy, b.energy);
        assert_eq!(a.topology.rises, 31);
        assert_eq!(b.topology.falls, 31);
        assert_ne!(a.topology.signature, b.topology.signature);
    }

    #[test]
    fn test_hash_is_lowercase_hex() {
        let h = fingerprint(b"Hello, Universe!").data_hash();
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
