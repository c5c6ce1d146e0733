use bit_vec::BitVec;
use seahash::hash;

use crate::coordinate::Coordinate;

/// Probabilistic membership test in front of the coordinate index.
/// A negative answer is definitive; a positive one still needs the index.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: BitVec,
    num_hashes: u32,
}

impl BloomFilter {
    /// expected_items: how many coordinates the store is sized for.
    /// false_positive_rate: acceptable error rate (e.g., 0.01 for 1%).
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);

        // m = -(n * ln(p)) / (ln(2)^2)
        let ln2 = 2.0f64.ln();
        let m = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(64.0);

        // k = (m / n) * ln(2)
        let k = ((m / n) * ln2).ceil().max(1.0);

        Self {
            bits: BitVec::from_elem(m as usize, false),
            num_hashes: k as u32,
        }
    }

    pub fn insert(&mut self, coordinate: &Coordinate) {
        let (h1, h2) = hash_pair(coordinate);
        let m = self.bits.len() as u64;

        for i in 0..self.num_hashes {
            // Double Hashing: g(x) = h1(x) + i * h2(x)
            let idx = h1.wrapping_add((i as u64).wrapping_mul(h2)) % m;
            self.bits.set(idx as usize, true);
        }
    }

    pub fn might_contain(&self, coordinate: &Coordinate) -> bool {
        let (h1, h2) = hash_pair(coordinate);
        let m = self.bits.len() as u64;

        (0..self.num_hashes).all(|i| {
            let idx = h1.wrapping_add((i as u64).wrapping_mul(h2)) % m;
            self.bits.get(idx as usize).unwrap_or(false)
        })
    }
}

/// Two 64-bit hashes: SeaHash of the full coordinate, and SeaHash of T alone.
/// T carries the per-encode discriminator, so the pair stays independent even
/// for coordinates that share X, Y and Z.
fn hash_pair(coordinate: &Coordinate) -> (u64, u64) {
    let h1 = hash(&coordinate.to_bytes());
    let h2 = hash(coordinate.t.as_bytes()) | 1;
    (h1, h2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::U256;

    fn coord(i: u64) -> Coordinate {
        Coordinate::new(U256::from(i), U256::from(i * 3), U256::from(i * 7), U256::from_words(i as u128, 1))
    }

    #[test]
    fn test_no_false_negatives() {
        let mut bf = BloomFilter::new(1_000, 0.01);
        for i in 0..1_000 {
            bf.insert(&coord(i));
        }
        assert!((0..1_000).all(|i| bf.might_contain(&coord(i))));
    }

    #[test]
    fn test_false_positive_rate_is_bounded() {
        let mut bf = BloomFilter::new(1_000, 0.01);
        for i in 0..1_000 {
            bf.insert(&coord(i));
        }
        let hits = (10_000..20_000).filter(|&i| bf.might_contain(&coord(i))).count();
        assert!(hits < 500, "false positives: {}", hits);
    }

    #[test]
    fn test_empty_filter_admits_nothing() {
        let bf = BloomFilter::new(10, 0.01);
        assert!(!(0..100).any(|i| bf.might_contain(&coord(i))));
    }
}
