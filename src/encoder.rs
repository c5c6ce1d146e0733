use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::coordinate::{Coordinate, U256};
use crate::kernel::{self, Fingerprint};

// Domain tags keep the Y and Z sub-hashes independent of X and of each other.
const DOMAIN_ENERGY: &[u8] = b"tetrad.dimension.energy.v1";
const DOMAIN_TOPOLOGY: &[u8] = b"tetrad.dimension.topology.v1";

/// One reading of the temporal source.
///
/// Packed into T as `millis << 128 | sequence << 64 | nonce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub millis: u64,
    pub sequence: u64,
    pub nonce: u64,
}

impl Tick {
    pub fn to_u256(self) -> U256 {
        let low = ((self.sequence as u128) << 64) | self.nonce as u128;
        U256::from_words(self.millis as u128, low)
    }

    pub fn from_u256(t: U256) -> Self {
        let low = t.low_u128();
        Self {
            millis: u64::try_from(t.high_u128()).unwrap_or(u64::MAX),
            sequence: (low >> 64) as u64,
            nonce: low as u64,
        }
    }
}

/// Shared uniqueness source for the T dimension.
///
/// The clock never runs backwards within one source, and the sequence is a
/// single atomic counter, so concurrent readers always get distinct ticks.
#[derive(Debug)]
pub struct TemporalSource {
    floor_millis: AtomicU64,
    sequence: AtomicU64,
    nonce: u64,
}

impl Default for TemporalSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalSource {
    pub fn new() -> Self {
        Self::with_nonce(rand::random())
    }

    pub fn with_nonce(nonce: u64) -> Self {
        Self {
            floor_millis: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            nonce,
        }
    }

    /// Wall clock in milliseconds, clamped to be non-decreasing.
    pub fn now_millis(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let previous = self.floor_millis.fetch_max(wall, Ordering::SeqCst);
        previous.max(wall)
    }

    pub fn next(&self) -> Tick {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        Tick {
            millis: self.now_millis(),
            sequence,
            nonce: self.nonce,
        }
    }

    /// Moves the clock floor and counter past a tick that was already issued,
    /// e.g. one replayed from a segment.
    pub fn resume_after(&self, tick: Tick) {
        self.floor_millis.fetch_max(tick.millis, Ordering::SeqCst);
        self.sequence.fetch_max(tick.sequence.saturating_add(1), Ordering::SeqCst);
    }
}

/// Result of deriving a coordinate for one payload.
#[derive(Debug, Clone, Copy)]
pub struct Derivation {
    pub coordinate: Coordinate,
    pub fingerprint: Fingerprint,
    pub timestamp: u64,
}

#[derive(Debug, Default)]
pub struct DimensionEncoder {
    clock: TemporalSource,
}

impl DimensionEncoder {
    pub fn new() -> Self {
        Self::with_clock(TemporalSource::new())
    }

    pub fn with_clock(clock: TemporalSource) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &TemporalSource {
        &self.clock
    }

    /// X is the payload digest itself.
    pub fn spatial(fingerprint: &Fingerprint) -> U256 {
        U256::from_be_bytes(fingerprint.digest)
    }

    pub fn energy(data: &[u8], fingerprint: &Fingerprint) -> U256 {
        salted_digest(DOMAIN_ENERGY, fingerprint.length, &fingerprint.energy.to_salt(), data)
    }

    pub fn topology(data: &[u8], fingerprint: &Fingerprint) -> U256 {
        salted_digest(DOMAIN_TOPOLOGY, fingerprint.length, &fingerprint.topology.to_salt(), data)
    }

    /// X, Y and Z: pure functions of the payload.
    pub fn content_dimensions(data: &[u8]) -> (Fingerprint, [U256; 3]) {
        let fingerprint = kernel::fingerprint(data);
        let dims = [
            Self::spatial(&fingerprint),
            Self::energy(data, &fingerprint),
            Self::topology(data, &fingerprint),
        ];
        (fingerprint, dims)
    }

    pub fn derive(&self, data: &[u8]) -> Derivation {
        let (fingerprint, [x, y, z]) = Self::content_dimensions(data);
        let tick = self.clock.next();
        Derivation {
            coordinate: Coordinate::new(x, y, z, tick.to_u256()),
            fingerprint,
            timestamp: tick.millis,
        }
    }
}

fn salted_digest(domain: &[u8], length: u64, salt: &[u8], data: &[u8]) -> U256 {
    let mut hasher = Sha256::new();
    hasher.update((domain.len() as u32).to_be_bytes());
    hasher.update(domain);
    hasher.update(length.to_be_bytes());
    hasher.update(salt);
    hasher.update(data);
    U256::from_be_bytes(hasher.finalize().into())
}
