use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TetradError};
use crate::parser;

pub const COMPONENT_BYTES: usize = 32;
pub const COORDINATE_BYTES: usize = 4 * COMPONENT_BYTES;
pub const COORDINATE_BITS: usize = COORDINATE_BYTES * 8;

/// Unsigned integer in `[0, 2^256)`, stored big-endian so that byte order
/// and numeric order agree.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[archive(check_bytes)]
#[serde(into = "String", try_from = "String")]
pub struct U256([u8; COMPONENT_BYTES]);

impl U256 {
    pub const ZERO: U256 = U256([0u8; COMPONENT_BYTES]);
    pub const MAX: U256 = U256([0xFFu8; COMPONENT_BYTES]);

    pub const fn from_be_bytes(bytes: [u8; COMPONENT_BYTES]) -> Self {
        Self(bytes)
    }

    pub const fn to_be_bytes(self) -> [u8; COMPONENT_BYTES] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; COMPONENT_BYTES] {
        &self.0
    }

    /// Builds `high << 128 | low`.
    pub fn from_words(high: u128, low: u128) -> Self {
        let mut bytes = [0u8; COMPONENT_BYTES];
        bytes[..16].copy_from_slice(&high.to_be_bytes());
        bytes[16..].copy_from_slice(&low.to_be_bytes());
        Self(bytes)
    }

    pub fn high_u128(&self) -> u128 {
        let mut word = [0u8; 16];
        word.copy_from_slice(&self.0[..16]);
        u128::from_be_bytes(word)
    }

    pub fn low_u128(&self) -> u128 {
        let mut word = [0u8; 16];
        word.copy_from_slice(&self.0[16..]);
        u128::from_be_bytes(word)
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// 64 lower-case hex characters, zero padded.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses bare hex digits (no `0x` prefix). Leading zeros beyond 64 digits are accepted.
    pub fn from_hex(digits: &str) -> Result<Self> {
        let significant = digits.trim_start_matches('0');
        if significant.len() > 2 * COMPONENT_BYTES {
            return Err(TetradError::ComponentOverflow);
        }
        let padded = format!("{:0>64}", significant);
        let mut bytes = [0u8; COMPONENT_BYTES];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|e| TetradError::InvalidCoordinate(format!("bad hex component '{}': {}", digits, e)))?;
        Ok(Self(bytes))
    }

    pub fn from_decimal(digits: &str) -> Result<Self> {
        let value = BigUint::parse_bytes(digits.as_bytes(), 10)
            .ok_or_else(|| TetradError::InvalidCoordinate(format!("bad decimal component '{}'", digits)))?;
        U256::try_from(&value)
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        Self::from_words(0, value as u128)
    }
}

impl From<u128> for U256 {
    fn from(value: u128) -> Self {
        Self::from_words(0, value)
    }
}

impl TryFrom<&BigUint> for U256 {
    type Error = TetradError;

    fn try_from(value: &BigUint) -> Result<Self> {
        let raw = value.to_bytes_be();
        if raw.len() > COMPONENT_BYTES {
            return Err(TetradError::ComponentOverflow);
        }
        let mut bytes = [0u8; COMPONENT_BYTES];
        bytes[COMPONENT_BYTES - raw.len()..].copy_from_slice(&raw);
        Ok(Self(bytes))
    }
}

impl From<U256> for String {
    fn from(value: U256) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for U256 {
    type Error = TetradError;

    fn try_from(value: String) -> Result<Self> {
        let digits = value.strip_prefix("0x").unwrap_or(&value);
        if digits.is_empty() {
            return Err(TetradError::InvalidCoordinate(format!("empty hex component '{}'", value)));
        }
        U256::from_hex(digits)
    }
}

impl FromStr for U256 {
    type Err = TetradError;

    /// Decimal, or hex with a `0x` prefix.
    fn from_str(s: &str) -> Result<Self> {
        parser::parse_u256(s)
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_biguint())
    }
}

impl fmt::LowerHex for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0x")?;
        }
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256(0x{})", self.to_hex())
    }
}

/// One of the four independently derived axes of a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// X: content structure.
    Spatial,
    /// Y: byte-value distribution.
    Energy,
    /// Z: byte-to-byte transitions.
    Topology,
    /// T: uniqueness, not content.
    Temporal,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Spatial,
        Dimension::Energy,
        Dimension::Topology,
        Dimension::Temporal,
    ];
}

/// 1024-bit address of an encoded payload.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[archive(check_bytes)]
pub struct Coordinate {
    pub x: U256,
    pub y: U256,
    pub z: U256,
    pub t: U256,
}

impl Coordinate {
    pub const fn new(x: U256, y: U256, z: U256, t: U256) -> Self {
        Self { x, y, z, t }
    }

    pub fn component(&self, dimension: Dimension) -> U256 {
        match dimension {
            Dimension::Spatial => self.x,
            Dimension::Energy => self.y,
            Dimension::Topology => self.z,
            Dimension::Temporal => self.t,
        }
    }

    pub fn components(&self) -> [U256; 4] {
        Dimension::ALL.map(|d| self.component(d))
    }

    /// Two coordinates address the same content when X, Y and Z agree; T only breaks ties.
    pub fn same_content(&self, other: &Coordinate) -> bool {
        self.x == other.x && self.y == other.y && self.z == other.z
    }

    /// The millisecond wall-clock part of T.
    pub fn timestamp_millis(&self) -> u64 {
        u64::try_from(self.t.high_u128()).unwrap_or(u64::MAX)
    }

    /// x ‖ y ‖ z ‖ t, each big-endian.
    pub fn to_bytes(&self) -> [u8; COORDINATE_BYTES] {
        let mut out = [0u8; COORDINATE_BYTES];
        for (i, c) in self.components().iter().enumerate() {
            out[i * COMPONENT_BYTES..(i + 1) * COMPONENT_BYTES].copy_from_slice(c.as_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != COORDINATE_BYTES {
            return Err(TetradError::InvalidCoordinate(format!(
                "expected {} bytes, got {}",
                COORDINATE_BYTES,
                bytes.len()
            )));
        }
        let mut parts = [U256::ZERO; 4];
        for (i, chunk) in bytes.chunks_exact(COMPONENT_BYTES).enumerate() {
            let mut word = [0u8; COMPONENT_BYTES];
            word.copy_from_slice(chunk);
            parts[i] = U256::from_be_bytes(word);
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x, self.y, self.z, self.t)
    }
}

impl fmt::LowerHex for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x}, {:#x}, {:#x}, {:#x})", self.x, self.y, self.z, self.t)
    }
}

impl FromStr for Coordinate {
    type Err = TetradError;

    fn from_str(s: &str) -> Result<Self> {
        parser::parse_coordinate(s)
    }
}

/// Fixed width of the addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateSize {
    pub bits: usize,
    pub bytes: usize,
}

pub const COORDINATE_SIZE: CoordinateSize = CoordinateSize {
    bits: COORDINATE_BITS,
    bytes: COORDINATE_BYTES,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Coordinate {
        Coordinate::new(
            U256::from(123u64),
            U256::from(456u64),
            U256::from(789u64),
            U256::from_words(1_700_000_000_000, 42),
        )
    }

    #[test]
    fn test_size_is_fixed() {
        assert_eq!(COORDINATE_SIZE, CoordinateSize { bits: 1024, bytes: 128 });
        assert_eq!(sample().to_bytes().len(), 128);
    }

    #[test]
    fn test_bytes_round_trip() {
        let c = sample();
        assert_eq!(Coordinate::from_bytes(&c.to_bytes()).unwrap(), c);
        assert!(Coordinate::from_bytes(&[0u8; 127]).is_err());
    }

    #[test]
    fn test_decimal_and_hex_text_round_trip() {
        let c = Coordinate::new(U256::MAX, U256::ZERO, U256::from(u128::MAX), U256::from_words(7, 9));
        let dec = c.to_string();
        let hex = format!("{:x}", c);
        assert_eq!(dec.parse::<Coordinate>().unwrap(), c);
        assert_eq!(hex.parse::<Coordinate>().unwrap(), c);
    }

    #[test]
    fn test_max_renders_as_two_pow_256_minus_one() {
        assert_eq!(
            U256::MAX.to_string(),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
        assert_eq!(U256::MAX.to_hex(), "f".repeat(64));
    }

    #[test]
    fn test_biguint_overflow_rejected() {
        let too_big = BigUint::from(1u8) << 256;
        assert!(matches!(U256::try_from(&too_big), Err(TetradError::ComponentOverflow)));
        let fits = (BigUint::from(1u8) << 256) - 1u8;
        assert_eq!(U256::try_from(&fits).unwrap(), U256::MAX);
    }

    #[test]
    fn test_numeric_order_matches_byte_order() {
        assert!(U256::from(1u64) < U256::from(2u64));
        assert!(U256::from(u128::MAX) < U256::from_words(1, 0));
    }

    #[test]
    fn test_timestamp_extraction() {
        assert_eq!(sample().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_json_uses_hex_components() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["x"].as_str().unwrap().len(), 64);
        let back: Coordinate = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_json_rejects_empty_and_doubled_prefix() {
        let parse = |s: &str| serde_json::from_value::<U256>(serde_json::Value::String(s.to_string()));
        assert!(parse("").is_err());
        assert!(parse("0x").is_err());
        assert!(parse("0x0x1").is_err());
        assert_eq!(parse("0x1").unwrap(), U256::from(1u64));
        assert_eq!(parse("ff").unwrap(), U256::from(255u64));
    }
}
