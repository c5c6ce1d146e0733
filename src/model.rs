use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::encoder::Derivation;

/// Derived facts about a stored payload. Immutable once created.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[archive(check_bytes)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub data_length: u64,

    /// SHA-256 of the payload, 64 lower-case hex characters.
    pub data_hash: String,

    /// Milliseconds since the Unix epoch at encode time.
    pub timestamp: u64,

    pub coordinate: Coordinate,
}

impl Metadata {
    pub fn from_derivation(derivation: &Derivation) -> Self {
        Self {
            data_length: derivation.fingerprint.length,
            data_hash: derivation.fingerprint.data_hash(),
            timestamp: derivation.timestamp,
            coordinate: derivation.coordinate,
        }
    }
}

/// The unit persisted by the content store.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Debug, Clone, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct StoredRecord {
    pub metadata: Metadata,

    /// Independent copy of the caller's bytes.
    pub payload: Vec<u8>,
}

impl StoredRecord {
    pub fn new(payload: &[u8], metadata: Metadata) -> Self {
        Self {
            metadata,
            payload: payload.to_vec(),
        }
    }

    pub fn coordinate(&self) -> &Coordinate {
        &self.metadata.coordinate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::DimensionEncoder;

    #[test]
    fn test_metadata_json_shape() {
        let derivation = DimensionEncoder::new().derive(b"Hello, Universe!");
        let meta = Metadata::from_derivation(&derivation);
        let json = serde_json::to_value(&meta).unwrap();

        assert_eq!(json["dataLength"], 16);
        assert_eq!(json["dataHash"].as_str().unwrap().len(), 64);
        assert!(json["timestamp"].as_u64().unwrap() > 0);
        assert!(json["coordinate"]["t"].is_string());

        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_record_owns_its_payload() {
        let mut buf = b"mutable".to_vec();
        let meta = Metadata::from_derivation(&DimensionEncoder::new().derive(&buf));
        let record = StoredRecord::new(&buf, meta);
        buf[0] = b'M';
        assert_eq!(record.payload, b"mutable");
    }
}
