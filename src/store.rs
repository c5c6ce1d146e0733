use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};

use rkyv::Deserialize;
use tracing::{debug, error, info};

use crate::coordinate::Coordinate;
use crate::encoder::Tick;
use crate::error::{Result, TetradError};
use crate::filter::BloomFilter;
use crate::model::{Metadata, StoredRecord};
use crate::storage::Segment;

pub const DEFAULT_BLOOM_CAPACITY: usize = 1_000_000;
pub const DEFAULT_BLOOM_FP_RATE: f64 = 0.01;

/// Coordinate -> record map. Owns every stored payload.
///
/// Records are only ever added; an occupied coordinate is never rebound.
pub struct ContentStore {
    records: RwLock<HashMap<Coordinate, StoredRecord>>,
    bloom_filter: RwLock<BloomFilter>,
    segment: Option<Mutex<Segment>>,
}

impl fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStore")
        .field("record_count", &self.len())
        .field("durable", &self.segment.is_some())
        .finish()
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ContentStore {
    pub fn in_memory() -> Self {
        Self::with_filter(DEFAULT_BLOOM_CAPACITY, DEFAULT_BLOOM_FP_RATE)
    }

    pub fn with_filter(bloom_capacity: usize, bloom_fp_rate: f64) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            bloom_filter: RwLock::new(BloomFilter::new(bloom_capacity, bloom_fp_rate)),
            segment: None,
        }
    }

    /// Opens (or creates) a segment-backed store and replays its log.
    pub fn open(path: &Path, strict_durability: bool, bloom_capacity: usize, bloom_fp_rate: f64) -> Result<Self> {
        let mut segment = Segment::new(path, strict_durability)?;
        let replayed = segment.replay()?;

        let store = Self {
            records: RwLock::new(HashMap::with_capacity(replayed.len())),
            bloom_filter: RwLock::new(BloomFilter::new(bloom_capacity.max(replayed.len()), bloom_fp_rate)),
            segment: None,
        };

        let count = replayed.len();
        store.insert_batch(replayed)?;

        info!("Replayed {} records from {}", count, path.display());
        Ok(Self {
            segment: Some(Mutex::new(segment)),
            ..store
        })
    }

    pub fn is_durable(&self) -> bool {
        self.segment.is_some()
    }

    /// Binds `payload` to `coordinate`.
    ///
    /// Fails with `CollisionDetected` if the coordinate is already bound. Either
    /// the record is fully inserted (log, index, filter) or nothing changes.
    pub fn put(&self, coordinate: Coordinate, payload: &[u8], metadata: Metadata) -> Result<()> {
        if metadata.coordinate != coordinate {
            return Err(TetradError::InvalidCoordinate(format!(
                "metadata describes {:x}, not {:x}",
                metadata.coordinate, coordinate
            )));
        }
        self.insert_record(StoredRecord::new(payload, metadata))
    }

    fn insert_record(&self, record: StoredRecord) -> Result<()> {
        let coordinate = *record.coordinate();
        let mut records = self.records.write()?;

        if let Some(existing) = records.get(&coordinate) {
            error!(
                "Collision at {:x}: existing {} bytes ({}), offered {} bytes ({})",
                coordinate,
                existing.metadata.data_length,
                existing.metadata.data_hash,
                record.metadata.data_length,
                record.metadata.data_hash
            );
            return Err(TetradError::CollisionDetected(coordinate));
        }

        // Every lock is held before the log is touched; nothing after the
        // append can fail.
        let mut bf = self.bloom_filter.write()?;
        if let Some(segment) = &self.segment {
            let mut segment = segment.lock()?;
            segment.append(&record)?;
        }
        bf.insert(&coordinate);

        debug!("Stored {} bytes at {:x}", record.payload.len(), coordinate);
        records.insert(coordinate, record);
        Ok(())
    }

    /// All-or-nothing insert of many records under one write lock.
    fn insert_batch(&self, batch: Vec<StoredRecord>) -> Result<()> {
        let mut records = self.records.write()?;

        let mut incoming = HashSet::with_capacity(batch.len());
        for record in &batch {
            let coordinate = *record.coordinate();
            if records.contains_key(&coordinate) || !incoming.insert(coordinate) {
                error!("Collision at {:x} while loading records", coordinate);
                return Err(TetradError::CollisionDetected(coordinate));
            }
        }

        let mut bf = self.bloom_filter.write()?;
        if let Some(segment) = &self.segment {
            let mut segment = segment.lock()?;
            segment.append_batch(&batch)?;
        }

        for record in batch {
            let coordinate = *record.coordinate();
            bf.insert(&coordinate);
            records.insert(coordinate, record);
        }
        Ok(())
    }

    fn filter_admits(&self, coordinate: &Coordinate) -> bool {
        self.bloom_filter
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .might_contain(coordinate)
    }

    /// Copy of the stored payload. All four components must match.
    pub fn get(&self, coordinate: &Coordinate) -> Result<Vec<u8>> {
        if !self.filter_admits(coordinate) {
            return Err(TetradError::NotFound(*coordinate));
        }

        let records = self.records.read()?;
        records
        .get(coordinate)
        .map(|r| r.payload.clone())
        .ok_or(TetradError::NotFound(*coordinate))
    }

    /// Never fails; a poisoned lock still answers from the data it guards.
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        if !self.filter_admits(coordinate) {
            return false;
        }
        self.records
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(coordinate)
    }

    /// Metadata without copying the payload out.
    pub fn metadata_of(&self, coordinate: &Coordinate) -> Result<Metadata> {
        if !self.filter_admits(coordinate) {
            return Err(TetradError::NotFound(*coordinate));
        }

        let records = self.records.read()?;
        records
        .get(coordinate)
        .map(|r| r.metadata.clone())
        .ok_or(TetradError::NotFound(*coordinate))
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_payload_bytes(&self) -> u64 {
        self.records
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .map(|r| r.metadata.data_length)
        .sum()
    }

    /// Coordinates sharing the given content (X, Y, Z), oldest first.
    pub fn coordinates_for_content(&self, probe: &Coordinate) -> Vec<Coordinate> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<Coordinate> = records.keys().filter(|c| c.same_content(probe)).copied().collect();
        found.sort_by_key(|c| c.t);
        found
    }

    /// Component-wise maximum of every T already issued, used to resume a clock.
    pub fn max_tick(&self) -> Option<Tick> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.keys().map(|c| Tick::from_u256(c.t)).reduce(|a, b| Tick {
            millis: a.millis.max(b.millis),
            sequence: a.sequence.max(b.sequence),
            nonce: a.nonce,
        })
    }

    // --- SNAPSHOTS ---

    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let mut records: Vec<StoredRecord> = {
            let index = self.records.read()?;
            index.values().cloned().collect()
        };
        records.sort_by(|a, b| a.coordinate().cmp(b.coordinate()));

        info!("[SNAPSHOT] Serializing {} records (Binary/rkyv)...", records.len());

        let bytes = rkyv::to_bytes::<_, 4096>(&records)
        .map_err(|e| TetradError::Serialization(e.to_string()))?;
        Ok(bytes.into_vec())
    }

    /// Loads every record from a snapshot. Fails without inserting anything if
    /// any record collides with one already stored.
    pub fn restore(&self, snapshot_data: &[u8]) -> Result<usize> {
        info!("[RESTORE] Reading binary snapshot ({} bytes)...", snapshot_data.len());

        let mut aligned = rkyv::AlignedVec::with_capacity(snapshot_data.len());
        aligned.extend_from_slice(snapshot_data);

        let archived = rkyv::check_archived_root::<Vec<StoredRecord>>(&aligned)
        .map_err(|e| TetradError::Serialization(e.to_string()))?;
        let records: Vec<StoredRecord> = archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| TetradError::Serialization("snapshot deserialization failed".to_string()))?;

        let count = records.len();
        self.insert_batch(records)?;

        info!("[RESTORE] Hydrated {} records.", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::U256;
    use crate::encoder::DimensionEncoder;

    fn encode_into(store: &ContentStore, enc: &DimensionEncoder, payload: &[u8]) -> Coordinate {
        let d = enc.derive(payload);
        store.put(d.coordinate, payload, Metadata::from_derivation(&d)).unwrap();
        d.coordinate
    }

    #[test]
    fn test_put_then_get() {
        let store = ContentStore::in_memory();
        let enc = DimensionEncoder::new();
        let c = encode_into(&store, &enc, b"payload");
        assert_eq!(store.get(&c).unwrap(), b"payload");
        assert!(store.contains(&c));
        assert_eq!(store.metadata_of(&c).unwrap().data_length, 7);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_second_put_is_a_collision() {
        let store = ContentStore::in_memory();
        let enc = DimensionEncoder::new();
        let d = enc.derive(b"one");
        store.put(d.coordinate, b"one", Metadata::from_derivation(&d)).unwrap();

        let err = store.put(d.coordinate, b"two", Metadata::from_derivation(&d)).unwrap_err();
        assert!(err.is_collision());
        assert_eq!(store.get(&d.coordinate).unwrap(), b"one");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_partial_match_is_not_found() {
        let store = ContentStore::in_memory();
        let enc = DimensionEncoder::new();
        let c = encode_into(&store, &enc, b"abc");

        let mut other = c;
        other.t = U256::ZERO;
        assert!(!store.contains(&other));
        assert!(store.get(&other).unwrap_err().is_not_found());
        assert!(store.metadata_of(&other).unwrap_err().is_not_found());
    }

    #[test]
    fn test_mismatched_metadata_is_rejected() {
        let store = ContentStore::in_memory();
        let enc = DimensionEncoder::new();
        let d = enc.derive(b"abc");
        let wrong = Coordinate::default();
        assert!(store.put(wrong, b"abc", Metadata::from_derivation(&d)).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_restore_into_fresh_store() {
        let store = ContentStore::in_memory();
        let enc = DimensionEncoder::new();
        let coords: Vec<_> = (0..20).map(|i| encode_into(&store, &enc, format!("r{}", i).as_bytes())).collect();

        let snap = store.snapshot().unwrap();
        let fresh = ContentStore::in_memory();
        assert_eq!(fresh.restore(&snap).unwrap(), 20);
        for (i, c) in coords.iter().enumerate() {
            assert_eq!(fresh.get(c).unwrap(), format!("r{}", i).as_bytes());
        }

        // Same records again: every one collides, nothing changes.
        assert!(fresh.restore(&snap).unwrap_err().is_collision());
        assert_eq!(fresh.len(), 20);
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let store = ContentStore::in_memory();
        assert!(store.restore(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_reopen_replays_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.seg");
        let enc = DimensionEncoder::new();

        let c = {
            let store = ContentStore::open(&path, true, 1_000, 0.01).unwrap();
            encode_into(&store, &enc, b"durable")
        };

        let store = ContentStore::open(&path, true, 1_000, 0.01).unwrap();
        assert!(store.is_durable());
        assert_eq!(store.get(&c).unwrap(), b"durable");
        assert_eq!(store.max_tick().unwrap(), Tick::from_u256(c.t));
    }

    #[test]
    fn test_duplicate_frame_in_log_is_a_collision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.seg");
        let d = DimensionEncoder::new().derive(b"twice");
        let record = StoredRecord::new(b"twice", Metadata::from_derivation(&d));
        {
            let mut seg = Segment::new(&path, false).unwrap();
            seg.append(&record).unwrap();
            seg.append(&record).unwrap();
        }

        let err = ContentStore::open(&path, false, 1_000, 0.01).unwrap_err();
        assert!(err.is_collision());
    }

    #[test]
    fn test_restore_into_durable_store_survives_reopen() {
        let source = ContentStore::in_memory();
        let enc = DimensionEncoder::new();
        let coords: Vec<_> = (0..10).map(|i| encode_into(&source, &enc, format!("s{}", i).as_bytes())).collect();
        let snap = source.snapshot().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restored.seg");
        {
            let target = ContentStore::open(&path, true, 1_000, 0.01).unwrap();
            assert_eq!(target.restore(&snap).unwrap(), 10);
        }

        let reopened = ContentStore::open(&path, false, 1_000, 0.01).unwrap();
        assert_eq!(reopened.len(), 10);
        for (i, c) in coords.iter().enumerate() {
            assert_eq!(reopened.get(c).unwrap(), format!("s{}", i).as_bytes());
        }
    }

    #[test]
    fn test_failed_log_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.seg");
        let enc = DimensionEncoder::new();

        let source = ContentStore::in_memory();
        encode_into(&source, &enc, b"small one");
        encode_into(&source, &enc, &[9u8; 4096]);
        encode_into(&source, &enc, b"small two");
        let snap = source.snapshot().unwrap();

        {
            let mut store = ContentStore::open(&path, false, 1_000, 0.01).unwrap();
            store.segment = Some(Mutex::new(Segment::new(&path, false).unwrap().with_frame_limit(512)));

            assert!(store.restore(&snap).is_err());
            assert!(store.is_empty());

            let d = enc.derive(&[3u8; 4096]);
            assert!(store.put(d.coordinate, &[3u8; 4096], Metadata::from_derivation(&d)).is_err());
            assert!(!store.contains(&d.coordinate));

            encode_into(&store, &enc, b"fits");
        }

        let reopened = ContentStore::open(&path, false, 1_000, 0.01).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.total_payload_bytes(), 4);
    }

    #[test]
    fn test_coordinates_for_content() {
        let store = ContentStore::in_memory();
        let enc = DimensionEncoder::new();
        let a = encode_into(&store, &enc, b"dup");
        let b = encode_into(&store, &enc, b"dup");
        encode_into(&store, &enc, b"other");
        assert_eq!(store.coordinates_for_content(&a), vec![a, b]);
        assert_eq!(store.total_payload_bytes(), 11);
    }
}
