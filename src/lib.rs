//! # Tetrad: content-addressable coordinate store
//!
//! Every payload is addressed by a 1024-bit, four-component [`Coordinate`]:
//!
//! - **X** (spatial): SHA-256 of the payload.
//! - **Y** (energy): domain-separated digest salted with the byte-value distribution.
//! - **Z** (topology): domain-separated digest salted with the byte-transition structure.
//! - **T** (temporal): wall-clock milliseconds plus an atomic discriminator.
//!
//! X, Y and Z are pure functions of content. T exists only to keep repeated
//! encodes of the same bytes apart. The store is the source of truth: a
//! coordinate can only be turned back into bytes by the store that issued it.
//!
//! ```rust
//! use tetrad::AddressService;
//!
//! let service = AddressService::new();
//! let coordinate = service.encode(b"Hello, Universe!")?;
//! assert_eq!(service.decode(&coordinate)?, b"Hello, Universe!");
//! # Ok::<(), tetrad::TetradError>(())
//! ```

pub mod analysis;
pub mod coordinate;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod kernel;
pub mod manager;
pub mod model;
pub mod parser;
pub mod server;
pub mod storage;
pub mod store;

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info};

pub use analysis::NumberAnalyzer;
pub use coordinate::{Coordinate, CoordinateSize, Dimension, COORDINATE_SIZE, U256};
pub use encoder::{DimensionEncoder, TemporalSource};
pub use error::{Result, TetradError};
pub use model::Metadata;
pub use store::ContentStore;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Append-only log backing the store; `None` keeps records in memory only.
    pub segment_path: Option<PathBuf>,
    pub strict_durability: bool,
    pub bloom_capacity: usize,
    pub bloom_false_positive_rate: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            segment_path: None,
            strict_durability: true,
            bloom_capacity: store::DEFAULT_BLOOM_CAPACITY,
            bloom_false_positive_rate: store::DEFAULT_BLOOM_FP_RATE,
        }
    }
}

/// Public facade: derives coordinates and keeps the payloads they address.
///
/// Safe to share across threads; every method takes `&self`.
pub struct AddressService {
    encoder: DimensionEncoder,
    store: ContentStore,
}

impl fmt::Debug for AddressService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressService")
        .field("store", &self.store)
        .finish()
    }
}

impl Default for AddressService {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressService {
    /// Fresh in-memory service.
    pub fn new() -> Self {
        Self::with_parts(DimensionEncoder::new(), ContentStore::in_memory())
    }

    pub fn with_parts(encoder: DimensionEncoder, store: ContentStore) -> Self {
        if let Some(tick) = store.max_tick() {
            encoder.clock().resume_after(tick);
        }
        Self { encoder, store }
    }

    pub fn open(config: &StoreConfig) -> Result<Self> {
        let store = match &config.segment_path {
            Some(path) => ContentStore::open(
                path,
                config.strict_durability,
                config.bloom_capacity,
                config.bloom_false_positive_rate,
            )?,
            None => ContentStore::with_filter(config.bloom_capacity, config.bloom_false_positive_rate),
        };
        info!("Address service ready ({} records, durable: {})", store.len(), store.is_durable());
        Ok(Self::with_parts(DimensionEncoder::new(), store))
    }

    /// Stores an independent copy of `data` and returns its coordinate.
    ///
    /// Any length is accepted, including zero. An error means nothing was stored.
    pub fn encode(&self, data: &[u8]) -> Result<Coordinate> {
        let derivation = self.encoder.derive(data);
        let coordinate = derivation.coordinate;
        self.store.put(coordinate, data, Metadata::from_derivation(&derivation))?;
        debug!("Encoded {} bytes", data.len());
        Ok(coordinate)
    }

    /// Fails with `NotFound` for any coordinate this service never issued.
    pub fn decode(&self, coordinate: &Coordinate) -> Result<Vec<u8>> {
        self.store.get(coordinate)
    }

    pub fn has_coordinate(&self, coordinate: &Coordinate) -> bool {
        self.store.contains(coordinate)
    }

    /// Existence-check flavour: absent coordinates yield `None`.
    pub fn get_metadata(&self, coordinate: &Coordinate) -> Option<Metadata> {
        self.store.metadata_of(coordinate).ok()
    }

    /// Assertion flavour: absent coordinates are an error.
    pub fn require_metadata(&self, coordinate: &Coordinate) -> Result<Metadata> {
        self.store.metadata_of(coordinate)
    }

    pub const fn coordinate_size() -> CoordinateSize {
        COORDINATE_SIZE
    }

    /// Hands one component of a stored coordinate to an external analyzer.
    pub fn analyze_dimension<A: NumberAnalyzer + ?Sized>(
        &self,
        coordinate: &Coordinate,
        dimension: Dimension,
        analyzer: &A,
    ) -> Result<A::Report> {
        if !self.has_coordinate(coordinate) {
            return Err(TetradError::NotFound(*coordinate));
        }
        Ok(analysis::analyze_dimension(analyzer, coordinate, dimension))
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
