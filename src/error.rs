use thiserror::Error;

use crate::coordinate::Coordinate;

pub type Result<T> = std::result::Result<T, TetradError>;

#[derive(Debug, Error)]
pub enum TetradError {
    /// No record is bound to this exact coordinate.
    #[error("Coordinate not found: {0:x}")]
    NotFound(Coordinate),

    /// A second record was offered under an occupied coordinate.
    #[error("Collision detected at coordinate {0:x}")]
    CollisionDetected(Coordinate),

    #[error("Component does not fit in 256 bits")]
    ComponentOverflow,

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Poisoned lock")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TetradError {
    /// Probing misses are routine; everything else is a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TetradError::NotFound(_))
    }

    pub fn is_collision(&self) -> bool {
        matches!(self, TetradError::CollisionDetected(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for TetradError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        TetradError::LockPoisoned
    }
}
