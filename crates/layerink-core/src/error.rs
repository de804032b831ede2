//! Allocator errors.

use crate::id::Rank;
use thiserror::Error;

/// Errors reported by the allocator.
///
/// Boundary outcomes (already at top, unknown id) are not errors; they are
/// reported through [`crate::MoveResult`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocatorError {
    #[error("Invalid rank range: max_rank ({max}) must be greater than min_rank ({min})")]
    InvalidRange { min: Rank, max: Rank },
    #[error("Invalid step size: {0} (must be positive)")]
    InvalidStepSize(Rank),
    #[error("Invalid group sub-step: {0} (must be positive)")]
    InvalidSubStep(Rank),
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("Rank capacity exhausted: {live} objects do not fit in a range of {capacity} ranks")]
    CapacityExhausted { live: usize, capacity: u64 },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for allocator operations.
pub type AllocatorResult<T> = Result<T, AllocatorError>;

impl From<serde_json::Error> for AllocatorError {
    fn from(err: serde_json::Error) -> Self {
        AllocatorError::Serialization(err.to_string())
    }
}
