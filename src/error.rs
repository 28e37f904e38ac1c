//! Error taxonomy for the reconstruction core.
//!
//! All failures are local precondition violations reported immediately to the
//! caller; nothing is retried or wrapped on the way up.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// Coordinate, data and matrix sizes are incompatible. Raised before any
    /// oversampled grid is allocated.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Configuration rejected at construction time (dimensionality outside
    /// 1..=3, kernel width/oversampling producing a degenerate table, bad
    /// basis dimensions).
    #[error("unsupported configuration: {0}")]
    UnsupportedConfig(String),
}
