//! Error types for engine operations.
//!
//! Empty inputs (no chunks, a query that normalizes to nothing) are not
//! errors; they produce empty results. Only malformed caller input and
//! failed rebuilds surface as [`EngineError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller supplied a missing or malformed parameter.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced group or external corpus does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A rebuild failed. The previously current index is still in place.
    #[error("index build failed: {0}")]
    Build(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
