//! Error taxonomy for the indexing and retrieval engine.

use thiserror::Error;

/// Result alias used throughout huddle-core.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the chunker, embedders, vector index and retriever.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Empty or otherwise unusable text. Callers treat this as a no-op.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding model failure for a single text.
    #[error("Model error: {0}")]
    Model(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Internal state is inconsistent (poisoned lock, duplicate sequence id).
    /// Never expected under correct locking; not recoverable.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// True for per-entry failures that the caller isolates and skips.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidInput(_) | CoreError::Model(_) | CoreError::DimensionMismatch { .. }
        )
    }
}
