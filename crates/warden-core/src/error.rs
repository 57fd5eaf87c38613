//! Core error types.

use thiserror::Error;

/// Errors from the foundation layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value could not be serialized to canonical JSON.
    #[error("canonical serialization failed: {0}")]
    Canonical(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
