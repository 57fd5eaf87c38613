//! Audit error types.

use thiserror::Error;

/// Errors that can occur with audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage backend failure.
    #[error("audit store error: {0}")]
    Store(String),

    /// Canonical serialization failure.
    #[error("audit serialization error: {0}")]
    Serialization(String),

    /// An append raced another writer and the expected tail moved.
    ///
    /// The log retries these internally; surfacing one means retries were
    /// exhausted.
    #[error("audit chain conflict on stream {stream}: expected tail {expected}")]
    ChainConflict {
        /// The stream the append targeted.
        stream: String,
        /// The tail hash the append was predicated on.
        expected: String,
    },

    /// Chain verification found a broken record.
    #[error("chain integrity violation at index {index}: {reason}")]
    IntegrityViolation {
        /// Zero-based index of the broken record.
        index: usize,
        /// Why the chain is invalid there.
        reason: String,
    },

    /// File I/O failure (JSONL store, bundle export).
    #[error("audit I/O error: {0}")]
    Io(String),

    /// Evidence bundle assembly failure.
    #[error("bundle export error: {0}")]
    Bundle(String),

    /// Canonicalization failure bubbled up from the core.
    #[error(transparent)]
    Canonical(#[from] warden_core::CoreError),
}

impl From<std::io::Error> for AuditError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
