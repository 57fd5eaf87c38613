//! Engine error types.
//!
//! Everything here is an infrastructure fault. Policy denials and
//! escalations never appear on this channel.

use thiserror::Error;

/// Infrastructure faults during evaluation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request's deadline expired before evaluation finished.
    #[error("evaluation deadline expired")]
    Deadline,

    /// The manifest store failed.
    #[error(transparent)]
    Manifest(#[from] warden_manifest::ManifestError),

    /// The approval or counter store failed.
    #[error(transparent)]
    Approval(#[from] warden_approval::ApprovalError),

    /// Canonicalization failed (fingerprint or trace hashing).
    #[error(transparent)]
    Canonical(#[from] warden_core::CoreError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
