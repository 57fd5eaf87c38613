//! Gateway error types.
//!
//! Every variant is an infrastructure fault. DENY and ESCALATE travel
//! inside `Decision`; callers can always tell a refused action from a
//! broken gateway.

use thiserror::Error;

/// Faults surfaced by the gateway facade.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Evaluation failed (store fault or deadline).
    #[error(transparent)]
    Engine(#[from] warden_policy::EngineError),

    /// The manifest store failed.
    #[error(transparent)]
    Manifest(#[from] warden_manifest::ManifestError),

    /// The approval or counter store failed.
    #[error(transparent)]
    Approval(#[from] warden_approval::ApprovalError),

    /// The audit chain failed. Never swallowed: a request whose record
    /// cannot be appended is a failed request.
    #[error(transparent)]
    Audit(#[from] warden_audit::AuditError),

    /// Token issuance failed.
    #[error(transparent)]
    Token(#[from] warden_token::TokenError),

    /// Key material problems at startup.
    #[error(transparent)]
    Crypto(#[from] warden_crypto::CryptoError),

    /// Configuration problems at startup.
    #[error(transparent)]
    Config(#[from] warden_config::ConfigError),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
