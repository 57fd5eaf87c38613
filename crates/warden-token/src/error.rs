//! Token error types.

use thiserror::Error;

/// Errors that can occur while issuing or verifying tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The compact encoding is structurally broken.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The header names an algorithm other than `EdDSA`.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature does not verify against the expected key.
    #[error("token signature invalid")]
    SignatureInvalid,

    /// The token's `exp` is in the past.
    #[error("token expired at {expired_at}")]
    Expired {
        /// Unix timestamp at which the token expired.
        expired_at: i64,
    },

    /// The token's `iat` is in the future beyond leeway.
    #[error("token issued in the future")]
    IssuedInFuture,

    /// The token's audience is not this gateway.
    #[error("token audience mismatch: {0}")]
    AudienceMismatch(String),

    /// No public key is registered for the token's issuer.
    #[error("unknown issuer: {0}")]
    UnknownIssuer(String),

    /// The override token is bound to a different action fingerprint.
    #[error("override token bound to a different action")]
    FingerprintMismatch,

    /// The requested TTL exceeds the hard cap for override tokens.
    #[error("override ttl {requested_secs}s exceeds maximum {max_secs}s")]
    TtlTooLong {
        /// Requested TTL in seconds.
        requested_secs: i64,
        /// Maximum permitted TTL in seconds.
        max_secs: i64,
    },

    /// Canonical serialization of header or payload failed.
    #[error(transparent)]
    Canonical(#[from] warden_core::CoreError),
}

/// Result type for token operations.
pub type TokenResult<T> = Result<T, TokenError>;
