//! Connector error types.

use std::fmt;
use thiserror::Error;

/// Why a target was rejected by the SSRF validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsrfReason {
    /// No allow-list entry matched the host (or no list was configured).
    Allowlist,
    /// A resolved address fell in a blocked private/special range.
    PrivateIp,
    /// Disallowed scheme, or credentials embedded in the URL.
    Scheme,
    /// DNS re-resolution produced an address outside the validated set.
    DnsDrift,
}

impl fmt::Display for SsrfReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowlist => write!(f, "ALLOWLIST"),
            Self::PrivateIp => write!(f, "PRIVATE_IP"),
            Self::Scheme => write!(f, "SCHEME"),
            Self::DnsDrift => write!(f, "DNS_DRIFT"),
        }
    }
}

/// Errors from target validation and connector execution.
///
/// Non-2xx responses are not errors; these are transport and policy
/// failures only.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The target failed SSRF validation.
    #[error("ssrf rejection ({reason}): {detail}")]
    Ssrf {
        /// The rejection class.
        reason: SsrfReason,
        /// Human-readable specifics.
        detail: String,
    },

    /// The target URL could not be parsed.
    #[error("invalid target url: {0}")]
    InvalidUrl(String),

    /// DNS or TCP-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// TLS negotiation or verification failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// The call exceeded its time budget.
    #[error("connector timeout after {budget_secs}s")]
    Timeout {
        /// The budget that was exhausted, in seconds.
        budget_secs: u64,
    },

    /// The request body exceeded the configured limit.
    #[error("request body {actual} bytes exceeds limit {limit}")]
    Size {
        /// Observed size in bytes.
        actual: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The tool configuration is unusable (missing endpoint, bad method).
    #[error("connector config error: {0}")]
    Config(String),

    /// A referenced secret is not available.
    #[error("secret not found: {0}")]
    SecretNotFound(String),
}

impl ConnectorError {
    /// Shorthand for an SSRF rejection.
    #[must_use]
    pub fn ssrf(reason: SsrfReason, detail: impl Into<String>) -> Self {
        Self::Ssrf {
            reason,
            detail: detail.into(),
        }
    }

    /// The SSRF rejection class, if this is an SSRF error.
    #[must_use]
    pub fn ssrf_reason(&self) -> Option<SsrfReason> {
        match self {
            Self::Ssrf { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
