//! Warden Token - Capability and override tokens.
//!
//! Two credential kinds flow through the gateway, both compact EdDSA JWTs:
//!
//! - **Capability tokens** are issued by external issuers and assert what
//!   actions an agent may request. The gateway verifies them against a
//!   registry of issuer public keys.
//! - **Override tokens** are issued by the gateway itself when a human
//!   approves an escalated action. They are short-lived, bound to one
//!   action fingerprint, and single-use: the approval row stores the
//!   token's SHA-256 and is atomically consumed on first use.
//!
//! The wire form is the standard three-part compact encoding
//! (`base64url(header).base64url(payload).base64url(signature)`) with
//! canonical JSON for the header and payload bytes, so a token's hash is
//! reproducible by any holder of the string.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod capability;
mod error;
mod issuer;
mod jwt;
mod override_token;

pub use capability::{CapabilityClaims, issue_capability, verify_capability};
pub use error::{TokenError, TokenResult};
pub use issuer::IssuerRegistry;
pub use jwt::{DEFAULT_LEEWAY_SECS, token_hash};
pub use override_token::{
    IssuedOverride, MAX_OVERRIDE_TTL_SECS, OverrideClaims, VerifiedOverride, issue_override,
    verify_override,
};
