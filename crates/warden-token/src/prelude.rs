//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_token::prelude::*;` to import all essential types.

// Errors
pub use crate::{TokenError, TokenResult};

// Capability tokens
pub use crate::{CapabilityClaims, issue_capability, verify_capability};

// Override tokens
pub use crate::{
    IssuedOverride, MAX_OVERRIDE_TTL_SECS, OverrideClaims, VerifiedOverride, issue_override,
    verify_override,
};

// Issuer registry
pub use crate::IssuerRegistry;

// Token hashing
pub use crate::token_hash;
