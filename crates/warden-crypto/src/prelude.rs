//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult};

// Key types
pub use crate::{KeyPair, KeyRing, PublicKey};

// Signature
pub use crate::Signature;

// Hashing
pub use crate::ContentHash;
