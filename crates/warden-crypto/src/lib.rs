//! Warden Crypto - Cryptographic primitives for the policy mediation gateway.
//!
//! This crate provides:
//! - The gateway Ed25519 signing key with secure memory handling
//! - Signatures for interaction records and override/capability tokens
//! - SHA-256 content hashing for audit chains and action fingerprints
//! - A verification key ring supporting historical key rotation
//!
//! # Security Model
//!
//! Every decision the gateway records is backed by cryptography, not trust:
//! interaction records are signed by the gateway key, override tokens are
//! bound to a single approval by hash, and the audit chain links records by
//! SHA-256 so tampering is detectable with nothing but the public keys.
//!
//! # Example
//!
//! ```
//! use warden_crypto::{ContentHash, KeyPair};
//!
//! let keypair = KeyPair::generate();
//!
//! let record_hash = ContentHash::hash(b"canonical record bytes");
//! let signature = keypair.sign(record_hash.as_bytes());
//!
//! assert!(keypair.verify(record_hash.as_bytes(), &signature).is_ok());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod hash;
mod keypair;
mod keyring;
mod signature;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use keypair::{KeyPair, PublicKey};
pub use keyring::KeyRing;
pub use signature::Signature;
