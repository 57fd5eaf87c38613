//! Registry of capability token issuers.

use std::collections::HashMap;
use std::sync::RwLock;

use warden_crypto::PublicKey;

/// Maps issuer identifiers to their Ed25519 verification keys.
///
/// Thread-safe; registration typically happens at startup from
/// configuration, but keys may be added or withdrawn at runtime.
#[derive(Debug, Default)]
pub struct IssuerRegistry {
    keys: RwLock<HashMap<String, PublicKey>>,
}

impl IssuerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an issuer's verification key.
    pub fn register(&self, issuer: impl Into<String>, key: PublicKey) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(issuer.into(), key);
        }
    }

    /// Withdraw an issuer. Tokens from it stop verifying immediately.
    pub fn withdraw(&self, issuer: &str) {
        if let Ok(mut keys) = self.keys.write() {
            keys.remove(issuer);
        }
    }

    /// Look up an issuer's verification key.
    #[must_use]
    pub fn get(&self, issuer: &str) -> Option<PublicKey> {
        self.keys.read().ok().and_then(|keys| keys.get(issuer).copied())
    }

    /// Number of registered issuers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().map(|keys| keys.len()).unwrap_or(0)
    }

    /// Check if no issuers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
