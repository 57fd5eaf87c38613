//! Verification key ring.
//!
//! Chain verification must keep working after the gateway key rotates, so
//! verifiers hold a set of public keys: the current key plus every
//! historical key that ever signed a record. A signature is accepted when
//! any key in the ring verifies it.

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::keypair::PublicKey;
use crate::signature::Signature;

/// An ordered set of verification public keys.
///
/// The first key is the current signing key; later entries are historical
/// keys retained for verifying old records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRing {
    keys: Vec<PublicKey>,
}

impl KeyRing {
    /// Create an empty key ring.
    #[must_use]
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Create a ring holding a single key.
    #[must_use]
    pub fn single(key: PublicKey) -> Self {
        Self { keys: vec![key] }
    }

    /// Publish a new current key, retaining prior keys for verification.
    pub fn rotate_in(&mut self, key: PublicKey) {
        if !self.keys.contains(&key) {
            self.keys.insert(0, key);
        }
    }

    /// The current signing key, if any key is present.
    #[must_use]
    pub fn current(&self) -> Option<&PublicKey> {
        self.keys.first()
    }

    /// All keys, current first.
    #[must_use]
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    /// Check if the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Verify a signature against any key in the ring.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureVerificationFailed`] if no key in the
    /// ring verifies the signature (or the ring is empty).
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<()> {
        for key in &self.keys {
            if key.verify(message, signature).is_ok() {
                return Ok(());
            }
        }
        Err(CryptoError::SignatureVerificationFailed)
    }
}

impl From<Vec<PublicKey>> for KeyRing {
    fn from(keys: Vec<PublicKey>) -> Self {
        Self { keys }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    #[test]
    fn test_verify_with_current_key() {
        let kp = KeyPair::generate();
        let ring = KeyRing::single(kp.export_public_key());

        let sig = kp.sign(b"record hash");
        assert!(ring.verify(b"record hash", &sig).is_ok());
    }

    #[test]
    fn test_verify_with_rotated_key() {
        let old = KeyPair::generate();
        let new = KeyPair::generate();

        let mut ring = KeyRing::single(old.export_public_key());
        let old_sig = old.sign(b"old record");

        ring.rotate_in(new.export_public_key());
        assert_eq!(ring.current(), Some(&new.export_public_key()));

        // Historical signatures still verify after rotation.
        assert!(ring.verify(b"old record", &old_sig).is_ok());
        let new_sig = new.sign(b"new record");
        assert!(ring.verify(b"new record", &new_sig).is_ok());
    }

    #[test]
    fn test_empty_ring_rejects() {
        let kp = KeyPair::generate();
        let ring = KeyRing::new();
        let sig = kp.sign(b"msg");

        assert!(matches!(
            ring.verify(b"msg", &sig),
            Err(CryptoError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn test_unknown_key_rejects() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let ring = KeyRing::single(other.export_public_key());

        let sig = signer.sign(b"msg");
        assert!(ring.verify(b"msg", &sig).is_err());
    }
}
