//! Override tokens - single-use credentials for approved escalations.
//!
//! An override token exists for exactly one approved action: its claims
//! carry the approval id and the action fingerprint, its TTL is capped at
//! minutes, and the issuing side records `SHA-256(token)` on the approval
//! row so the first use wins and every later use is refused.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use warden_core::ApprovalId;
use warden_crypto::{ContentHash, KeyPair, KeyRing};

use crate::error::{TokenError, TokenResult};
use crate::jwt;

/// Hard cap on override token lifetime, in seconds. The configured TTL
/// defaults to five minutes; nothing may stretch past fifteen.
pub const MAX_OVERRIDE_TTL_SECS: i64 = 900;

/// The issuer string the gateway stamps into override tokens.
const GATEWAY_ISSUER: &str = "gateway";

/// Claims of an override token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideClaims {
    /// The approval this token was minted for.
    pub approval_id: Uuid,
    /// Hex-encoded fingerprint of the approved action.
    pub action_fingerprint: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
    /// Always `"gateway"`.
    pub iss: String,
}

/// A freshly issued override token with its binding material.
#[derive(Debug, Clone)]
pub struct IssuedOverride {
    /// The compact token to hand to the caller. Shown once.
    pub token: String,
    /// SHA-256 of the token, to store on the approval row.
    pub token_hash: ContentHash,
    /// The token's unique id.
    pub jti: String,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// The verified identity of an override token.
#[derive(Debug, Clone)]
pub struct VerifiedOverride {
    /// The approval the token belongs to.
    pub approval_id: ApprovalId,
    /// The token's unique id.
    pub jti: String,
    /// SHA-256 of the presented token, for the consumption compare.
    pub token_hash: ContentHash,
}

/// Issue an override token for an approved action.
///
/// # Errors
///
/// Returns [`TokenError::TtlTooLong`] if `ttl` exceeds
/// [`MAX_OVERRIDE_TTL_SECS`], or an encoding error.
pub fn issue_override(
    gateway_key: &KeyPair,
    approval_id: &ApprovalId,
    action_fingerprint: &ContentHash,
    ttl: Duration,
    now: DateTime<Utc>,
) -> TokenResult<IssuedOverride> {
    if ttl.num_seconds() > MAX_OVERRIDE_TTL_SECS {
        return Err(TokenError::TtlTooLong {
            requested_secs: ttl.num_seconds(),
            max_secs: MAX_OVERRIDE_TTL_SECS,
        });
    }

    let expires_at = now + ttl;
    let claims = OverrideClaims {
        approval_id: approval_id.0,
        action_fingerprint: action_fingerprint.to_hex(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        jti: Uuid::new_v4().to_string(),
        iss: GATEWAY_ISSUER.to_string(),
    };

    let token = jwt::encode(gateway_key, &claims)?;
    let token_hash = jwt::token_hash(&token);

    debug!(
        approval_id = %approval_id,
        jti = %claims.jti,
        exp = claims.exp,
        "issued override token"
    );

    Ok(IssuedOverride {
        token,
        token_hash,
        jti: claims.jti,
        expires_at,
    })
}

/// Verify an override token against the gateway key ring and a freshly
/// computed action fingerprint.
///
/// On success the token is *recognized*, not consumed: consumption is the
/// approval store's conditional update, so at-most-once holds under
/// concurrent use.
///
/// # Errors
///
/// Returns the specific [`TokenError`] for the first check that fails;
/// [`TokenError::FingerprintMismatch`] means a valid token was applied to a
/// different action than the one approved.
pub fn verify_override(
    token: &str,
    keys: &KeyRing,
    now: DateTime<Utc>,
    expected_fingerprint: &ContentHash,
) -> TokenResult<VerifiedOverride> {
    let claims = verify_against_ring(token, keys)?;

    jwt::check_times(claims.exp, claims.iat, now.timestamp(), jwt::DEFAULT_LEEWAY_SECS)?;

    if claims.iss != GATEWAY_ISSUER {
        return Err(TokenError::Malformed(format!(
            "unexpected issuer: {}",
            claims.iss
        )));
    }

    if claims.action_fingerprint != expected_fingerprint.to_hex() {
        return Err(TokenError::FingerprintMismatch);
    }

    Ok(VerifiedOverride {
        approval_id: ApprovalId(claims.approval_id),
        jti: claims.jti,
        token_hash: jwt::token_hash(token),
    })
}

/// Try each key in the ring; structural errors short-circuit, signature
/// failures fall through to the next key.
fn verify_against_ring(token: &str, keys: &KeyRing) -> TokenResult<OverrideClaims> {
    let mut last = TokenError::SignatureInvalid;
    for key in keys.keys() {
        match jwt::verify::<OverrideClaims>(token, key) {
            Ok(claims) => return Ok(claims),
            Err(TokenError::SignatureInvalid) => last = TokenError::SignatureInvalid,
            Err(other) => return Err(other),
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> ContentHash {
        ContentHash::hash(b"some action")
    }

    #[test]
    fn test_issue_and_verify() {
        let key = KeyPair::generate();
        let ring = KeyRing::single(key.export_public_key());
        let approval = ApprovalId::new();
        let now = Utc::now();

        let issued =
            issue_override(&key, &approval, &fingerprint(), Duration::minutes(5), now).unwrap();

        let verified = verify_override(&issued.token, &ring, now, &fingerprint()).unwrap();
        assert_eq!(verified.approval_id, approval);
        assert_eq!(verified.jti, issued.jti);
        assert_eq!(verified.token_hash, issued.token_hash);
    }

    #[test]
    fn test_ttl_cap() {
        let key = KeyPair::generate();
        let result = issue_override(
            &key,
            &ApprovalId::new(),
            &fingerprint(),
            Duration::minutes(16),
            Utc::now(),
        );
        assert!(matches!(result, Err(TokenError::TtlTooLong { .. })));
    }

    #[test]
    fn test_fingerprint_binding() {
        let key = KeyPair::generate();
        let ring = KeyRing::single(key.export_public_key());
        let now = Utc::now();

        let issued = issue_override(
            &key,
            &ApprovalId::new(),
            &fingerprint(),
            Duration::minutes(5),
            now,
        )
        .unwrap();

        let other_fingerprint = ContentHash::hash(b"a different action");
        let result = verify_override(&issued.token, &ring, now, &other_fingerprint);
        assert!(matches!(result, Err(TokenError::FingerprintMismatch)));
    }

    #[test]
    fn test_expired_token() {
        let key = KeyPair::generate();
        let ring = KeyRing::single(key.export_public_key());
        let issued_at = Utc::now() - Duration::minutes(10);

        let issued = issue_override(
            &key,
            &ApprovalId::new(),
            &fingerprint(),
            Duration::minutes(5),
            issued_at,
        )
        .unwrap();

        let result = verify_override(&issued.token, &ring, Utc::now(), &fingerprint());
        assert!(matches!(result, Err(TokenError::Expired { .. })));
    }

    #[test]
    fn test_rotated_key_still_verifies() {
        let old = KeyPair::generate();
        let new = KeyPair::generate();
        let now = Utc::now();

        let issued = issue_override(
            &old,
            &ApprovalId::new(),
            &fingerprint(),
            Duration::minutes(5),
            now,
        )
        .unwrap();

        let mut ring = KeyRing::single(old.export_public_key());
        ring.rotate_in(new.export_public_key());

        assert!(verify_override(&issued.token, &ring, now, &fingerprint()).is_ok());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let key = KeyPair::generate();
        let other = KeyPair::generate();
        let ring = KeyRing::single(other.export_public_key());
        let now = Utc::now();

        let issued = issue_override(
            &key,
            &ApprovalId::new(),
            &fingerprint(),
            Duration::minutes(5),
            now,
        )
        .unwrap();

        let result = verify_override(&issued.token, &ring, now, &fingerprint());
        assert!(matches!(result, Err(TokenError::SignatureInvalid)));
    }

    #[test]
    fn test_jti_fresh_per_issue() {
        let key = KeyPair::generate();
        let approval = ApprovalId::new();
        let now = Utc::now();

        let a = issue_override(&key, &approval, &fingerprint(), Duration::minutes(5), now).unwrap();
        let b = issue_override(&key, &approval, &fingerprint(), Duration::minutes(5), now).unwrap();

        assert_ne!(a.jti, b.jti);
        assert_ne!(a.token_hash, b.token_hash);
    }
}
