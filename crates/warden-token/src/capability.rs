//! Capability tokens - issuer-signed assertions of what an agent may do.
//!
//! Issuance normally happens outside the gateway (the issuer holds its own
//! key); [`issue_capability`] exists for first-party issuers and tests.
//! Verification resolves the issuer's public key through the
//! [`IssuerRegistry`](crate::IssuerRegistry).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_crypto::KeyPair;

use crate::error::{TokenError, TokenResult};
use crate::issuer::IssuerRegistry;
use crate::jwt;

/// The audience value every gateway-bound token must carry.
pub(crate) const GATEWAY_AUDIENCE: &str = "gateway";

/// Claims of a capability token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityClaims {
    /// Issuer identifier, resolved through the issuer registry.
    pub iss: String,
    /// Subject: the agent id this token was issued to.
    pub sub: String,
    /// Audience; must be `"gateway"`.
    pub aud: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
    /// Granted capabilities: bare action types or `agent:action` pairs.
    pub cap: Vec<String>,
    /// Optional issuer-defined constraints, carried opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub con: Option<serde_json::Value>,
}

impl CapabilityClaims {
    /// Build claims for an agent with a validity window.
    #[must_use]
    pub fn new(
        iss: impl Into<String>,
        agent_id: impl Into<String>,
        cap: Vec<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            iss: iss.into(),
            sub: agent_id.into(),
            aud: GATEWAY_AUDIENCE.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            cap,
            con: None,
        }
    }

    /// Check whether these claims grant an action type.
    ///
    /// A grant matches either the bare action type (`"refund"`) or any
    /// qualified form (`"payments:refund"`).
    #[must_use]
    pub fn grants(&self, action_type: &str) -> bool {
        self.cap.iter().any(|c| {
            c == action_type
                || c.split_once(':')
                    .is_some_and(|(_, action)| action == action_type)
        })
    }
}

/// Issue a capability token signed with an issuer key.
///
/// # Errors
///
/// Returns an error if canonical serialization fails.
pub fn issue_capability(issuer_key: &KeyPair, claims: &CapabilityClaims) -> TokenResult<String> {
    jwt::encode(issuer_key, claims)
}

/// Verify a capability token and return its claims.
///
/// Checks, in order: compact structure, `alg`, issuer key lookup,
/// signature, `exp`/`iat` with leeway, audience. The caller still owns the
/// subject and capability checks - those depend on the action being
/// evaluated, not on the token alone.
///
/// # Errors
///
/// Returns the specific [`TokenError`] for the first check that fails.
pub fn verify_capability(
    token: &str,
    registry: &IssuerRegistry,
    now: DateTime<Utc>,
) -> TokenResult<CapabilityClaims> {
    // Peek the issuer to find the verification key; everything peeked is
    // re-read from the verified payload below.
    let peeked: CapabilityClaims = jwt::peek_claims(token)?;
    let issuer_key = registry
        .get(&peeked.iss)
        .ok_or_else(|| TokenError::UnknownIssuer(peeked.iss.clone()))?;

    let claims: CapabilityClaims = jwt::verify(token, &issuer_key)?;

    jwt::check_times(claims.exp, claims.iat, now.timestamp(), jwt::DEFAULT_LEEWAY_SECS)?;

    if claims.aud != GATEWAY_AUDIENCE {
        return Err(TokenError::AudienceMismatch(claims.aud));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn registry_with(iss: &str, key: &KeyPair) -> IssuerRegistry {
        let registry = IssuerRegistry::new();
        registry.register(iss, key.export_public_key());
        registry
    }

    fn claims(now: DateTime<Utc>) -> CapabilityClaims {
        CapabilityClaims::new(
            "acme-issuer",
            "agent-1",
            vec!["read".to_string(), "agent:send_email".to_string()],
            now,
            now + Duration::minutes(10),
        )
    }

    #[test]
    fn test_verify_roundtrip() {
        let key = KeyPair::generate();
        let registry = registry_with("acme-issuer", &key);
        let now = Utc::now();

        let token = issue_capability(&key, &claims(now)).unwrap();
        let verified = verify_capability(&token, &registry, now).unwrap();

        assert_eq!(verified.sub, "agent-1");
        assert_eq!(verified.aud, "gateway");
    }

    #[test]
    fn test_grants_bare_and_qualified() {
        let now = Utc::now();
        let claims = claims(now);

        assert!(claims.grants("read"));
        assert!(claims.grants("send_email"));
        assert!(!claims.grants("refund"));
    }

    #[test]
    fn test_unknown_issuer() {
        let key = KeyPair::generate();
        let registry = IssuerRegistry::new();
        let now = Utc::now();

        let token = issue_capability(&key, &claims(now)).unwrap();
        let result = verify_capability(&token, &registry, now);
        assert!(matches!(result, Err(TokenError::UnknownIssuer(_))));
    }

    #[test]
    fn test_expired_token() {
        let key = KeyPair::generate();
        let registry = registry_with("acme-issuer", &key);
        let now = Utc::now();

        let mut expired = claims(now);
        expired.exp = (now - Duration::minutes(5)).timestamp();

        let token = issue_capability(&key, &expired).unwrap();
        let result = verify_capability(&token, &registry, now);
        assert!(matches!(result, Err(TokenError::Expired { .. })));
    }

    #[test]
    fn test_wrong_audience() {
        let key = KeyPair::generate();
        let registry = registry_with("acme-issuer", &key);
        let now = Utc::now();

        let mut other = claims(now);
        other.aud = "somewhere-else".to_string();

        let token = issue_capability(&key, &other).unwrap();
        let result = verify_capability(&token, &registry, now);
        assert!(matches!(result, Err(TokenError::AudienceMismatch(_))));
    }

    #[test]
    fn test_issuer_spoofing_rejected() {
        // A token claiming a registered issuer but signed by another key.
        let real = KeyPair::generate();
        let attacker = KeyPair::generate();
        let registry = registry_with("acme-issuer", &real);
        let now = Utc::now();

        let token = issue_capability(&attacker, &claims(now)).unwrap();
        let result = verify_capability(&token, &registry, now);
        assert!(matches!(result, Err(TokenError::SignatureInvalid)));
    }
}
