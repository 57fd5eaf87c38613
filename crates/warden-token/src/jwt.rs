//! Compact JWT encoding and verification.
//!
//! Only `alg = "EdDSA"` is accepted; there is no algorithm negotiation.
//! Header and payload are canonical JSON, so the same claims always encode
//! to the same compact string under the same key.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use warden_core::canonical;
use warden_crypto::{ContentHash, KeyPair, PublicKey, Signature};

use crate::error::{TokenError, TokenResult};

/// Clock skew tolerance applied to `exp` and `iat` checks, in seconds.
pub const DEFAULT_LEEWAY_SECS: i64 = 30;

const EDDSA: &str = "EdDSA";

#[derive(Debug, Serialize, serde::Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Encode claims into a signed compact token.
pub(crate) fn encode<C: Serialize>(key: &KeyPair, claims: &C) -> TokenResult<String> {
    let header = Header {
        alg: EDDSA.to_string(),
        typ: "JWT".to_string(),
    };
    let header_b64 = URL_SAFE_NO_PAD.encode(canonical::canonical_bytes(&header)?);
    let payload_b64 = URL_SAFE_NO_PAD.encode(canonical::canonical_bytes(claims)?);

    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature = key.sign(signing_input.as_bytes());

    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.as_bytes())
    ))
}

/// Split a compact token into its three parts.
fn split(token: &str) -> TokenResult<(&str, &str, &str)> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
            Ok((h, p, s))
        },
        _ => Err(TokenError::Malformed(
            "expected three dot-separated parts".to_string(),
        )),
    }
}

fn decode_part<T: DeserializeOwned>(part: &str, what: &str) -> TokenResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| TokenError::Malformed(format!("{what} is not valid base64url")))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| TokenError::Malformed(format!("{what} is not valid JSON")))
}

/// Decode the payload without verifying the signature.
///
/// Used to read routing fields (`iss`, `approval_id`) before the
/// verification key is known. Never trust peeked claims.
pub(crate) fn peek_claims<C: DeserializeOwned>(token: &str) -> TokenResult<C> {
    let (_, payload, _) = split(token)?;
    decode_part(payload, "payload")
}

/// Verify a compact token against a public key and decode its claims.
pub(crate) fn verify<C: DeserializeOwned>(token: &str, key: &PublicKey) -> TokenResult<C> {
    let (header_b64, payload_b64, sig_b64) = split(token)?;

    let header: Header = decode_part(header_b64, "header")?;
    if header.alg != EDDSA {
        return Err(TokenError::UnsupportedAlgorithm(header.alg));
    }

    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| TokenError::Malformed("signature is not valid base64url".to_string()))?;
    let signature =
        Signature::try_from_slice(&sig_bytes).map_err(|_| TokenError::SignatureInvalid)?;

    let signing_input_len = header_b64.len() + 1 + payload_b64.len();
    let signing_input = &token.as_bytes()[..signing_input_len];
    key.verify(signing_input, &signature)
        .map_err(|_| TokenError::SignatureInvalid)?;

    decode_part(payload_b64, "payload")
}

/// Check `exp`/`iat` against `now` (unix seconds) with leeway.
pub(crate) fn check_times(exp: i64, iat: i64, now: i64, leeway: i64) -> TokenResult<()> {
    if now > exp.saturating_add(leeway) {
        return Err(TokenError::Expired { expired_at: exp });
    }
    if iat > now.saturating_add(leeway) {
        return Err(TokenError::IssuedInFuture);
    }
    Ok(())
}

/// SHA-256 of the full compact token string.
///
/// This is the value stored on an approval row to make the override token
/// single-use: consumption compares hashes, never the raw token.
#[must_use]
pub fn token_hash(token: &str) -> ContentHash {
    ContentHash::hash(token.as_bytes())
}
