//! Canonical JSON serialization.
//!
//! Hashes and signatures are computed over a deterministic byte form:
//! lexicographically sorted object keys, compact separators, UTF-8. The
//! implementation routes every value through [`serde_json::Value`], whose
//! object map is BTree-backed, so key order is independent of struct field
//! order and of the platform.

use serde::Serialize;
use warden_crypto::ContentHash;

use crate::error::{CoreError, CoreResult};

/// Serialize a value to its canonical JSON string.
///
/// # Errors
///
/// Returns [`CoreError::Canonical`] if the value cannot be represented as
/// JSON (e.g. a map with non-string keys or a NaN float).
pub fn canonical_string<T: Serialize>(value: &T) -> CoreResult<String> {
    let json = serde_json::to_value(value).map_err(|e| CoreError::Canonical(e.to_string()))?;
    serde_json::to_string(&json).map_err(|e| CoreError::Canonical(e.to_string()))
}

/// Serialize a value to its canonical JSON bytes.
///
/// # Errors
///
/// Same as [`canonical_string`].
pub fn canonical_bytes<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    canonical_string(value).map(String::into_bytes)
}

/// SHA-256 over the canonical JSON bytes of a value.
///
/// # Errors
///
/// Same as [`canonical_string`].
pub fn canonical_hash<T: Serialize>(value: &T) -> CoreResult<ContentHash> {
    Ok(ContentHash::hash(&canonical_bytes(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unsorted {
        zebra: u32,
        alpha: &'static str,
        mike: bool,
    }

    #[test]
    fn test_keys_sorted() {
        let value = Unsorted {
            zebra: 1,
            alpha: "a",
            mike: true,
        };
        let s = canonical_string(&value).unwrap();
        assert_eq!(s, r#"{"alpha":"a","mike":true,"zebra":1}"#);
    }

    #[test]
    fn test_nested_keys_sorted() {
        let value = serde_json::json!({
            "b": {"y": 2, "x": 1},
            "a": [{"q": 1, "p": 2}],
        });
        let s = canonical_string(&value).unwrap();
        assert_eq!(s, r#"{"a":[{"p":2,"q":1}],"b":{"x":1,"y":2}}"#);
    }

    #[test]
    fn test_stable_across_calls() {
        let value = serde_json::json!({"k": [1, 2, 3], "s": "x", "f": 10.25});
        assert_eq!(
            canonical_hash(&value).unwrap(),
            canonical_hash(&value).unwrap()
        );
    }

    #[test]
    fn test_compact_separators() {
        let s = canonical_string(&serde_json::json!({"a": [1, 2], "b": "c"})).unwrap();
        assert!(!s.contains(' '));
    }

    #[test]
    fn test_empty_object_hash() {
        // The result hash of a record with no execution result.
        let hash = canonical_hash(&serde_json::json!({})).unwrap();
        assert_eq!(
            hash.to_hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }
}
