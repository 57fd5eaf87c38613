//! The connector trait and its result shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use warden_manifest::ToolSpec;

use crate::error::ConnectorResult as OpResult;
use crate::secrets::SecretsProvider;

/// Default per-call timeout.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default request body cap.
pub(crate) const DEFAULT_MAX_REQUEST_BYTES: usize = 1_048_576;
/// Default response body cap.
pub(crate) const DEFAULT_MAX_RESPONSE_BYTES: usize = 1_048_576;

/// Resource limits applied to every connector call.
#[derive(Debug, Clone, Copy)]
pub struct ConnectorLimits {
    /// Wall-clock budget for the whole call.
    pub timeout: Duration,
    /// Maximum request body size in bytes.
    pub max_request_bytes: usize,
    /// Maximum response bytes kept; the remainder is discarded and the
    /// response marked truncated.
    pub max_response_bytes: usize,
}

impl Default for ConnectorLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// What came back from a connector call.
///
/// Non-2xx statuses are carried here, not raised: the decision about what a
/// failed upstream call *means* belongs to the caller and the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorResponse {
    /// HTTP status code (or 200 for mocks).
    pub status: u16,
    /// Response headers, lowercased names.
    pub headers: BTreeMap<String, String>,
    /// Response body, capped at the configured limit.
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    /// Whether the body was cut off at the cap.
    pub truncated: bool,
    /// Wall-clock duration of the call in milliseconds.
    pub duration_ms: u64,
}

impl ConnectorResponse {
    /// Check for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as UTF-8, lossily.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Body bytes serialize as base64 so responses embed cleanly in JSON
/// audit results.
mod body_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Executes the external side effect of an allowed action.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Execute a tool call with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ConnectorError`] for transport and policy
    /// failures; upstream non-2xx responses are `Ok`.
    async fn execute(
        &self,
        tool: &ToolSpec,
        params: &serde_json::Value,
        secrets: &dyn SecretsProvider,
    ) -> OpResult<ConnectorResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_body_roundtrips_as_base64() {
        let response = ConnectorResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: vec![0, 159, 146, 150],
            truncated: false,
            duration_ms: 12,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert!(json["body"].is_string());

        let back: ConnectorResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back.body, response.body);
    }

    #[test]
    fn test_success_predicate() {
        let mut response = ConnectorResponse {
            status: 204,
            headers: BTreeMap::new(),
            body: Vec::new(),
            truncated: false,
            duration_ms: 0,
        };
        assert!(response.is_success());

        response.status = 502;
        assert!(!response.is_success());
    }
}
