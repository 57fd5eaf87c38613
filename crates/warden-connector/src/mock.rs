//! The in-process mock connector.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use warden_manifest::ToolSpec;

use crate::connector::{Connector, ConnectorResponse};
use crate::error::{ConnectorError, ConnectorResult};
use crate::secrets::SecretsProvider;

/// Executes `mock` tools: no I/O, echoes params (or the configured result)
/// and records every invocation for assertions.
#[derive(Debug, Default)]
pub struct MockConnector {
    calls: Mutex<Vec<serde_json::Value>>,
}

impl MockConnector {
    /// Create a mock connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The params of every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<serde_json::Value> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn execute(
        &self,
        tool: &ToolSpec,
        params: &serde_json::Value,
        _secrets: &dyn SecretsProvider,
    ) -> ConnectorResult<ConnectorResponse> {
        let ToolSpec::Mock(config) = tool else {
            return Err(ConnectorError::Config(format!(
                "{} is not a mock tool",
                tool.kind()
            )));
        };

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(params.clone());
        }

        let payload = config
            .result
            .clone()
            .unwrap_or_else(|| serde_json::json!({"echo": params}));
        let body = serde_json::to_vec(&payload)
            .map_err(|e| ConnectorError::Config(format!("mock result not serializable: {e}")))?;

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Ok(ConnectorResponse {
            status: 200,
            headers,
            body,
            truncated: false,
            duration_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::StaticSecrets;
    use warden_manifest::MockToolConfig;

    #[tokio::test]
    async fn test_mock_echoes_params() {
        let connector = MockConnector::new();
        let tool = ToolSpec::Mock(MockToolConfig::default());
        let params = serde_json::json!({"x": 1});

        let response = connector
            .execute(&tool, &params, &StaticSecrets::new())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["echo"]["x"], 1);
        assert_eq!(connector.call_count(), 1);
        assert_eq!(connector.calls()[0], params);
    }

    #[tokio::test]
    async fn test_mock_fixed_result() {
        let connector = MockConnector::new();
        let tool = ToolSpec::Mock(MockToolConfig {
            result: Some(serde_json::json!({"ok": true})),
        });

        let response = connector
            .execute(&tool, &serde_json::json!({}), &StaticSecrets::new())
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_mock_rejects_http_tool() {
        let connector = MockConnector::new();
        let tool = ToolSpec::Http(warden_manifest::HttpToolConfig {
            base_url: Some("https://x.example.com".to_string()),
            ..warden_manifest::HttpToolConfig::default()
        });

        let result = connector
            .execute(&tool, &serde_json::json!({}), &StaticSecrets::new())
            .await;
        assert!(matches!(result, Err(ConnectorError::Config(_))));
    }
}
