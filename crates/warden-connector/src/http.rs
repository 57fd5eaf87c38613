//! The outbound HTTP/webhook connector.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use warden_manifest::{HttpToolConfig, ToolSpec};

use crate::connector::{Connector, ConnectorLimits, ConnectorResponse};
use crate::error::{ConnectorError, ConnectorResult};
use crate::resolver::DnsResolver;
use crate::secrets::SecretsProvider;
use crate::ssrf::{ResolvedTarget, SsrfPolicy, assert_no_drift, validate_target};

/// Executes `http` and `webhook` tools against validated, pinned targets.
pub struct HttpConnector {
    resolver: Arc<dyn DnsResolver>,
    policy: SsrfPolicy,
    limits: ConnectorLimits,
}

impl HttpConnector {
    /// Create a connector over a resolver, SSRF policy, and limits.
    #[must_use]
    pub fn new(resolver: Arc<dyn DnsResolver>, policy: SsrfPolicy, limits: ConnectorLimits) -> Self {
        Self {
            resolver,
            policy,
            limits,
        }
    }

    /// The effective call budget: the tighter of the global limit and the
    /// tool's own timeout.
    fn call_budget(&self, config: &HttpToolConfig) -> Duration {
        match config.timeout_seconds {
            Some(secs) => self.limits.timeout.min(Duration::from_secs(secs)),
            None => self.limits.timeout,
        }
    }

    /// Build a client whose dial for this host goes to the validated IP.
    ///
    /// SNI and the Host header still carry the hostname; only the socket
    /// address is overridden, which is what defeats rebinding after
    /// validation.
    fn pinned_client(
        &self,
        target: &ResolvedTarget,
        budget: Duration,
    ) -> ConnectorResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(budget)
            .connect_timeout(budget);

        if !host_is_ip_literal(target) {
            builder = builder.resolve(
                &target.host,
                SocketAddr::new(target.chosen_ip, target.port),
            );
        }

        builder
            .build()
            .map_err(|e| ConnectorError::Network(format!("client build failed: {e}")))
    }

    fn map_send_error(&self, e: &reqwest::Error, budget: Duration) -> ConnectorError {
        if e.is_timeout() {
            return ConnectorError::Timeout {
                budget_secs: budget.as_secs(),
            };
        }
        let text = format!("{e:#?}").to_ascii_lowercase();
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            ConnectorError::Tls(e.to_string())
        } else {
            ConnectorError::Network(e.to_string())
        }
    }
}

fn host_is_ip_literal(target: &ResolvedTarget) -> bool {
    matches!(
        target.url.host(),
        Some(url::Host::Ipv4(_) | url::Host::Ipv6(_))
    )
}

fn authorization_header(
    config: &HttpToolConfig,
    secrets: &dyn SecretsProvider,
) -> ConnectorResult<Option<String>> {
    let Some(auth) = &config.auth else {
        return Ok(None);
    };

    let secret = secrets
        .get(&auth.secret_name)
        .ok_or_else(|| ConnectorError::SecretNotFound(auth.secret_name.clone()))?;
    let secret = String::from_utf8_lossy(&secret).to_string();

    match auth.scheme.to_ascii_lowercase().as_str() {
        "bearer" => Ok(Some(format!("Bearer {secret}"))),
        "basic" => Ok(Some(format!("Basic {}", BASE64.encode(secret.as_bytes())))),
        other => Err(ConnectorError::Config(format!(
            "unsupported auth scheme: {other}"
        ))),
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn execute(
        &self,
        tool: &ToolSpec,
        params: &serde_json::Value,
        secrets: &dyn SecretsProvider,
    ) -> ConnectorResult<ConnectorResponse> {
        let config = tool
            .http_config()
            .ok_or_else(|| ConnectorError::Config(format!("{} is not an http tool", tool.kind())))?;
        let endpoint = config
            .endpoint()
            .ok_or_else(|| ConnectorError::Config("tool has no endpoint url".to_string()))?;

        let budget = self.call_budget(config);

        let body = serde_json::to_vec(params)
            .map_err(|e| ConnectorError::Config(format!("params not serializable: {e}")))?;
        if body.len() > self.limits.max_request_bytes {
            return Err(ConnectorError::Size {
                actual: body.len(),
                limit: self.limits.max_request_bytes,
            });
        }

        let target = validate_target(
            endpoint,
            &config.allowed_domains,
            config.allow_http,
            &self.policy,
            self.resolver.as_ref(),
        )
        .await?;

        // Re-resolve immediately before dialing. The pinned client already
        // ignores DNS for this request; the assertion catches rebinding
        // even where pinning is unavailable, and costs one lookup.
        if !host_is_ip_literal(&target) {
            let fresh = self.resolver.resolve(&target.host, target.port).await?;
            assert_no_drift(&target, &fresh)?;
        }

        let client = self.pinned_client(&target, budget)?;

        let method_name = config
            .method
            .clone()
            .unwrap_or_else(|| "POST".to_string())
            .to_ascii_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes())
            .map_err(|_| ConnectorError::Config(format!("invalid method: {method_name}")))?;

        let mut request = client.request(method.clone(), target.url.clone());
        if method != reqwest::Method::GET && method != reqwest::Method::HEAD {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }
        if let Some(authorization) = authorization_header(config, secrets)? {
            request = request.header(AUTHORIZATION, authorization);
        }

        debug!(host = %target.host, ip = %target.chosen_ip, method = %method, "connector dialing");
        let started = Instant::now();

        let mut response = request
            .send()
            .await
            .map_err(|e| self.map_send_error(&e, budget))?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }

        // Stream the body up to the cap; excess closes the connection.
        let mut collected: Vec<u8> = Vec::new();
        let mut truncated = false;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let remaining = self
                        .limits
                        .max_response_bytes
                        .saturating_sub(collected.len());
                    if chunk.len() > remaining {
                        collected.extend_from_slice(&chunk[..remaining]);
                        truncated = true;
                        warn!(host = %target.host, "response truncated at cap");
                        break;
                    }
                    collected.extend_from_slice(&chunk);
                },
                Ok(None) => break,
                Err(e) => return Err(self.map_send_error(&e, budget)),
            }
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(ConnectorResponse {
            status,
            headers,
            body: collected,
            truncated,
            duration_ms,
        })
    }
}

impl std::fmt::Debug for HttpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnector")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
