//! Gateway assembly.

use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::info;
use warden_approval::{ApprovalStore, CounterStore, MemoryApprovalStore, MemoryCounterStore};
use warden_audit::{AuditLog, AuditStore, MemoryAuditStore};
use warden_config::CoreConfig;
use warden_connector::{
    ConnectorLimits, DnsResolver, HttpConnector, MockConnector, SecretsProvider, SsrfPolicy,
    StaticSecrets, SystemResolver,
};
use warden_core::StreamId;
use warden_crypto::{CryptoError, KeyPair, KeyRing, PublicKey};
use warden_manifest::{HostPattern, ManifestStore, MemoryManifestStore};
use warden_policy::PolicyEngine;
use warden_token::IssuerRegistry;

use crate::error::GatewayResult;
use crate::gateway::Gateway;

/// Builds a [`Gateway`] from a config plus optional store and seam
/// overrides. Anything not supplied gets the in-memory default, so a bare
/// `GatewayBuilder::new(config).build()` is a fully working single-process
/// core.
pub struct GatewayBuilder {
    config: CoreConfig,
    signing_key: Option<KeyPair>,
    manifests: Option<Arc<dyn ManifestStore>>,
    approvals: Option<Arc<dyn ApprovalStore>>,
    counters: Option<Arc<dyn CounterStore>>,
    audit_store: Option<Arc<dyn AuditStore>>,
    resolver: Option<Arc<dyn DnsResolver>>,
    secrets: Option<Arc<dyn SecretsProvider>>,
    stream: StreamId,
    historical_keys: Vec<PublicKey>,
}

impl GatewayBuilder {
    /// Start building with a validated configuration.
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            signing_key: None,
            manifests: None,
            approvals: None,
            counters: None,
            audit_store: None,
            resolver: None,
            secrets: None,
            stream: StreamId::default(),
            historical_keys: Vec::new(),
        }
    }

    /// Inject the gateway signing key directly.
    #[must_use]
    pub fn signing_key(mut self, key: KeyPair) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Use a specific manifest store.
    #[must_use]
    pub fn manifests(mut self, store: Arc<dyn ManifestStore>) -> Self {
        self.manifests = Some(store);
        self
    }

    /// Use a specific approval store.
    #[must_use]
    pub fn approvals(mut self, store: Arc<dyn ApprovalStore>) -> Self {
        self.approvals = Some(store);
        self
    }

    /// Use a specific counter store.
    #[must_use]
    pub fn counters(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counters = Some(store);
        self
    }

    /// Use a specific audit store.
    #[must_use]
    pub fn audit_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.audit_store = Some(store);
        self
    }

    /// Use a specific DNS resolver (tests inject a static one).
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn DnsResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use a specific secrets provider.
    #[must_use]
    pub fn secrets(mut self, secrets: Arc<dyn SecretsProvider>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Write records to a specific audit stream.
    #[must_use]
    pub fn stream(mut self, stream: StreamId) -> Self {
        self.stream = stream;
        self
    }

    /// Add a historical public key to the verification ring (rotation).
    #[must_use]
    pub fn historical_key(mut self, key: PublicKey) -> Self {
        self.historical_keys.push(key);
        self
    }

    /// Assemble the gateway.
    ///
    /// # Errors
    ///
    /// Returns a config validation error, a key loading error, or
    /// [`CryptoError::ProductionKeyRequired`] when production keys are
    /// demanded but none was provided.
    pub fn build(self) -> GatewayResult<Gateway> {
        self.config.validate()?;

        let signing_key = match self.signing_key {
            Some(key) => key,
            None => load_signing_key(&self.config)?,
        };

        let mut keys = KeyRing::single(signing_key.export_public_key());
        for key in self.historical_keys {
            if keys.current() != Some(&key) {
                let mut extended: Vec<PublicKey> = keys.keys().to_vec();
                extended.push(key);
                keys = KeyRing::from(extended);
            }
        }

        let issuers = Arc::new(IssuerRegistry::new());
        for (issuer, key_hex) in &self.config.issuers {
            issuers.register(issuer.clone(), PublicKey::from_hex(key_hex)?);
        }

        let manifests = self
            .manifests
            .unwrap_or_else(|| Arc::new(MemoryManifestStore::new()));
        let approvals = self
            .approvals
            .unwrap_or_else(|| Arc::new(MemoryApprovalStore::new()));
        let counters = self
            .counters
            .unwrap_or_else(|| Arc::new(MemoryCounterStore::new()));
        let audit_store = self
            .audit_store
            .unwrap_or_else(|| Arc::new(MemoryAuditStore::new()));
        let resolver = self.resolver.unwrap_or_else(|| Arc::new(SystemResolver));
        let secrets = self
            .secrets
            .unwrap_or_else(|| Arc::new(StaticSecrets::new()));

        let engine = PolicyEngine::new(
            manifests.clone(),
            approvals.clone(),
            counters.clone(),
            issuers.clone(),
            keys.clone(),
            chrono_secs(self.config.approval_expiry_seconds),
        );

        let ssrf_policy = SsrfPolicy {
            allow_http: self.config.allow_http_in_connectors,
            global_allowed_domains: self
                .config
                .global_allowed_webhook_domains
                .iter()
                .map(|p| HostPattern::new(p.clone()))
                .collect(),
        };
        let limits = ConnectorLimits {
            timeout: StdDuration::from_secs(self.config.default_connector_timeout_seconds),
            max_request_bytes: self.config.max_request_bytes,
            max_response_bytes: self.config.max_response_bytes,
        };
        let http_connector = HttpConnector::new(resolver, ssrf_policy, limits);

        let signing_key = Arc::new(signing_key);
        let audit = AuditLog::new(audit_store, signing_key.clone());

        info!(key_id = %signing_key.key_id(), stream = %self.stream, "gateway assembled");

        Ok(Gateway::assemble(
            self.config,
            signing_key,
            keys,
            engine,
            manifests,
            approvals,
            counters,
            audit,
            http_connector,
            MockConnector::new(),
            secrets,
            self.stream,
        ))
    }
}

fn load_signing_key(config: &CoreConfig) -> Result<KeyPair, CryptoError> {
    match &config.signing_key_path {
        Some(path) => {
            if config.require_production_keys && !std::path::Path::new(path).exists() {
                // Production refuses to mint its own identity.
                return Err(CryptoError::ProductionKeyRequired);
            }
            KeyPair::load_or_generate(path)
        },
        None if config.require_production_keys => Err(CryptoError::ProductionKeyRequired),
        None => Ok(KeyPair::generate()),
    }
}

fn chrono_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}
