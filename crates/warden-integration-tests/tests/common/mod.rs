//! Shared fixtures for gateway end-to-end tests.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use warden_config::CoreConfig;
use warden_connector::StaticResolver;
use warden_core::{Action, Context};
use warden_gateway::{Gateway, GatewayBuilder};
use warden_manifest::{Manifest, ManifestStore};

/// A gateway over in-memory stores with a controllable DNS resolver.
pub struct TestGateway {
    pub gateway: Gateway,
    pub resolver: Arc<StaticResolver>,
}

/// A public, non-blocked address for stubbed DNS answers.
pub const PUBLIC_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));

/// An internal address for simulating rebinding.
pub const PRIVATE_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));

/// Build a gateway with the given manifest installed and activated.
pub async fn gateway_with_manifest(manifest_json: serde_json::Value) -> TestGateway {
    gateway_with(CoreConfig::default(), manifest_json).await
}

/// Build a gateway with a custom config and the given manifest active.
pub async fn gateway_with(config: CoreConfig, manifest_json: serde_json::Value) -> TestGateway {
    let resolver = Arc::new(StaticResolver::new());
    let gateway = GatewayBuilder::new(config)
        .resolver(resolver.clone())
        .build()
        .expect("gateway builds");

    let manifest = Manifest::from_json(&manifest_json.to_string()).expect("valid manifest");
    let org = manifest.org_id.clone();
    let uapk = manifest.uapk_id.clone();
    let version = manifest.version.clone();
    gateway
        .manifests()
        .put_draft(manifest)
        .await
        .expect("draft stored");
    gateway
        .manifests()
        .activate(&org, &uapk, &version)
        .await
        .expect("activated");

    TestGateway { gateway, resolver }
}

/// The standard test manifest: a mock `echo` tool and a mock `mock` tool,
/// no policy rules.
pub fn base_manifest() -> serde_json::Value {
    serde_json::json!({
        "version": "1.0.0",
        "uapk_id": "uapk-1",
        "org_id": "org-1",
        "tools": {
            "echo": {"kind": "mock", "config": {}},
            "mock": {"kind": "mock", "config": {}}
        },
        "capabilities_requested": ["read", "send_email", "refund"]
    })
}

/// A context for the standard org/uapk/agent with a fresh request id.
pub fn ctx(request_id: &str) -> Context {
    Context::new("org-1", "uapk-1", "agent-1", request_id)
}

/// Shorthand for a typed action.
pub fn action(action_type: &str, tool: &str) -> Action {
    Action::new(action_type, tool)
}
