//! Manifest lifecycle: the ONE-ACTIVE invariant under concurrent
//! activations, and how lifecycle states surface in decisions.

mod common;

use common::{action, base_manifest, ctx, gateway_with_manifest};
use std::sync::Arc;
use warden_core::{Outcome, ReasonCode};
use warden_manifest::{Manifest, ManifestStatus, ManifestStore, MemoryManifestStore};

fn manifest_version(version: &str) -> Manifest {
    let mut json = base_manifest();
    json["version"] = serde_json::json!(version);
    Manifest::from_json(&json.to_string()).expect("valid manifest")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activations_leave_one_active() {
    let store = Arc::new(MemoryManifestStore::new());
    let org = warden_core::OrgId::new("org-1");
    let uapk = warden_core::UapkId::new("uapk-1");

    let versions: Vec<String> = (0..8).map(|i| format!("1.{i}.0")).collect();
    for version in &versions {
        store.put_draft(manifest_version(version)).await.unwrap();
    }

    let mut handles = Vec::new();
    for version in versions {
        let store = Arc::clone(&store);
        let org = org.clone();
        let uapk = uapk.clone();
        handles.push(tokio::spawn(async move {
            store.activate(&org, &uapk, &version).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let active: Vec<_> = store
        .list_versions(&org, &uapk)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.status == ManifestStatus::Active)
        .collect();
    assert_eq!(active.len(), 1, "exactly one ACTIVE after the dust settles");
}

#[tokio::test]
async fn suspended_manifest_denies_as_inactive() {
    let t = gateway_with_manifest(base_manifest()).await;

    // Works while active.
    let outcome = t
        .gateway
        .execute(&ctx("req-1"), &action("read", "echo"))
        .await
        .unwrap();
    assert_eq!(outcome.decision.outcome, Outcome::Allow);

    // Suspend, and the same request is refused as inactive (not missing).
    let org = warden_core::OrgId::new("org-1");
    let uapk = warden_core::UapkId::new("uapk-1");
    t.gateway
        .manifests()
        .suspend(&org, &uapk, "1.0.0")
        .await
        .unwrap();

    let outcome = t
        .gateway
        .execute(&ctx("req-2"), &action("read", "echo"))
        .await
        .unwrap();
    assert_eq!(outcome.decision.outcome, Outcome::Deny);
    assert!(outcome.decision.has_reason(ReasonCode::ManifestInactive));
}

#[tokio::test]
async fn activation_switches_enforced_rules() {
    let t = gateway_with_manifest(base_manifest()).await;
    let org = warden_core::OrgId::new("org-1");
    let uapk = warden_core::UapkId::new("uapk-1");

    // v2 adds a deny list for the echo tool.
    let mut v2 = base_manifest();
    v2["version"] = serde_json::json!("2.0.0");
    v2["policy"] = serde_json::json!({"tool_deny": ["echo"]});
    t.gateway
        .manifests()
        .put_draft(Manifest::from_json(&v2.to_string()).unwrap())
        .await
        .unwrap();

    let before = t
        .gateway
        .execute(&ctx("req-1"), &action("read", "echo"))
        .await
        .unwrap();
    assert_eq!(before.decision.outcome, Outcome::Allow);

    t.gateway
        .manifests()
        .activate(&org, &uapk, "2.0.0")
        .await
        .unwrap();

    let after = t
        .gateway
        .execute(&ctx("req-2"), &action("read", "echo"))
        .await
        .unwrap();
    assert_eq!(after.decision.outcome, Outcome::Deny);
    assert!(after.decision.has_reason(ReasonCode::ToolDenied));
}
