//! Evidence properties: tamper detection on the persisted chain and
//! deterministic, verifiable bundle exports.

mod common;

use common::{action, base_manifest, ctx, gateway_with_manifest};
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use warden_audit::{AuditEvent, AuditLog, ExportFilter, JsonlAuditStore};
use warden_core::{Outcome, StreamId};
use warden_crypto::{KeyPair, KeyRing};

fn event(action: &str) -> AuditEvent {
    let mut event =
        AuditEvent::minimal("org-1", "uapk-1", "agent-1", action, "echo", Outcome::Allow);
    event.request = serde_json::json!({"params": {"target": action}});
    event
}

#[tokio::test]
async fn tampered_jsonl_fails_verification_at_the_flipped_record() {
    let dir = tempfile::tempdir().unwrap();
    let key = KeyPair::generate();
    let ring = KeyRing::single(key.export_public_key());
    let stream = StreamId::default();

    {
        let store = Arc::new(JsonlAuditStore::open(dir.path()).unwrap());
        let log = AuditLog::new(store, Arc::new(key));
        for i in 0..3 {
            log.append(&stream, event(&format!("step-{i}"))).await.unwrap();
        }
    }

    // Flip one byte inside the second line's payload.
    let path = dir.path().join("main.jsonl");
    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = text.lines().map(String::from).collect();
    assert_eq!(lines.len(), 3);
    lines[1] = lines[1].replace("step-1", "step-X");
    std::fs::write(&path, format!("{}\n", lines.join("\n"))).unwrap();

    // Reopen and verify: the chain must break exactly at index 1.
    let reopened = Arc::new(JsonlAuditStore::open(dir.path()).unwrap());
    let log = AuditLog::new(reopened, Arc::new(KeyPair::generate()));
    let report = log.verify_chain(&stream, &ring).await.unwrap();

    assert!(!report.ok);
    assert_eq!(report.verified_count, 1);
    assert_eq!(report.first_failure.map(|f| f.index), Some(1));
}

#[tokio::test]
async fn export_is_deterministic_and_self_verifying() {
    let t = gateway_with_manifest(base_manifest()).await;
    for i in 0..3 {
        t.gateway
            .execute(&ctx(&format!("req-{i}")), &action("read", "echo"))
            .await
            .unwrap();
    }

    let filter = ExportFilter::stream(StreamId::default());
    let first = t.gateway.export_audit_bundle(&filter).await.unwrap();
    let second = t.gateway.export_audit_bundle(&filter).await.unwrap();
    assert_eq!(first, second, "same filter, byte-identical archives");

    // The bundle verifies on its own: manifest hashes match entries and
    // the signature checks against the published keys.
    let entries = read_entries(&first);
    let manifest_bytes = &entries["bundle_manifest.json"];
    let manifest: serde_json::Value = serde_json::from_slice(manifest_bytes).unwrap();

    for name in [
        "records.jsonl",
        "verification_report.json",
        "manifest_snapshot.json",
        "gateway_public_keys.json",
    ] {
        let expected = manifest["files"][name].as_str().unwrap();
        let actual = warden_crypto::ContentHash::hash(&entries[name]).to_hex();
        assert_eq!(expected, actual, "hash mismatch for {name}");
    }

    let keys: Vec<String> =
        serde_json::from_slice(&entries["gateway_public_keys.json"]).unwrap();
    let ring = KeyRing::from(
        keys.iter()
            .map(|hex| warden_crypto::PublicKey::from_hex(hex).unwrap())
            .collect::<Vec<_>>(),
    );
    let signature_hex = String::from_utf8(entries["bundle_signature.txt"].clone()).unwrap();
    let signature = warden_crypto::Signature::from_hex(&signature_hex).unwrap();
    assert!(ring.verify(manifest_bytes, &signature).is_ok());

    let report: serde_json::Value =
        serde_json::from_slice(&entries["verification_report.json"]).unwrap();
    assert_eq!(report["ok"], true);
    assert_eq!(report["verified_count"], 3);
}

#[tokio::test]
async fn jsonl_chain_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let key = KeyPair::generate();
    let public = key.export_public_key();
    let stream = StreamId::default();

    {
        let store = Arc::new(JsonlAuditStore::open(dir.path()).unwrap());
        let log = AuditLog::new(store, Arc::new(key));
        log.append(&stream, event("before-restart")).await.unwrap();
    }

    // A new process (new key owner) appends to the same file; the chain
    // stays contiguous and both keys verify their own records.
    let second_key = KeyPair::generate();
    let second_public = second_key.export_public_key();
    let store = Arc::new(JsonlAuditStore::open(dir.path()).unwrap());
    let log = AuditLog::new(store, Arc::new(second_key));
    log.append(&stream, event("after-restart")).await.unwrap();

    let mut ring = KeyRing::single(public);
    ring.rotate_in(second_public);
    let report = log.verify_chain(&stream, &ring).await.unwrap();
    assert!(report.ok);
    assert_eq!(report.verified_count, 2);
}

fn read_entries(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut out = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        out.insert(name, data);
    }
    out
}
