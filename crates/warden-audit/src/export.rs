//! Evidence bundle export.
//!
//! A bundle is a deterministic tar+gzip archive:
//!
//! - `records.jsonl` - the selected records, in chain order
//! - `verification_report.json` - result of verifying the full stream
//! - `manifest_snapshot.json` - the active manifest at export time
//! - `gateway_public_keys.json` - every historical verification key
//! - `bundle_manifest.json` - names and SHA-256 of each entry above
//! - `bundle_signature.txt` - Ed25519 over the canonical bundle manifest
//!
//! Determinism matters: the same filter over the same log must produce
//! byte-identical archives, so entry order is fixed and all tar metadata
//! (mtime, uid, mode) is pinned.

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use warden_core::{OrgId, StreamId, UapkId, canonical};
use warden_crypto::{ContentHash, KeyPair, KeyRing};

use crate::error::{AuditError, AuditResult};
use crate::log::verify_records;
use crate::record::InteractionRecord;
use crate::store::AuditStore;

/// Which records to include in a bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportFilter {
    /// The stream to export.
    #[serde(default)]
    pub stream: StreamId,
    /// Restrict to one organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    /// Restrict to one policy key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uapk_id: Option<UapkId>,
    /// Include records at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    /// Include records before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

impl ExportFilter {
    /// Export a whole stream.
    #[must_use]
    pub fn stream(stream: StreamId) -> Self {
        Self {
            stream,
            ..Self::default()
        }
    }

    fn selects(&self, record: &InteractionRecord) -> bool {
        if let Some(org_id) = &self.org_id {
            if record.org_id != *org_id {
                return false;
            }
        }
        if let Some(uapk_id) = &self.uapk_id {
            if record.uapk_id != *uapk_id {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.timestamp >= to {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Serialize)]
struct BundleManifest<'a> {
    format: &'static str,
    filter: &'a ExportFilter,
    record_count: usize,
    files: BTreeMap<&'static str, String>,
}

/// Export an evidence bundle for the records selected by `filter`.
///
/// The verification report always covers the full stream: a filtered
/// subset is an extract of evidence, not a chain of its own.
///
/// # Errors
///
/// Returns [`AuditError::Bundle`] on archive assembly failures, or any
/// store/serialization error.
pub async fn export_bundle(
    store: &dyn AuditStore,
    keys: &KeyRing,
    signing_key: &KeyPair,
    filter: &ExportFilter,
    manifest_snapshot: &serde_json::Value,
) -> AuditResult<Vec<u8>> {
    let records = store.read_all(&filter.stream).await?;
    let report = verify_records(&records, keys);

    let mut records_jsonl = String::new();
    let mut selected = 0usize;
    for record in records.iter().filter(|r| filter.selects(r)) {
        records_jsonl.push_str(&record.to_canonical_line()?);
        records_jsonl.push('\n');
        selected = selected.saturating_add(1);
    }

    let report_json = canonical::canonical_string(&report)?;
    let snapshot_json = canonical::canonical_string(manifest_snapshot)?;
    let keys_json = canonical::canonical_string(
        &keys
            .keys()
            .iter()
            .map(warden_crypto::PublicKey::to_hex)
            .collect::<Vec<_>>(),
    )?;

    let mut files: BTreeMap<&'static str, String> = BTreeMap::new();
    files.insert(
        "records.jsonl",
        ContentHash::hash(records_jsonl.as_bytes()).to_hex(),
    );
    files.insert(
        "verification_report.json",
        ContentHash::hash(report_json.as_bytes()).to_hex(),
    );
    files.insert(
        "manifest_snapshot.json",
        ContentHash::hash(snapshot_json.as_bytes()).to_hex(),
    );
    files.insert(
        "gateway_public_keys.json",
        ContentHash::hash(keys_json.as_bytes()).to_hex(),
    );

    let bundle_manifest = BundleManifest {
        format: "warden-evidence-bundle/1",
        filter,
        record_count: selected,
        files,
    };
    let manifest_json = canonical::canonical_string(&bundle_manifest)?;
    let signature_hex = signing_key.sign(manifest_json.as_bytes()).to_hex();

    let entries: [(&str, &[u8]); 6] = [
        ("records.jsonl", records_jsonl.as_bytes()),
        ("verification_report.json", report_json.as_bytes()),
        ("manifest_snapshot.json", snapshot_json.as_bytes()),
        ("gateway_public_keys.json", keys_json.as_bytes()),
        ("bundle_manifest.json", manifest_json.as_bytes()),
        ("bundle_signature.txt", signature_hex.as_bytes()),
    ];

    let bytes = write_archive(&entries)?;

    info!(
        stream = %filter.stream,
        records = selected,
        bytes = bytes.len(),
        "evidence bundle exported"
    );
    Ok(bytes)
}

/// Write entries into a tar+gzip archive with pinned metadata.
fn write_archive(entries: &[(&str, &[u8])]) -> AuditResult<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        builder
            .append_data(&mut header, name, *data)
            .map_err(|e| AuditError::Bundle(e.to_string()))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| AuditError::Bundle(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| AuditError::Bundle(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::AuditLog;
    use crate::record::AuditEvent;
    use crate::store::MemoryAuditStore;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::Arc;
    use warden_core::Outcome;

    async fn setup() -> (AuditLog, KeyRing, KeyPair, Arc<MemoryAuditStore>) {
        let key = KeyPair::generate();
        let signing = KeyPair::from_secret_key(&key.secret_key_bytes()).unwrap();
        let ring = KeyRing::single(key.export_public_key());
        let store = Arc::new(MemoryAuditStore::new());
        let log = AuditLog::new(store.clone(), Arc::new(key));

        let stream = StreamId::default();
        for i in 0..3 {
            let mut event = AuditEvent::minimal(
                "org-1",
                "uapk-1",
                "agent-1",
                format!("action-{i}"),
                "echo",
                Outcome::Allow,
            );
            event.timestamp = Utc.with_ymd_and_hms(2025, 6, 1, 12, i, 0).unwrap();
            log.append(&stream, event).await.unwrap();
        }

        (log, ring, signing, store)
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

    #[tokio::test]
    async fn test_bundle_layout() {
        let (_log, ring, signing, store) = setup().await;
        let filter = ExportFilter::stream(StreamId::default());

        let bytes = export_bundle(store.as_ref(), &ring, &signing, &filter, &serde_json::json!({}))
            .await
            .unwrap();
        let entries = read_entries(&bytes);

        for name in [
            "records.jsonl",
            "verification_report.json",
            "manifest_snapshot.json",
            "gateway_public_keys.json",
            "bundle_manifest.json",
            "bundle_signature.txt",
        ] {
            assert!(entries.contains_key(name), "missing {name}");
        }

        let jsonl = String::from_utf8(entries["records.jsonl"].clone()).unwrap();
        assert_eq!(jsonl.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_bundle_deterministic() {
        let (_log, ring, signing, store) = setup().await;
        let filter = ExportFilter::stream(StreamId::default());
        let snapshot = serde_json::json!({"version": "1.0.0"});

        let a = export_bundle(store.as_ref(), &ring, &signing, &filter, &snapshot)
            .await
            .unwrap();
        let b = export_bundle(store.as_ref(), &ring, &signing, &filter, &snapshot)
            .await
            .unwrap();

        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_bundle_signature_verifies() {
        let (_log, ring, signing, store) = setup().await;
        let filter = ExportFilter::stream(StreamId::default());

        let bytes = export_bundle(store.as_ref(), &ring, &signing, &filter, &serde_json::json!({}))
            .await
            .unwrap();
        let entries = read_entries(&bytes);

        let manifest = &entries["bundle_manifest.json"];
        let signature_hex = String::from_utf8(entries["bundle_signature.txt"].clone()).unwrap();
        let signature = warden_crypto::Signature::from_hex(&signature_hex).unwrap();

        assert!(ring.verify(manifest, &signature).is_ok());

        // And the manifest's file hashes match the entries.
        let parsed: serde_json::Value = serde_json::from_slice(manifest).unwrap();
        let expected = ContentHash::hash(&entries["records.jsonl"]).to_hex();
        assert_eq!(parsed["files"]["records.jsonl"], expected);
    }

    #[tokio::test]
    async fn test_filter_by_time() {
        let (_log, ring, signing, store) = setup().await;
        let mut filter = ExportFilter::stream(StreamId::default());
        filter.from = Some(Utc.with_ymd_and_hms(2025, 6, 1, 12, 1, 0).unwrap());

        let bytes = export_bundle(store.as_ref(), &ring, &signing, &filter, &serde_json::json!({}))
            .await
            .unwrap();
        let entries = read_entries(&bytes);

        let jsonl = String::from_utf8(entries["records.jsonl"].clone()).unwrap();
        assert_eq!(jsonl.lines().count(), 2);

        // Verification still covers the full stream.
        let report: serde_json::Value =
            serde_json::from_slice(&entries["verification_report.json"]).unwrap();
        assert_eq!(report["verified_count"], 3);
    }
}
