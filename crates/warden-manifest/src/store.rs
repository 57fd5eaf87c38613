//! Manifest store trait and in-memory implementation.
//!
//! The store owns the ONE-ACTIVE invariant: at most one ACTIVE version per
//! `(org, uapk)`, maintained by an atomic activation swap. Persistent
//! backends enforce the same invariant with a partial unique constraint.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;
use warden_core::{OrgId, UapkId};

use crate::error::{ManifestError, ManifestResult};
use crate::manifest::{Manifest, ManifestStatus};

/// Storage seam for manifest documents.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Fetch the single ACTIVE manifest for `(org, uapk)`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get_active(&self, org_id: &OrgId, uapk_id: &UapkId)
    -> ManifestResult<Option<Manifest>>;

    /// Fetch a specific version.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get_version(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        version: &str,
    ) -> ManifestResult<Option<Manifest>>;

    /// Insert a new DRAFT version. The document must already be validated.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DuplicateVersion`] if the version exists.
    async fn put_draft(&self, manifest: Manifest) -> ManifestResult<()>;

    /// Activate a version, atomically demoting any previously ACTIVE one
    /// to SUSPENDED. Returns the newly active manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::VersionNotFound`] for unknown versions or
    /// [`ManifestError::InvalidTransition`] when activating a REVOKED one.
    async fn activate(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        version: &str,
    ) -> ManifestResult<Manifest>;

    /// Suspend a version.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::VersionNotFound`] for unknown versions.
    async fn suspend(&self, org_id: &OrgId, uapk_id: &UapkId, version: &str)
    -> ManifestResult<()>;

    /// Revoke a version permanently.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::VersionNotFound`] for unknown versions.
    async fn revoke(&self, org_id: &OrgId, uapk_id: &UapkId, version: &str) -> ManifestResult<()>;

    /// List all versions for `(org, uapk)`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn list_versions(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
    ) -> ManifestResult<Vec<Manifest>>;
}

type Key = (OrgId, UapkId);

/// In-memory manifest store (tests and single-process deployments).
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    inner: RwLock<HashMap<Key, Vec<Manifest>>>,
}

impl MemoryManifestStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_versions<T>(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        f: impl FnOnce(Option<&Vec<Manifest>>) -> T,
    ) -> ManifestResult<T> {
        let map = self
            .inner
            .read()
            .map_err(|_| ManifestError::Store("lock poisoned".to_string()))?;
        Ok(f(map.get(&(org_id.clone(), uapk_id.clone()))))
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn get_active(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
    ) -> ManifestResult<Option<Manifest>> {
        self.with_versions(org_id, uapk_id, |versions| {
            versions.and_then(|v| {
                v.iter()
                    .find(|m| m.status == ManifestStatus::Active)
                    .cloned()
            })
        })
    }

    async fn get_version(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        version: &str,
    ) -> ManifestResult<Option<Manifest>> {
        self.with_versions(org_id, uapk_id, |versions| {
            versions.and_then(|v| v.iter().find(|m| m.version == version).cloned())
        })
    }

    async fn put_draft(&self, manifest: Manifest) -> ManifestResult<()> {
        manifest.validate()?;

        let mut map = self
            .inner
            .write()
            .map_err(|_| ManifestError::Store("lock poisoned".to_string()))?;
        let key = (manifest.org_id.clone(), manifest.uapk_id.clone());
        let versions = map.entry(key).or_default();

        if versions.iter().any(|m| m.version == manifest.version) {
            return Err(ManifestError::DuplicateVersion {
                org_id: manifest.org_id.to_string(),
                uapk_id: manifest.uapk_id.to_string(),
                version: manifest.version,
            });
        }

        let mut manifest = manifest;
        manifest.status = ManifestStatus::Draft;
        versions.push(manifest);
        Ok(())
    }

    async fn activate(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        version: &str,
    ) -> ManifestResult<Manifest> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| ManifestError::Store("lock poisoned".to_string()))?;
        let versions = map
            .get_mut(&(org_id.clone(), uapk_id.clone()))
            .ok_or_else(|| not_found(org_id, uapk_id, version))?;

        let target_idx = versions
            .iter()
            .position(|m| m.version == version)
            .ok_or_else(|| not_found(org_id, uapk_id, version))?;

        if versions[target_idx].status == ManifestStatus::Revoked {
            return Err(ManifestError::InvalidTransition {
                version: version.to_string(),
                message: "cannot activate a revoked manifest".to_string(),
            });
        }

        // Demote-then-promote inside one write lock: the swap is atomic to
        // every reader.
        for m in versions.iter_mut() {
            if m.status == ManifestStatus::Active {
                m.status = ManifestStatus::Suspended;
            }
        }
        versions[target_idx].status = ManifestStatus::Active;

        info!(org_id = %org_id, uapk_id = %uapk_id, version, "manifest activated");
        Ok(versions[target_idx].clone())
    }

    async fn suspend(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        version: &str,
    ) -> ManifestResult<()> {
        self.set_status(org_id, uapk_id, version, ManifestStatus::Suspended)
    }

    async fn revoke(&self, org_id: &OrgId, uapk_id: &UapkId, version: &str) -> ManifestResult<()> {
        self.set_status(org_id, uapk_id, version, ManifestStatus::Revoked)
    }

    async fn list_versions(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
    ) -> ManifestResult<Vec<Manifest>> {
        self.with_versions(org_id, uapk_id, |versions| {
            versions.cloned().unwrap_or_default()
        })
    }
}

impl MemoryManifestStore {
    fn set_status(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        version: &str,
        status: ManifestStatus,
    ) -> ManifestResult<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| ManifestError::Store("lock poisoned".to_string()))?;
        let manifest = map
            .get_mut(&(org_id.clone(), uapk_id.clone()))
            .and_then(|versions| versions.iter_mut().find(|m| m.version == version))
            .ok_or_else(|| not_found(org_id, uapk_id, version))?;

        manifest.status = status;
        Ok(())
    }
}

fn not_found(org_id: &OrgId, uapk_id: &UapkId, version: &str) -> ManifestError {
    ManifestError::VersionNotFound {
        org_id: org_id.to_string(),
        uapk_id: uapk_id.to_string(),
        version: version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(version: &str) -> Manifest {
        Manifest::from_json(
            &serde_json::json!({
                "version": version,
                "uapk_id": "uapk-1",
                "org_id": "org-1",
                "tools": {"echo": {"kind": "mock", "config": {}}},
                "capabilities_requested": ["read"]
            })
            .to_string(),
        )
        .expect("valid manifest")
    }

    fn ids() -> (OrgId, UapkId) {
        (OrgId::new("org-1"), UapkId::new("uapk-1"))
    }

    #[tokio::test]
    async fn test_draft_then_activate() {
        let store = MemoryManifestStore::new();
        let (org, uapk) = ids();

        store.put_draft(manifest("1.0.0")).await.unwrap();
        assert!(store.get_active(&org, &uapk).await.unwrap().is_none());

        store.activate(&org, &uapk, "1.0.0").await.unwrap();
        let active = store.get_active(&org, &uapk).await.unwrap().unwrap();
        assert_eq!(active.version, "1.0.0");
    }

    #[tokio::test]
    async fn test_one_active_invariant() {
        let store = MemoryManifestStore::new();
        let (org, uapk) = ids();

        store.put_draft(manifest("1.0.0")).await.unwrap();
        store.put_draft(manifest("1.1.0")).await.unwrap();

        store.activate(&org, &uapk, "1.0.0").await.unwrap();
        store.activate(&org, &uapk, "1.1.0").await.unwrap();

        let versions = store.list_versions(&org, &uapk).await.unwrap();
        let active_count = versions
            .iter()
            .filter(|m| m.status == ManifestStatus::Active)
            .count();
        assert_eq!(active_count, 1);

        let active = store.get_active(&org, &uapk).await.unwrap().unwrap();
        assert_eq!(active.version, "1.1.0");
    }

    #[tokio::test]
    async fn test_duplicate_version_rejected() {
        let store = MemoryManifestStore::new();

        store.put_draft(manifest("1.0.0")).await.unwrap();
        let result = store.put_draft(manifest("1.0.0")).await;
        assert!(matches!(result, Err(ManifestError::DuplicateVersion { .. })));
    }

    #[tokio::test]
    async fn test_revoked_cannot_activate() {
        let store = MemoryManifestStore::new();
        let (org, uapk) = ids();

        store.put_draft(manifest("1.0.0")).await.unwrap();
        store.revoke(&org, &uapk, "1.0.0").await.unwrap();

        let result = store.activate(&org, &uapk, "1.0.0").await;
        assert!(matches!(result, Err(ManifestError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_suspend_clears_active() {
        let store = MemoryManifestStore::new();
        let (org, uapk) = ids();

        store.put_draft(manifest("1.0.0")).await.unwrap();
        store.activate(&org, &uapk, "1.0.0").await.unwrap();
        store.suspend(&org, &uapk, "1.0.0").await.unwrap();

        assert!(store.get_active(&org, &uapk).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_version() {
        let store = MemoryManifestStore::new();
        let (org, uapk) = ids();

        let result = store.activate(&org, &uapk, "9.9.9").await;
        assert!(matches!(result, Err(ManifestError::VersionNotFound { .. })));
    }
}
