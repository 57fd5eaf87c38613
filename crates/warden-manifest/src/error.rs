//! Manifest error types.

use thiserror::Error;

/// Errors that can occur while loading, validating, or storing manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A field failed validation.
    #[error("invalid manifest field {field}: {message}")]
    Validation {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// No manifest version matched the lookup.
    #[error("manifest not found: org={org_id} uapk={uapk_id} version={version}")]
    VersionNotFound {
        /// Organization id.
        org_id: String,
        /// Policy key id.
        uapk_id: String,
        /// Requested version.
        version: String,
    },

    /// A version with this identity already exists.
    #[error("manifest version already exists: org={org_id} uapk={uapk_id} version={version}")]
    DuplicateVersion {
        /// Organization id.
        org_id: String,
        /// Policy key id.
        uapk_id: String,
        /// Conflicting version.
        version: String,
    },

    /// A lifecycle transition was not permitted.
    #[error("invalid status transition for version {version}: {message}")]
    InvalidTransition {
        /// The version the transition targeted.
        version: String,
        /// Why it was refused.
        message: String,
    },

    /// The manifest document could not be parsed.
    #[error("manifest parse error: {0}")]
    Parse(String),

    /// The backing store failed.
    #[error("manifest store error: {0}")]
    Store(String),
}

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;
