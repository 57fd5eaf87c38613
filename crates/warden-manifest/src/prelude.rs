//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_manifest::prelude::*;` to import all essential types.

// Errors
pub use crate::{ManifestError, ManifestResult};

// Document model
pub use crate::{
    AllowedHours, ApprovalThreshold, AuthRef, Budget, Constraints, HttpToolConfig, Manifest,
    ManifestStatus, MockToolConfig, PolicyRules, ToolSpec,
};

// Patterns
pub use crate::{HostPattern, host_suffix_matches};

// Store
pub use crate::{ManifestStore, MemoryManifestStore};
