//! Warden Manifest - Declarative per-agent policy documents.
//!
//! A manifest is the policy contract for one `(org, uapk)` pair: which
//! tools exist, what the agent claims it needs, and the rules the policy
//! engine enforces (budgets, allow/deny lists, amount caps, jurisdictions,
//! approval thresholds). Manifests are immutable versioned documents;
//! activation is an atomic swap that keeps at most one ACTIVE version per
//! `(org, uapk)`.
//!
//! Documents are validated once at load time; the engine only ever sees
//! validated values.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod manifest;
mod pattern;
mod store;

pub use error::{ManifestError, ManifestResult};
pub use manifest::{
    AllowedHours, ApprovalThreshold, AuthRef, Budget, Constraints, HttpToolConfig, Manifest,
    ManifestStatus, MockToolConfig, PolicyRules, ToolSpec,
};
pub use pattern::{HostPattern, host_suffix_matches};
pub use store::{ManifestStore, MemoryManifestStore};
