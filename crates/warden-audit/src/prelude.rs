//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Records
pub use crate::{AuditEvent, InteractionRecord};

// Log and verification
pub use crate::{AuditLog, ChainFailure, ChainVerificationReport};

// Stores
pub use crate::{AuditStore, JsonlAuditStore, MemoryAuditStore};

// Export
pub use crate::{ExportFilter, export_bundle};
