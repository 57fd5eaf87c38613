//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Identifiers
pub use crate::{AgentId, ApprovalId, OrgId, RecordId, RequestId, StreamId, UapkId};

// Request model
pub use crate::{Action, Context, Counterparty};

// Decision model
pub use crate::{
    BudgetUsage, CheckResult, Decision, Outcome, Reason, ReasonCode, RiskSnapshot, TraceEntry,
};

// Canonical JSON
pub use crate::canonical::{canonical_bytes, canonical_hash, canonical_string};
