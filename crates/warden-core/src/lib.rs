//! Warden Core - Foundation types for the policy mediation gateway.
//!
//! This crate provides:
//! - Typed identifiers used across the workspace
//! - The `Action` / `Context` request model
//! - The three-valued `Decision` with structured reasons and policy trace
//! - Canonical JSON serialization for hashing and signing
//!
//! Everything here is pure data: no I/O, no stores, no clocks. The policy
//! engine, audit log, and connectors all build on these shapes.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod action;
pub mod canonical;
pub mod decision;
pub mod error;
pub mod ids;

pub use action::{Action, Context, Counterparty};
pub use decision::{
    BudgetUsage, CheckResult, Decision, Outcome, Reason, ReasonCode, RiskSnapshot, TraceEntry,
};
pub use error::{CoreError, CoreResult};
pub use ids::{AgentId, ApprovalId, OrgId, RecordId, RequestId, StreamId, UapkId};
