//! Warden Gateway - The assembled policy mediation gateway.
//!
//! This crate wires the core together: configuration, the gateway signing
//! key, the policy engine, the connectors, and the audit chain, behind one
//! [`Gateway`] value with the externally-facing operations:
//!
//! - [`Gateway::evaluate`] - decide without side effects
//! - [`Gateway::execute`] - decide, consume overrides, commit budgets,
//!   run the connector, and append the authoritative interaction record
//! - [`Gateway::create_approval`] / [`Gateway::decide_approval`] - the
//!   human-in-the-loop surface; approval mints the single-use override
//!   token
//! - [`Gateway::verify_audit_chain`] / [`Gateway::export_audit_bundle`] -
//!   the evidence surface
//!
//! Frontends (HTTP handlers, operator consoles) stay thin: every rule
//! lives below this line.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod builder;
mod error;
mod gateway;

pub use builder::GatewayBuilder;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{
    ApprovalDecisionOutcome, ApprovalVerdict, ConnectorFailure, ExecutionOutcome, Gateway,
};
