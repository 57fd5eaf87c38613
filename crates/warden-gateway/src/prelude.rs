//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_gateway::prelude::*;` to import all essential types.

// Errors
pub use crate::{GatewayError, GatewayResult};

// The gateway
pub use crate::{
    ApprovalDecisionOutcome, ApprovalVerdict, ExecutionOutcome, Gateway, GatewayBuilder,
};

// Frequently used re-exports from the core crates
pub use warden_config::CoreConfig;
pub use warden_core::{Action, Context, Counterparty, Decision, Outcome, ReasonCode};
