//! Warden Policy - The decision engine.
//!
//! `PolicyEngine::evaluate` turns `(Context, Action)` into a `Decision` by
//! running a fixed pipeline of checks against the active manifest, the
//! presented tokens, and the live counters. The rules of engagement:
//!
//! - **First failure wins for DENY.** The pipeline stops at the first
//!   check that denies; its reason leads the decision.
//! - **Escalations are candidates.** Amount thresholds, approval
//!   thresholds, and `require_human_approval` mark the action for human
//!   review; they only become the outcome if nothing denied first.
//! - **A valid override token short-circuits escalations**, never denials.
//!   The engine recognizes the token; consuming it is the executor's job,
//!   so at-most-once semantics live in one place.
//! - **Reads only.** Budget checks peek. The single write the engine may
//!   perform is opening the (idempotent) approval behind an ESCALATE.
//!
//! Policy outcomes are values in the `Decision`; the error channel carries
//! only infrastructure faults and deadline expiry.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod engine;
mod error;

pub use engine::{EvaluationOutput, PolicyEngine};
pub use error::{EngineError, EngineResult};
