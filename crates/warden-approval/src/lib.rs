//! Warden Approval - Human-in-the-loop approvals and budget counters.
//!
//! This crate holds the mutable policy state the engine consults and the
//! executor updates:
//!
//! - **Approvals**: created PENDING when an action escalates, decided by a
//!   human, and - if approved - consumed exactly once by the override token
//!   minted for them. Consumption is a conditional update, so concurrent
//!   uses of the same token race safely: one wins, the rest are refused.
//! - **Counters**: per `(org, uapk, action_type, window)` sliding counts
//!   backing budget enforcement. Reads are peek-only; increments are atomic
//!   check-and-increment with rollback, so a fleet of concurrent executes
//!   can never overshoot a cap.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod approval;
mod counters;
mod error;
mod store;

pub use approval::{Approval, ApprovalStatus, ConsumeOutcome, NewApproval};
pub use counters::{
    BudgetBreach, CounterProbe, CounterStore, MemoryCounterStore, WindowKind, window_start,
};
pub use error::{ApprovalError, ApprovalResult};
pub use store::{ApprovalStore, MemoryApprovalStore};
