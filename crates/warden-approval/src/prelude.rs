//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_approval::prelude::*;` to import all essential types.

// Errors
pub use crate::{ApprovalError, ApprovalResult};

// Approval lifecycle
pub use crate::{Approval, ApprovalStatus, ConsumeOutcome, NewApproval};

// Stores
pub use crate::{ApprovalStore, MemoryApprovalStore};

// Counters
pub use crate::{
    BudgetBreach, CounterProbe, CounterStore, MemoryCounterStore, WindowKind, window_start,
};
