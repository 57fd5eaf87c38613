//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_policy::prelude::*;` to import all essential types.

// Errors
pub use crate::{EngineError, EngineResult};

// The engine
pub use crate::{EvaluationOutput, PolicyEngine};
