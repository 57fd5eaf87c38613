//! Approval and counter error types.

use thiserror::Error;

/// Errors from the approval and counter stores.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// No approval with this id exists.
    #[error("approval not found: {approval_id}")]
    NotFound {
        /// The missing approval id.
        approval_id: String,
    },

    /// A lifecycle transition was not permitted.
    #[error("invalid approval transition for {approval_id}: {message}")]
    InvalidTransition {
        /// The approval the transition targeted.
        approval_id: String,
        /// Why it was refused.
        message: String,
    },

    /// The backing store failed.
    #[error("approval store error: {0}")]
    Store(String),
}

/// Result type for approval and counter operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
