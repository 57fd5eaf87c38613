//! The approval record and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use warden_core::{AgentId, ApprovalId, OrgId, UapkId};
use warden_crypto::ContentHash;

/// Lifecycle status of an approval.
///
/// `Pending` is the only non-terminal state. `Approved` has one further
/// transition: to `Consumed`, when the override token minted for it is
/// used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    /// Awaiting a human decision.
    Pending,
    /// Approved; an override token has been issued and not yet used.
    Approved,
    /// Denied by a human.
    Denied,
    /// Expired before a decision was made.
    Expired,
    /// The override token was used; the approval is spent.
    Consumed,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Denied => write!(f, "DENIED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Consumed => write!(f, "CONSUMED"),
        }
    }
}

/// A human-in-the-loop approval for one escalated action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    /// Unique approval id.
    pub id: ApprovalId,
    /// Organization the escalated action belongs to.
    pub org_id: OrgId,
    /// Policy key the action was evaluated under.
    pub uapk_id: UapkId,
    /// Agent that proposed the action.
    pub agent_id: AgentId,
    /// Fingerprint binding this approval to one specific action shape.
    pub action_fingerprint: ContentHash,
    /// Snapshot of the action's params at escalation time, for the
    /// approver's benefit.
    pub params_snapshot: serde_json::Value,
    /// Current lifecycle status.
    pub status: ApprovalStatus,
    /// Why the action escalated (reason codes, human note).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the approval was created.
    pub created_at: DateTime<Utc>,
    /// When an undecided approval expires.
    pub expires_at: DateTime<Utc>,
    /// Who decided it, once decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    /// When it was decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// SHA-256 of the override token issued on approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_token_hash: Option<ContentHash>,
    /// When the override token was consumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Approval {
    /// Check whether the approval is still awaiting a decision at `now`.
    #[must_use]
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && now < self.expires_at
    }
}

/// The fields needed to open a new pending approval.
#[derive(Debug, Clone)]
pub struct NewApproval {
    /// Organization the escalated action belongs to.
    pub org_id: OrgId,
    /// Policy key the action was evaluated under.
    pub uapk_id: UapkId,
    /// Agent that proposed the action.
    pub agent_id: AgentId,
    /// Fingerprint of the escalated action.
    pub action_fingerprint: ContentHash,
    /// Snapshot of the action's params.
    pub params_snapshot: serde_json::Value,
    /// Why the action escalated.
    pub reason: Option<String>,
}

/// Outcome of an attempt to consume an override token.
///
/// These are values, not errors: every variant is a legitimate race result
/// that the executor maps to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// This caller won; the approval is now CONSUMED.
    Consumed,
    /// Another caller already consumed the token.
    AlreadyConsumed,
    /// The approval is not in APPROVED status.
    NotApproved,
    /// The presented token's hash does not match the issued one.
    TokenMismatch,
}

impl ConsumeOutcome {
    /// Check whether consumption succeeded.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed)
    }
}
