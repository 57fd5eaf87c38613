//! Approval store trait and in-memory implementation.
//!
//! Two operations carry the concurrency weight:
//!
//! - `upsert_pending` is idempotent on `(org, uapk, fingerprint)`: repeated
//!   escalations of the same action reuse the open approval instead of
//!   spamming the operator queue.
//! - `consume_override` is a conditional update (`status == APPROVED`,
//!   hash matches, not yet consumed). Exactly one concurrent caller
//!   observes [`ConsumeOutcome::Consumed`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use warden_core::ApprovalId;
use warden_crypto::ContentHash;

use crate::approval::{Approval, ApprovalStatus, ConsumeOutcome, NewApproval};
use crate::error::{ApprovalError, ApprovalResult};

/// Storage seam for approvals.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Open a pending approval, or return the existing open one for the
    /// same `(org, uapk, fingerprint)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn upsert_pending(
        &self,
        new: NewApproval,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ApprovalResult<Approval>;

    /// Fetch an approval by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get(&self, id: &ApprovalId) -> ApprovalResult<Option<Approval>>;

    /// Transition PENDING → APPROVED and record the override token hash.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::InvalidTransition`] if the approval is not
    /// pending (or already expired at `now`).
    async fn approve(
        &self,
        id: &ApprovalId,
        decided_by: &str,
        token_hash: ContentHash,
        now: DateTime<Utc>,
    ) -> ApprovalResult<Approval>;

    /// Transition PENDING → DENIED.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::InvalidTransition`] if the approval is not
    /// pending.
    async fn deny(
        &self,
        id: &ApprovalId,
        decided_by: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ApprovalResult<Approval>;

    /// Atomically consume the override token: APPROVED → CONSUMED iff the
    /// stored hash matches and the approval is unconsumed.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend faults; race outcomes are values.
    async fn consume_override(
        &self,
        id: &ApprovalId,
        token_hash: &ContentHash,
        now: DateTime<Utc>,
    ) -> ApprovalResult<ConsumeOutcome>;

    /// Flip every overdue PENDING approval to EXPIRED. Returns how many.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn expire_stale(&self, now: DateTime<Utc>) -> ApprovalResult<u64>;
}

/// In-memory approval store (tests and single-process deployments).
#[derive(Debug, Default)]
pub struct MemoryApprovalStore {
    inner: RwLock<HashMap<ApprovalId, Approval>>,
}

impl MemoryApprovalStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write(
        &self,
    ) -> ApprovalResult<std::sync::RwLockWriteGuard<'_, HashMap<ApprovalId, Approval>>> {
        self.inner
            .write()
            .map_err(|_| ApprovalError::Store("lock poisoned".to_string()))
    }
}

#[async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn upsert_pending(
        &self,
        new: NewApproval,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ApprovalResult<Approval> {
        let mut map = self.write()?;

        // Reuse an open approval for the same action shape.
        if let Some(existing) = map.values().find(|a| {
            a.org_id == new.org_id
                && a.uapk_id == new.uapk_id
                && a.action_fingerprint == new.action_fingerprint
                && a.is_pending(now)
        }) {
            debug!(approval_id = %existing.id, "reusing open approval");
            return Ok(existing.clone());
        }

        let approval = Approval {
            id: ApprovalId::new(),
            org_id: new.org_id,
            uapk_id: new.uapk_id,
            agent_id: new.agent_id,
            action_fingerprint: new.action_fingerprint,
            params_snapshot: new.params_snapshot,
            status: ApprovalStatus::Pending,
            reason: new.reason,
            created_at: now,
            expires_at,
            decided_by: None,
            decided_at: None,
            override_token_hash: None,
            consumed_at: None,
        };

        info!(approval_id = %approval.id, fingerprint = %approval.action_fingerprint, "approval opened");
        map.insert(approval.id.clone(), approval.clone());
        Ok(approval)
    }

    async fn get(&self, id: &ApprovalId) -> ApprovalResult<Option<Approval>> {
        let map = self
            .inner
            .read()
            .map_err(|_| ApprovalError::Store("lock poisoned".to_string()))?;
        Ok(map.get(id).cloned())
    }

    async fn approve(
        &self,
        id: &ApprovalId,
        decided_by: &str,
        token_hash: ContentHash,
        now: DateTime<Utc>,
    ) -> ApprovalResult<Approval> {
        let mut map = self.write()?;
        let approval = map.get_mut(id).ok_or_else(|| not_found(id))?;

        if !approval.is_pending(now) {
            return Err(ApprovalError::InvalidTransition {
                approval_id: id.to_string(),
                message: format!("cannot approve from status {}", approval.status),
            });
        }

        approval.status = ApprovalStatus::Approved;
        approval.decided_by = Some(decided_by.to_string());
        approval.decided_at = Some(now);
        approval.override_token_hash = Some(token_hash);

        info!(approval_id = %id, decided_by, "approval granted");
        Ok(approval.clone())
    }

    async fn deny(
        &self,
        id: &ApprovalId,
        decided_by: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ApprovalResult<Approval> {
        let mut map = self.write()?;
        let approval = map.get_mut(id).ok_or_else(|| not_found(id))?;

        if !approval.is_pending(now) {
            return Err(ApprovalError::InvalidTransition {
                approval_id: id.to_string(),
                message: format!("cannot deny from status {}", approval.status),
            });
        }

        approval.status = ApprovalStatus::Denied;
        approval.decided_by = Some(decided_by.to_string());
        approval.decided_at = Some(now);
        if reason.is_some() {
            approval.reason = reason;
        }

        info!(approval_id = %id, decided_by, "approval denied");
        Ok(approval.clone())
    }

    async fn consume_override(
        &self,
        id: &ApprovalId,
        token_hash: &ContentHash,
        now: DateTime<Utc>,
    ) -> ApprovalResult<ConsumeOutcome> {
        let mut map = self.write()?;
        let Some(approval) = map.get_mut(id) else {
            return Ok(ConsumeOutcome::NotApproved);
        };

        match approval.status {
            ApprovalStatus::Consumed => return Ok(ConsumeOutcome::AlreadyConsumed),
            ApprovalStatus::Approved => {},
            _ => return Ok(ConsumeOutcome::NotApproved),
        }

        let Some(stored) = &approval.override_token_hash else {
            return Ok(ConsumeOutcome::TokenMismatch);
        };
        if stored.as_bytes().ct_eq(token_hash.as_bytes()).unwrap_u8() != 1 {
            return Ok(ConsumeOutcome::TokenMismatch);
        }

        // The conditional update commits here; the write lock makes it the
        // single winner under concurrency.
        approval.status = ApprovalStatus::Consumed;
        approval.consumed_at = Some(now);

        info!(approval_id = %id, "override token consumed");
        Ok(ConsumeOutcome::Consumed)
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> ApprovalResult<u64> {
        let mut map = self.write()?;
        let mut expired = 0u64;

        for approval in map.values_mut() {
            if approval.status == ApprovalStatus::Pending && now >= approval.expires_at {
                approval.status = ApprovalStatus::Expired;
                expired = expired.saturating_add(1);
            }
        }

        if expired > 0 {
            debug!(expired, "stale approvals expired");
        }
        Ok(expired)
    }
}

fn not_found(id: &ApprovalId) -> ApprovalError {
    ApprovalError::NotFound {
        approval_id: id.to_string(),
    }
}
