//! The gateway facade and execute orchestration.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_approval::{Approval, ApprovalStore, ConsumeOutcome, CounterStore, NewApproval};
use warden_audit::{
    AuditEvent, AuditLog, ChainVerificationReport, ExportFilter, InteractionRecord, export_bundle,
};
use warden_config::CoreConfig;
use warden_connector::{
    Connector, ConnectorError, ConnectorResponse, HttpConnector, MockConnector, SecretsProvider,
};
use warden_core::{
    Action, ApprovalId, CheckResult, Context, Decision, Outcome, Reason, ReasonCode, RecordId,
    RequestId, StreamId, TraceEntry,
};
use warden_crypto::{KeyPair, KeyRing, PublicKey};
use warden_manifest::{ManifestStore, ToolSpec};
use warden_policy::{EvaluationOutput, PolicyEngine};
use warden_token::{IssuerRegistry, issue_override};

use crate::error::{GatewayError, GatewayResult};

/// What one `execute` produced.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The decision that governed the execution.
    pub decision: Decision,
    /// The connector response, when the action was executed and the
    /// transport delivered something.
    pub response: Option<ConnectorResponse>,
    /// The connector failure, when the action was executed but the call
    /// did not complete. Also present in the record's result.
    pub failure: Option<ConnectorFailure>,
    /// The interaction record covering this request.
    pub record_id: RecordId,
}

/// A connector-level failure, as recorded in the interaction record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectorFailure {
    /// Stable failure code, e.g. `SSRF_PRIVATE_IP` or `TIMEOUT`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// True when the upstream may have acted despite the failure (timeout
    /// or connection loss after the request was sent).
    pub completed_unknown: bool,
}

impl ConnectorFailure {
    fn from_error(e: &ConnectorError) -> Self {
        let code = match e {
            ConnectorError::Ssrf { reason, .. } => format!("SSRF_{reason}"),
            ConnectorError::InvalidUrl(_) | ConnectorError::Config(_) => "CONFIG".to_string(),
            ConnectorError::Network(_) => "NETWORK".to_string(),
            ConnectorError::Tls(_) => "TLS".to_string(),
            ConnectorError::Timeout { .. } => "TIMEOUT".to_string(),
            ConnectorError::Size { .. } => "SIZE".to_string(),
            ConnectorError::SecretNotFound(_) => "SECRET_NOT_FOUND".to_string(),
        };
        // A timeout (or connection loss) after the request was sent is
        // ambiguous: the upstream may have acted.
        let completed_unknown =
            matches!(e, ConnectorError::Timeout { .. } | ConnectorError::Network(_));
        Self {
            code,
            message: e.to_string(),
            completed_unknown,
        }
    }
}

/// An operator's verdict on an approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalVerdict {
    /// Approve; an override token will be issued.
    Approve,
    /// Deny, with an optional note.
    Deny {
        /// Why the operator refused.
        note: Option<String>,
    },
}

/// Result of deciding an approval.
#[derive(Debug, Clone)]
pub struct ApprovalDecisionOutcome {
    /// The approval after the decision.
    pub approval: Approval,
    /// The single-use override token, present on approve. Shown once;
    /// only its hash is retained.
    pub override_token: Option<String>,
}

/// The assembled gateway.
pub struct Gateway {
    config: CoreConfig,
    signing_key: Arc<KeyPair>,
    keys: KeyRing,
    engine: PolicyEngine,
    manifests: Arc<dyn ManifestStore>,
    approvals: Arc<dyn ApprovalStore>,
    counters: Arc<dyn CounterStore>,
    audit: AuditLog,
    http_connector: HttpConnector,
    mock_connector: MockConnector,
    secrets: Arc<dyn SecretsProvider>,
    stream: StreamId,
    recent_requests: DashMap<RequestId, (ExecutionOutcome, DateTime<Utc>)>,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        config: CoreConfig,
        signing_key: Arc<KeyPair>,
        keys: KeyRing,
        engine: PolicyEngine,
        manifests: Arc<dyn ManifestStore>,
        approvals: Arc<dyn ApprovalStore>,
        counters: Arc<dyn CounterStore>,
        audit: AuditLog,
        http_connector: HttpConnector,
        mock_connector: MockConnector,
        secrets: Arc<dyn SecretsProvider>,
        stream: StreamId,
    ) -> Self {
        Self {
            config,
            signing_key,
            keys,
            engine,
            manifests,
            approvals,
            counters,
            audit,
            http_connector,
            mock_connector,
            secrets,
            stream,
            recent_requests: DashMap::new(),
        }
    }

    /// The gateway's verification public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.signing_key.export_public_key()
    }

    /// The capability token issuer registry.
    #[must_use]
    pub fn issuers(&self) -> &IssuerRegistry {
        self.engine.issuers()
    }

    /// The manifest store (lifecycle operations pass through it).
    #[must_use]
    pub fn manifests(&self) -> &Arc<dyn ManifestStore> {
        &self.manifests
    }

    /// Evaluate an action without side effects beyond approval creation
    /// on ESCALATE. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] for infrastructure faults only.
    pub async fn evaluate(&self, ctx: &Context, action: &Action) -> GatewayResult<Decision> {
        Ok(self.engine.evaluate(ctx, action).await?)
    }

    /// Execute an action: re-evaluate, consume the override, commit the
    /// budget, call the connector, and append the interaction record.
    ///
    /// Idempotent on `ctx.request_id`: a repeated id inside the window
    /// returns the recorded outcome without touching the connector again.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] for infrastructure faults; every policy
    /// outcome (including override and budget races) is a recorded
    /// `Decision`.
    pub async fn execute(&self, ctx: &Context, action: &Action) -> GatewayResult<ExecutionOutcome> {
        let now = Utc::now();

        if let Some(previous) = self.replayed(&ctx.request_id, now) {
            debug!(request_id = %ctx.request_id, record_id = %previous.record_id, "request replayed from idempotency window");
            return Ok(previous);
        }

        let output = self.engine.evaluate_at(ctx, action, now).await?;

        if !output.decision.is_allow() {
            return self.record_and_finish(ctx, action, now, output.decision, None).await;
        }

        // Consume the override before any side effect: exactly one
        // execution may ride a given token.
        if let Some(verified) = &output.verified_override {
            let consumed = self
                .approvals
                .consume_override(&verified.approval_id, &verified.token_hash, now)
                .await?;
            if !consumed.is_consumed() {
                let decision = deny_after(
                    output.decision,
                    "override_consume",
                    consume_reason(consumed),
                );
                return self.record_and_finish(ctx, action, now, decision, None).await;
            }
        }

        // Commit the budget. Evaluation peeked; this is the write, and it
        // can still lose a race with concurrent executes.
        let committed = self
            .counters
            .try_increment(&ctx.org_id, &ctx.uapk_id, &output.budget_probes, now)
            .await?;
        if let Err(breach) = committed {
            warn!(
                action_key = %breach.action_key,
                cap = breach.cap,
                "budget race lost at commit time"
            );
            let decision = deny_after(
                output.decision,
                "budget_commit",
                Reason::new(
                    ReasonCode::BudgetExceededRace,
                    format!(
                        "{} {} budget was exhausted by a concurrent execution",
                        breach.action_key, breach.kind
                    ),
                ),
            );
            return self.record_and_finish(ctx, action, now, decision, None).await;
        }

        // The side effect. Failures are results, not faults: the record
        // is authoritative either way.
        let result = self.run_connector(ctx, action, &output).await;
        let executed = match result {
            Ok(response) => {
                let value = serde_json::to_value(&response)
                    .unwrap_or_else(|_| serde_json::json!({"error": "unserializable response"}));
                Executed {
                    response: Some(response),
                    failure: None,
                    result_value: value,
                }
            },
            Err(e) => {
                let failure = ConnectorFailure::from_error(&e);
                let value = serde_json::to_value(&failure)
                    .map(|f| serde_json::json!({"error": f}))
                    .unwrap_or_else(|_| serde_json::json!({"error": "unserializable failure"}));
                Executed {
                    response: None,
                    failure: Some(failure),
                    result_value: value,
                }
            },
        };

        self.record_and_finish(ctx, action, now, output.decision, Some(executed))
            .await
    }

    /// Open (or reuse) a pending approval for an action without going
    /// through an escalated evaluation.
    ///
    /// # Errors
    ///
    /// Returns a store or canonicalization fault.
    pub async fn create_approval(&self, ctx: &Context, action: &Action) -> GatewayResult<Approval> {
        let now = Utc::now();
        let fingerprint = action
            .fingerprint(&ctx.uapk_id)
            .map_err(warden_policy::EngineError::from)?;
        let approval = self
            .approvals
            .upsert_pending(
                NewApproval {
                    org_id: ctx.org_id.clone(),
                    uapk_id: ctx.uapk_id.clone(),
                    agent_id: ctx.agent_id.clone(),
                    action_fingerprint: fingerprint,
                    params_snapshot: action.params.clone(),
                    reason: Some("operator-opened".to_string()),
                },
                now + chrono::Duration::seconds(
                    i64::try_from(self.config.approval_expiry_seconds).unwrap_or(i64::MAX),
                ),
                now,
            )
            .await?;
        Ok(approval)
    }

    /// Decide a pending approval. Approval mints the single-use override
    /// token and stores only its hash.
    ///
    /// # Errors
    ///
    /// Returns [`warden_approval::ApprovalError`] variants for unknown ids
    /// and invalid transitions, or token issuance faults.
    pub async fn decide_approval(
        &self,
        approver: &str,
        approval_id: &ApprovalId,
        verdict: ApprovalVerdict,
    ) -> GatewayResult<ApprovalDecisionOutcome> {
        let now = Utc::now();

        match verdict {
            ApprovalVerdict::Deny { note } => {
                let approval = self.approvals.deny(approval_id, approver, note, now).await?;
                info!(approval_id = %approval_id, approver, "approval denied");
                Ok(ApprovalDecisionOutcome {
                    approval,
                    override_token: None,
                })
            },
            ApprovalVerdict::Approve => {
                let approval = self.approvals.get(approval_id).await?.ok_or_else(|| {
                    warden_approval::ApprovalError::NotFound {
                        approval_id: approval_id.to_string(),
                    }
                })?;

                let issued = issue_override(
                    &self.signing_key,
                    approval_id,
                    &approval.action_fingerprint,
                    chrono::Duration::seconds(
                        i64::try_from(self.config.override_token_ttl_seconds).unwrap_or(300),
                    ),
                    now,
                )?;

                let approval = self
                    .approvals
                    .approve(approval_id, approver, issued.token_hash, now)
                    .await?;

                info!(approval_id = %approval_id, approver, jti = %issued.jti, "approval granted, override token issued");
                Ok(ApprovalDecisionOutcome {
                    approval,
                    override_token: Some(issued.token),
                })
            },
        }
    }

    /// Verify the audit chain of a stream (the gateway's own by default).
    ///
    /// # Errors
    ///
    /// Returns an audit store fault; a broken chain is a report.
    pub async fn verify_audit_chain(
        &self,
        stream: Option<&StreamId>,
    ) -> GatewayResult<ChainVerificationReport> {
        let stream = stream.unwrap_or(&self.stream);
        Ok(self.audit.verify_chain(stream, &self.keys).await?)
    }

    /// Export a deterministic evidence bundle.
    ///
    /// # Errors
    ///
    /// Returns audit or manifest store faults.
    pub async fn export_audit_bundle(&self, filter: &ExportFilter) -> GatewayResult<Vec<u8>> {
        let snapshot = match (&filter.org_id, &filter.uapk_id) {
            (Some(org_id), Some(uapk_id)) => {
                match self.manifests.get_active(org_id, uapk_id).await? {
                    Some(manifest) => serde_json::to_value(&manifest)
                        .unwrap_or_else(|_| serde_json::json!({})),
                    None => serde_json::json!({}),
                }
            },
            _ => serde_json::json!({}),
        };

        Ok(export_bundle(
            self.audit.store().as_ref(),
            &self.keys,
            &self.signing_key,
            filter,
            &snapshot,
        )
        .await?)
    }

    /// Fetch one interaction record.
    ///
    /// # Errors
    ///
    /// Returns an audit store fault.
    pub async fn record(&self, record_id: &RecordId) -> GatewayResult<Option<InteractionRecord>> {
        Ok(self.audit.get(&self.stream, record_id).await?)
    }

    /// Expire stale pending approvals. Returns how many were flipped.
    ///
    /// # Errors
    ///
    /// Returns an approval store fault.
    pub async fn expire_stale_approvals(&self) -> GatewayResult<u64> {
        Ok(self.approvals.expire_stale(Utc::now()).await?)
    }

    // --- internals --------------------------------------------------------

    fn replayed(&self, request_id: &RequestId, now: DateTime<Utc>) -> Option<ExecutionOutcome> {
        let window = chrono::Duration::seconds(
            i64::try_from(self.config.idempotency_window_seconds).unwrap_or(i64::MAX),
        );
        if let Some(entry) = self.recent_requests.get(request_id) {
            let (outcome, seen_at) = entry.value();
            if now - *seen_at < window {
                return Some(outcome.clone());
            }
        }
        self.recent_requests
            .remove_if(request_id, |_, (_, seen_at)| now - *seen_at >= window);
        None
    }

    async fn run_connector(
        &self,
        ctx: &Context,
        action: &Action,
        output: &EvaluationOutput,
    ) -> Result<ConnectorResponse, ConnectorError> {
        let Some(manifest) = &output.manifest else {
            return Err(ConnectorError::Config("no manifest in scope".to_string()));
        };
        let Some(tool) = manifest.tool(&action.tool) else {
            return Err(ConnectorError::Config(format!(
                "tool {} vanished between evaluation and execution",
                action.tool
            )));
        };

        let call = async {
            match tool {
                ToolSpec::Mock(_) => {
                    self.mock_connector
                        .execute(tool, &action.params, self.secrets.as_ref())
                        .await
                },
                ToolSpec::Http(_) | ToolSpec::Webhook(_) => {
                    self.http_connector
                        .execute(tool, &action.params, self.secrets.as_ref())
                        .await
                },
            }
        };

        // Clamp to the remaining request deadline when one is set.
        match ctx.deadline {
            Some(deadline) => {
                let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
                match tokio::time::timeout(remaining, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ConnectorError::Timeout {
                        budget_secs: remaining.as_secs(),
                    }),
                }
            },
            None => call.await,
        }
    }

    async fn record_and_finish(
        &self,
        ctx: &Context,
        action: &Action,
        now: DateTime<Utc>,
        decision: Decision,
        executed: Option<Executed>,
    ) -> GatewayResult<ExecutionOutcome> {
        let (response, failure, result_value) = match executed {
            Some(executed) => (
                executed.response,
                executed.failure,
                Some(executed.result_value),
            ),
            None => (None, None, None),
        };

        let event = AuditEvent {
            timestamp: now,
            org_id: ctx.org_id.clone(),
            uapk_id: ctx.uapk_id.clone(),
            agent_id: ctx.agent_id.clone(),
            user_id: ctx.user_id.clone(),
            action_type: action.action_type.clone(),
            tool: action.tool.clone(),
            request: serde_json::json!({
                "action": action,
                "request_id": ctx.request_id,
            }),
            decision: decision.outcome,
            reason_codes: decision.reason_codes(),
            policy_trace: decision.policy_trace.clone(),
            result: result_value,
        };

        // The append is authoritative; a failure here fails the request.
        let record = self.audit.append(&self.stream, event).await?;

        let outcome = ExecutionOutcome {
            decision,
            response,
            failure,
            record_id: record.record_id.clone(),
        };
        self.recent_requests
            .insert(ctx.request_id.clone(), (outcome.clone(), now));
        Ok(outcome)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("key_id", &self.signing_key.key_id())
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// Downgrade an ALLOW decision after a post-evaluation refusal (override
/// consumed elsewhere, budget race).
fn deny_after(mut decision: Decision, check: &str, reason: Reason) -> Decision {
    decision.outcome = Outcome::Deny;
    decision.policy_trace.push(
        TraceEntry::new(check, CheckResult::Fail)
            .with_details(serde_json::json!({"code": reason.code})),
    );
    decision.reasons = vec![reason];
    decision.approval_id = None;
    decision.consumed_override_token_id = None;
    decision
}

fn consume_reason(outcome: ConsumeOutcome) -> Reason {
    match outcome {
        ConsumeOutcome::AlreadyConsumed | ConsumeOutcome::Consumed => Reason::new(
            ReasonCode::OverrideTokenConsumed,
            "override token was already used",
        ),
        ConsumeOutcome::NotApproved => Reason::new(
            ReasonCode::OverrideTokenInvalid,
            "approval is no longer in APPROVED status",
        ),
        ConsumeOutcome::TokenMismatch => Reason::new(
            ReasonCode::OverrideTokenMismatch,
            "override token does not match the approval's issued token",
        ),
    }
}

/// Working set of one executed connector call.
struct Executed {
    response: Option<ConnectorResponse>,
    failure: Option<ConnectorFailure>,
    result_value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GatewayBuilder;
    use warden_manifest::Manifest;

    async fn gateway_with(manifest_json: serde_json::Value) -> Gateway {
        let gateway = GatewayBuilder::new(CoreConfig::default())
            .build()
            .expect("gateway builds");

        let manifest = Manifest::from_json(&manifest_json.to_string()).expect("valid manifest");
        let org = manifest.org_id.clone();
        let uapk = manifest.uapk_id.clone();
        let version = manifest.version.clone();
        gateway.manifests().put_draft(manifest).await.expect("draft");
        gateway
            .manifests()
            .activate(&org, &uapk, &version)
            .await
            .expect("activate");
        gateway
    }

    fn base_manifest() -> serde_json::Value {
        serde_json::json!({
            "version": "1.0.0",
            "uapk_id": "uapk-1",
            "org_id": "org-1",
            "tools": {
                "echo": {"kind": "mock", "config": {}},
                "mock": {"kind": "mock", "config": {}}
            },
            "capabilities_requested": ["read", "refund"]
        })
    }

    fn ctx(request_id: &str) -> Context {
        Context::new("org-1", "uapk-1", "agent-1", request_id)
    }

    #[tokio::test]
    async fn test_execute_allow_appends_record() {
        let gateway = gateway_with(base_manifest()).await;
        let action = Action::new("read", "echo").with_params(serde_json::json!({"x": 1}));

        let outcome = gateway.execute(&ctx("req-1"), &action).await.unwrap();
        assert_eq!(outcome.decision.outcome, Outcome::Allow);
        assert!(outcome.response.is_some());

        let record = gateway.record(&outcome.record_id).await.unwrap().unwrap();
        assert_eq!(record.decision, Outcome::Allow);
        assert_eq!(record.action_type, "read");

        let report = gateway.verify_audit_chain(None).await.unwrap();
        assert!(report.ok);
        assert_eq!(report.verified_count, 1);
    }

    #[tokio::test]
    async fn test_non_allow_is_recorded_without_execution() {
        let gateway = gateway_with(base_manifest()).await;
        let action = Action::new("read", "unknown-tool");

        let outcome = gateway.execute(&ctx("req-1"), &action).await.unwrap();
        assert_eq!(outcome.decision.outcome, Outcome::Deny);
        assert!(outcome.response.is_none());

        let record = gateway.record(&outcome.record_id).await.unwrap().unwrap();
        assert_eq!(record.decision, Outcome::Deny);
        assert!(record
            .reason_codes
            .contains(&ReasonCode::ToolNotConfigured));
    }

    #[tokio::test]
    async fn test_request_id_idempotency() {
        let gateway = gateway_with(base_manifest()).await;
        let action = Action::new("read", "echo");

        let first = gateway.execute(&ctx("req-dup"), &action).await.unwrap();
        let second = gateway.execute(&ctx("req-dup"), &action).await.unwrap();

        assert_eq!(first.record_id, second.record_id);

        // Only one record exists for the two calls.
        let report = gateway.verify_audit_chain(None).await.unwrap();
        assert_eq!(report.verified_count, 1);
    }

    #[tokio::test]
    async fn test_escalate_approve_execute_consume_once() {
        let mut json = base_manifest();
        json["constraints"] = serde_json::json!({"require_human_approval": ["refund"]});
        let gateway = gateway_with(json).await;
        let action = Action::new("refund", "mock").with_amount(500.0, "EUR");

        // 1. Escalates.
        let escalated = gateway.execute(&ctx("req-1"), &action).await.unwrap();
        assert_eq!(escalated.decision.outcome, Outcome::Escalate);
        let approval_id = escalated.decision.approval_id.clone().unwrap();

        // 2. Approve: token issued.
        let decided = gateway
            .decide_approval("ops@example.com", &approval_id, ApprovalVerdict::Approve)
            .await
            .unwrap();
        let token = decided.override_token.unwrap();

        // 3. Execute with the token: ALLOW, token consumed.
        let allowed = gateway
            .execute(&ctx("req-2").with_override_token(token.clone()), &action)
            .await
            .unwrap();
        assert_eq!(allowed.decision.outcome, Outcome::Allow);
        assert!(allowed
            .decision
            .has_reason(ReasonCode::OverrideApplied));

        // 4. Re-execute with the same token: consumed.
        let replayed = gateway
            .execute(&ctx("req-3").with_override_token(token), &action)
            .await
            .unwrap();
        assert_eq!(replayed.decision.outcome, Outcome::Deny);
        assert!(replayed
            .decision
            .has_reason(ReasonCode::OverrideTokenConsumed));

        // Every step is on the chain.
        let report = gateway.verify_audit_chain(None).await.unwrap();
        assert!(report.ok);
        assert_eq!(report.verified_count, 3);
    }

    #[tokio::test]
    async fn test_decide_approval_deny_issues_no_token() {
        let mut json = base_manifest();
        json["constraints"] = serde_json::json!({"require_human_approval": ["refund"]});
        let gateway = gateway_with(json).await;
        let action = Action::new("refund", "mock").with_amount(100.0, "EUR");

        let escalated = gateway.execute(&ctx("req-1"), &action).await.unwrap();
        let approval_id = escalated.decision.approval_id.clone().unwrap();

        let decided = gateway
            .decide_approval(
                "ops@example.com",
                &approval_id,
                ApprovalVerdict::Deny {
                    note: Some("not during the incident".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(decided.override_token.is_none());
        assert_eq!(
            decided.approval.status,
            warden_approval::ApprovalStatus::Denied
        );
    }

    #[tokio::test]
    async fn test_create_approval_is_idempotent() {
        let gateway = gateway_with(base_manifest()).await;
        let action = Action::new("refund", "mock").with_amount(10.0, "EUR");

        let a = gateway.create_approval(&ctx("r1"), &action).await.unwrap();
        let b = gateway.create_approval(&ctx("r2"), &action).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_recorded() {
        let mut json = base_manifest();
        json["policy"] = serde_json::json!({"budgets": {"send_email": {"daily": 2}}});
        json["tools"]["mailer"] = serde_json::json!({"kind": "mock", "config": {}});
        let gateway = gateway_with(json).await;
        let action = Action::new("send_email", "mailer");

        for i in 0..2 {
            let outcome = gateway
                .execute(&ctx(&format!("req-{i}")), &action)
                .await
                .unwrap();
            assert_eq!(outcome.decision.outcome, Outcome::Allow, "call {i}");
        }

        let third = gateway.execute(&ctx("req-2x"), &action).await.unwrap();
        assert_eq!(third.decision.outcome, Outcome::Deny);
        assert!(third.decision.has_reason(ReasonCode::BudgetExceededDay));

        let report = gateway.verify_audit_chain(None).await.unwrap();
        assert_eq!(report.verified_count, 3);
    }

    #[tokio::test]
    async fn test_export_bundle_deterministic() {
        let gateway = gateway_with(base_manifest()).await;
        let action = Action::new("read", "echo");
        gateway.execute(&ctx("req-1"), &action).await.unwrap();

        let filter = ExportFilter::stream(StreamId::default());
        let a = gateway.export_audit_bundle(&filter).await.unwrap();
        let b = gateway.export_audit_bundle(&filter).await.unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }
}
