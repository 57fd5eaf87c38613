//! The evaluation pipeline.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use warden_approval::{ApprovalStatus, ApprovalStore, CounterProbe, CounterStore, NewApproval, WindowKind};
use warden_core::{
    Action, BudgetUsage, CheckResult, Context, Decision, Outcome, Reason, ReasonCode,
    RiskSnapshot, TraceEntry,
};
use warden_crypto::KeyRing;
use warden_manifest::{Manifest, ManifestStore, host_suffix_matches};
use warden_token::{IssuerRegistry, TokenError, VerifiedOverride, verify_capability, verify_override};

use crate::error::{EngineError, EngineResult};

/// The policy engine: stateless over its injected stores.
pub struct PolicyEngine {
    manifests: Arc<dyn ManifestStore>,
    approvals: Arc<dyn ApprovalStore>,
    counters: Arc<dyn CounterStore>,
    issuers: Arc<IssuerRegistry>,
    gateway_keys: KeyRing,
    approval_expiry: Duration,
}

/// Everything one evaluation produced.
///
/// The `Decision` is the caller-facing contract; the rest is working state
/// the executor reuses so it does not re-derive what evaluation already
/// established (the manifest, the recognized override, the exact budget
/// probes to commit).
#[derive(Debug)]
pub struct EvaluationOutput {
    /// The decision.
    pub decision: Decision,
    /// The active manifest, when resolution succeeded.
    pub manifest: Option<Manifest>,
    /// The recognized override token, to be consumed by the executor.
    pub verified_override: Option<VerifiedOverride>,
    /// The counter probes (with caps) the executor must commit on ALLOW.
    pub budget_probes: Vec<CounterProbe>,
}

struct Eval {
    trace: Vec<TraceEntry>,
    escalations: Vec<Reason>,
    risk: RiskSnapshot,
    verified_override: Option<VerifiedOverride>,
}

impl Eval {
    fn new() -> Self {
        Self {
            trace: Vec::new(),
            escalations: Vec::new(),
            risk: RiskSnapshot::default(),
            verified_override: None,
        }
    }

    fn pass(&mut self, check: &str) {
        self.trace.push(TraceEntry::new(check, CheckResult::Pass));
    }

    fn skip(&mut self, check: &str) {
        self.trace.push(TraceEntry::new(check, CheckResult::Skip));
    }

    fn fail(&mut self, check: &str, details: serde_json::Value) {
        self.trace
            .push(TraceEntry::new(check, CheckResult::Fail).with_details(details));
    }

    fn escalate(&mut self, check: &str, reason: Reason) {
        self.trace.push(
            TraceEntry::new(check, CheckResult::Escalate)
                .with_details(serde_json::json!({"code": reason.code})),
        );
        self.escalations.push(reason);
    }

    fn deny(mut self, check: &str, reason: Reason) -> Decision {
        self.fail(check, serde_json::json!({"code": reason.code}));
        Decision {
            outcome: Outcome::Deny,
            reasons: vec![reason],
            policy_trace: self.trace,
            risk_snapshot: self.risk,
            approval_id: None,
            consumed_override_token_id: None,
        }
    }
}

/// Flow control: a check either lets evaluation continue or produces the
/// final (deny) decision.
enum Checked {
    Continue,
    Done(Decision),
}

impl PolicyEngine {
    /// Create an engine over its stores and verification material.
    #[must_use]
    pub fn new(
        manifests: Arc<dyn ManifestStore>,
        approvals: Arc<dyn ApprovalStore>,
        counters: Arc<dyn CounterStore>,
        issuers: Arc<IssuerRegistry>,
        gateway_keys: KeyRing,
        approval_expiry: Duration,
    ) -> Self {
        Self {
            manifests,
            approvals,
            counters,
            issuers,
            gateway_keys,
            approval_expiry,
        }
    }

    /// The capability token issuer registry.
    #[must_use]
    pub fn issuers(&self) -> &IssuerRegistry {
        &self.issuers
    }

    /// Evaluate an action now.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only for infrastructure faults; every policy
    /// outcome is inside the `Decision`.
    pub async fn evaluate(&self, ctx: &Context, action: &Action) -> EngineResult<Decision> {
        Ok(self.evaluate_at(ctx, action, Utc::now()).await?.decision)
    }

    /// Evaluate at an explicit instant, returning full working state.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Deadline`] if the context's deadline has
    /// passed, or a store/canonicalization fault.
    pub async fn evaluate_at(
        &self,
        ctx: &Context,
        action: &Action,
        now: DateTime<Utc>,
    ) -> EngineResult<EvaluationOutput> {
        if let Some(deadline) = ctx.deadline {
            if now >= deadline {
                return Err(EngineError::Deadline);
            }
        }

        let mut eval = Eval::new();

        // 1. Manifest resolution.
        let manifest = match self.resolve_manifest(ctx, &mut eval).await? {
            Ok(manifest) => manifest,
            Err(decision) => {
                return Ok(EvaluationOutput {
                    decision,
                    manifest: None,
                    verified_override: None,
                    budget_probes: Vec::new(),
                });
            },
        };

        let probes = budget_probes(&manifest, action);
        let (decision, verified_override) = self
            .run_pipeline(ctx, action, &manifest, now, eval, &probes)
            .await?;

        Ok(EvaluationOutput {
            decision,
            manifest: Some(manifest),
            verified_override,
            budget_probes: probes,
        })
    }

    async fn resolve_manifest(
        &self,
        ctx: &Context,
        eval: &mut Eval,
    ) -> EngineResult<Result<Manifest, Decision>> {
        if let Some(manifest) = self.manifests.get_active(&ctx.org_id, &ctx.uapk_id).await? {
            eval.pass("manifest");
            return Ok(Ok(manifest));
        }

        let versions = self
            .manifests
            .list_versions(&ctx.org_id, &ctx.uapk_id)
            .await?;
        let (code, message) = if versions.is_empty() {
            (
                ReasonCode::ManifestNotFound,
                format!("no manifest for {}/{}", ctx.org_id, ctx.uapk_id),
            )
        } else {
            (
                ReasonCode::ManifestInactive,
                format!("no ACTIVE manifest for {}/{}", ctx.org_id, ctx.uapk_id),
            )
        };

        let eval = std::mem::replace(eval, Eval::new());
        Ok(Err(eval.deny("manifest", Reason::new(code, message))))
    }

    #[allow(clippy::too_many_lines)]
    async fn run_pipeline(
        &self,
        ctx: &Context,
        action: &Action,
        manifest: &Manifest,
        now: DateTime<Utc>,
        mut eval: Eval,
        probes: &[CounterProbe],
    ) -> EngineResult<(Decision, Option<VerifiedOverride>)> {
        // 1b. Operating hours.
        if let Some(hours) = &manifest.constraints.allowed_hours {
            #[allow(clippy::cast_possible_truncation)]
            let hour = now.hour() as u8;
            if hours.contains(hour) {
                eval.pass("allowed_hours");
            } else {
                return Ok((
                    eval.deny(
                        "allowed_hours",
                        Reason::new(
                            ReasonCode::OutsideAllowedHours,
                            format!("hour {hour} UTC is outside the allowed window"),
                        ),
                    ),
                    None,
                ));
            }
        } else {
            eval.skip("allowed_hours");
        }

        // 2. Tool existence.
        if manifest.tool(&action.tool).is_none() {
            return Ok((
                eval.deny(
                    "tool_exists",
                    Reason::new(
                        ReasonCode::ToolNotConfigured,
                        format!("tool {} is not configured", action.tool),
                    ),
                ),
                None,
            ));
        }
        eval.pass("tool_exists");

        // 3. Tool allow/deny lists.
        if let Checked::Done(decision) = check_tool_lists(action, manifest, &mut eval) {
            return Ok((decision, None));
        }

        // 4. Capability token.
        if let Checked::Done(decision) = self.check_capability(ctx, action, manifest, now, &mut eval)
        {
            return Ok((decision, None));
        }

        // 5. Override token.
        if let Checked::Done(decision) = self
            .check_override(ctx, action, now, &mut eval)
            .await?
        {
            return Ok((decision, None));
        }

        // 6. Jurisdiction.
        if let Checked::Done(decision) = check_jurisdiction(action, manifest, &mut eval) {
            return Ok((decision, None));
        }

        // 7. Counterparty lists.
        if let Checked::Done(decision) = check_counterparty(action, manifest, &mut eval) {
            return Ok((decision, None));
        }

        // 8. Amount caps.
        if let Checked::Done(decision) = check_amount(action, manifest, &mut eval) {
            return Ok((decision, None));
        }

        // 9. Approval thresholds.
        check_thresholds(action, manifest, &mut eval);

        // 10. Manifest require_human_approval.
        if manifest
            .constraints
            .require_human_approval
            .contains(&action.action_type)
        {
            eval.escalate(
                "require_human_approval",
                Reason::new(
                    ReasonCode::RequiresApproval,
                    format!("{} always requires human approval", action.action_type),
                ),
            );
        } else {
            eval.pass("require_human_approval");
        }

        // 11. Budgets (peek only).
        if let Checked::Done(decision) = self
            .check_budgets(ctx, action, now, probes, &mut eval)
            .await?
        {
            return Ok((decision, None));
        }

        // 12. Final assembly.
        self.assemble(ctx, action, now, eval).await
    }

    fn check_capability(
        &self,
        ctx: &Context,
        action: &Action,
        manifest: &Manifest,
        now: DateTime<Utc>,
        eval: &mut Eval,
    ) -> Checked {
        let required = manifest.policy.require_capability_token;
        let Some(token) = &ctx.capability_token else {
            if required {
                let eval = std::mem::replace(eval, Eval::new());
                return Checked::Done(eval.deny(
                    "capability_token",
                    Reason::new(
                        ReasonCode::CapabilityMissing,
                        "capability token required but not presented",
                    ),
                ));
            }
            eval.skip("capability_token");
            return Checked::Continue;
        };

        let claims = match verify_capability(token, &self.issuers, now) {
            Ok(claims) => claims,
            Err(TokenError::Expired { .. }) => {
                let eval = std::mem::replace(eval, Eval::new());
                return Checked::Done(eval.deny(
                    "capability_token",
                    Reason::new(ReasonCode::TokenExpired, "capability token expired"),
                ));
            },
            Err(e) => {
                let eval = std::mem::replace(eval, Eval::new());
                return Checked::Done(eval.deny(
                    "capability_token",
                    Reason::new(ReasonCode::TokenInvalid, e.to_string()),
                ));
            },
        };

        if claims.sub != ctx.agent_id.as_str() {
            let eval = std::mem::replace(eval, Eval::new());
            return Checked::Done(eval.deny(
                "capability_token",
                Reason::new(
                    ReasonCode::TokenInvalid,
                    "capability token subject does not match agent",
                ),
            ));
        }

        if !claims.grants(&action.action_type) {
            let eval = std::mem::replace(eval, Eval::new());
            return Checked::Done(eval.deny(
                "capability_token",
                Reason::new(
                    ReasonCode::CapabilityMissing,
                    format!("token does not grant {}", action.action_type),
                ),
            ));
        }

        eval.pass("capability_token");
        Checked::Continue
    }

    async fn check_override(
        &self,
        ctx: &Context,
        action: &Action,
        now: DateTime<Utc>,
        eval: &mut Eval,
    ) -> EngineResult<Checked> {
        let Some(token) = &ctx.override_token else {
            eval.skip("override_token");
            return Ok(Checked::Continue);
        };

        let fingerprint = action.fingerprint(&ctx.uapk_id)?;
        let verified = match verify_override(token, &self.gateway_keys, now, &fingerprint) {
            Ok(verified) => verified,
            Err(TokenError::FingerprintMismatch) => {
                // A valid token applied to the wrong action is misuse.
                let eval = std::mem::replace(eval, Eval::new());
                return Ok(Checked::Done(eval.deny(
                    "override_token",
                    Reason::new(
                        ReasonCode::OverrideTokenMismatch,
                        "override token is bound to a different action",
                    ),
                )));
            },
            Err(TokenError::Expired { .. }) => {
                // Not a deny on its own; escalations simply stay in force.
                eval.fail(
                    "override_token",
                    serde_json::json!({"code": ReasonCode::OverrideTokenExpired}),
                );
                return Ok(Checked::Continue);
            },
            Err(e) => {
                debug!(error = %e, "override token rejected");
                eval.fail(
                    "override_token",
                    serde_json::json!({"code": ReasonCode::OverrideTokenInvalid}),
                );
                return Ok(Checked::Continue);
            },
        };

        let Some(approval) = self.approvals.get(&verified.approval_id).await? else {
            eval.fail(
                "override_token",
                serde_json::json!({"code": ReasonCode::OverrideTokenInvalid, "detail": "approval not found"}),
            );
            return Ok(Checked::Continue);
        };

        match approval.status {
            ApprovalStatus::Consumed => {
                let eval = std::mem::replace(eval, Eval::new());
                Ok(Checked::Done(eval.deny(
                    "override_token",
                    Reason::new(
                        ReasonCode::OverrideTokenConsumed,
                        "override token was already used",
                    ),
                )))
            },
            ApprovalStatus::Approved => {
                let hash_matches = approval.override_token_hash == Some(verified.token_hash);
                let fingerprint_matches = approval.action_fingerprint == fingerprint;
                if hash_matches && fingerprint_matches {
                    eval.pass("override_token");
                    eval.verified_override = Some(verified);
                    Ok(Checked::Continue)
                } else {
                    let eval = std::mem::replace(eval, Eval::new());
                    Ok(Checked::Done(eval.deny(
                        "override_token",
                        Reason::new(
                            ReasonCode::OverrideTokenMismatch,
                            "override token does not match the approval's issued token",
                        ),
                    )))
                }
            },
            _ => {
                eval.fail(
                    "override_token",
                    serde_json::json!({
                        "code": ReasonCode::OverrideTokenInvalid,
                        "detail": format!("approval status is {}", approval.status),
                    }),
                );
                Ok(Checked::Continue)
            },
        }
    }

    async fn check_budgets(
        &self,
        ctx: &Context,
        action: &Action,
        now: DateTime<Utc>,
        probes: &[CounterProbe],
        eval: &mut Eval,
    ) -> EngineResult<Checked> {
        let mut capped = false;
        for probe in probes {
            let count = self
                .counters
                .count(&ctx.org_id, &ctx.uapk_id, &probe.action_key, probe.kind, now)
                .await?;

            let usage = eval
                .risk
                .budgets_used
                .entry(probe.action_key.clone())
                .or_insert(BudgetUsage::default());
            match probe.kind {
                WindowKind::Day => usage.day = count,
                WindowKind::Hour => usage.hour = count,
            }

            let Some(cap) = probe.cap else { continue };
            capped = true;

            if count >= cap {
                let code = match probe.kind {
                    WindowKind::Day => ReasonCode::BudgetExceededDay,
                    WindowKind::Hour => ReasonCode::BudgetExceededHour,
                };
                let eval = std::mem::replace(eval, Eval::new());
                return Ok(Checked::Done(eval.deny(
                    "budgets",
                    Reason::new(
                        code,
                        format!(
                            "{} {} budget exhausted ({count}/{cap})",
                            probe.action_key, probe.kind
                        ),
                    )
                    .with_details(serde_json::json!({
                        "action_key": probe.action_key,
                        "window": probe.kind,
                        "count": count,
                        "cap": cap,
                    })),
                )));
            }
        }

        if capped {
            eval.pass("budgets");
        } else {
            eval.skip("budgets");
        }
        Ok(Checked::Continue)
    }

    async fn assemble(
        &self,
        ctx: &Context,
        action: &Action,
        now: DateTime<Utc>,
        mut eval: Eval,
    ) -> EngineResult<(Decision, Option<VerifiedOverride>)> {
        if let Some(verified) = eval.verified_override.take() {
            // Override short-circuits candidate escalations, never denials
            // (denials already returned).
            info!(approval_id = %verified.approval_id, "override token applied");
            let decision = Decision {
                outcome: Outcome::Allow,
                reasons: vec![Reason::new(
                    ReasonCode::OverrideApplied,
                    "approved override token presented",
                )],
                policy_trace: eval.trace,
                risk_snapshot: eval.risk,
                approval_id: Some(verified.approval_id.clone()),
                consumed_override_token_id: Some(verified.jti.clone()),
            };
            return Ok((decision, Some(verified)));
        }

        if !eval.escalations.is_empty() {
            let fingerprint = action.fingerprint(&ctx.uapk_id)?;
            let reason_summary = eval
                .escalations
                .iter()
                .map(|r| r.code.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let approval = self
                .approvals
                .upsert_pending(
                    NewApproval {
                        org_id: ctx.org_id.clone(),
                        uapk_id: ctx.uapk_id.clone(),
                        agent_id: ctx.agent_id.clone(),
                        action_fingerprint: fingerprint,
                        params_snapshot: action.params.clone(),
                        reason: Some(reason_summary),
                    },
                    now + self.approval_expiry,
                    now,
                )
                .await?;

            let decision = Decision {
                outcome: Outcome::Escalate,
                reasons: eval.escalations,
                policy_trace: eval.trace,
                risk_snapshot: eval.risk,
                approval_id: Some(approval.id),
                consumed_override_token_id: None,
            };
            return Ok((decision, None));
        }

        let decision = Decision {
            outcome: Outcome::Allow,
            reasons: Vec::new(),
            policy_trace: eval.trace,
            risk_snapshot: eval.risk,
            approval_id: None,
            consumed_override_token_id: None,
        };
        Ok((decision, None))
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine").finish_non_exhaustive()
    }
}

// --- Synchronous checks -----------------------------------------------------

fn check_tool_lists(action: &Action, manifest: &Manifest, eval: &mut Eval) -> Checked {
    let policy = &manifest.policy;

    if policy.tool_deny.contains(&action.tool) {
        let eval = std::mem::replace(eval, Eval::new());
        return Checked::Done(eval.deny(
            "tool_lists",
            Reason::new(
                ReasonCode::ToolDenied,
                format!("tool {} is on the deny list", action.tool),
            ),
        ));
    }

    if let Some(allow) = &policy.tool_allow {
        if !allow.contains(&action.tool) {
            let eval = std::mem::replace(eval, Eval::new());
            return Checked::Done(eval.deny(
                "tool_lists",
                Reason::new(
                    ReasonCode::ToolNotAllowed,
                    format!("tool {} is not on the allow list", action.tool),
                ),
            ));
        }
    }

    eval.pass("tool_lists");
    Checked::Continue
}

fn check_jurisdiction(action: &Action, manifest: &Manifest, eval: &mut Eval) -> Checked {
    let allow = &manifest.policy.jurisdiction_allow;
    let jurisdiction = action
        .counterparty
        .as_ref()
        .and_then(|c| c.jurisdiction.as_deref());

    match jurisdiction {
        Some(jurisdiction) if !allow.is_empty() => {
            if allow.contains(jurisdiction) {
                eval.pass("jurisdiction");
                Checked::Continue
            } else {
                let eval = std::mem::replace(eval, Eval::new());
                Checked::Done(eval.deny(
                    "jurisdiction",
                    Reason::new(
                        ReasonCode::JurisdictionBlocked,
                        format!("jurisdiction {jurisdiction} is not allowed"),
                    ),
                ))
            }
        },
        _ => {
            eval.skip("jurisdiction");
            Checked::Continue
        },
    }
}

fn check_counterparty(action: &Action, manifest: &Manifest, eval: &mut Eval) -> Checked {
    let policy = &manifest.policy;
    let Some(host) = action
        .counterparty
        .as_ref()
        .and_then(|c| c.host.as_deref())
    else {
        eval.skip("counterparty");
        return Checked::Continue;
    };

    if policy
        .counterparty_deny
        .iter()
        .any(|pattern| host_suffix_matches(pattern, host))
    {
        let eval = std::mem::replace(eval, Eval::new());
        return Checked::Done(eval.deny(
            "counterparty",
            Reason::new(
                ReasonCode::CounterpartyBlocked,
                format!("counterparty {host} is on the deny list"),
            ),
        ));
    }

    if let Some(allow) = &policy.counterparty_allow {
        if !allow.iter().any(|pattern| host_suffix_matches(pattern, host)) {
            let eval = std::mem::replace(eval, Eval::new());
            return Checked::Done(eval.deny(
                "counterparty",
                Reason::new(
                    ReasonCode::CounterpartyNotAllowed,
                    format!("counterparty {host} is not on the allow list"),
                ),
            ));
        }
    }

    eval.pass("counterparty");
    Checked::Continue
}

fn check_amount(action: &Action, manifest: &Manifest, eval: &mut Eval) -> Checked {
    let caps = &manifest.policy.amount_caps;
    let Some(amount) = action.amount else {
        eval.skip("amount_caps");
        return Checked::Continue;
    };
    if caps.is_empty() {
        eval.skip("amount_caps");
        return Checked::Continue;
    }

    let Some(cap) = action.currency.as_ref().and_then(|c| caps.get(c)) else {
        let currency = action.currency.clone().unwrap_or_else(|| "none".to_string());
        let eval = std::mem::replace(eval, Eval::new());
        return Checked::Done(eval.deny(
            "amount_caps",
            Reason::new(
                ReasonCode::CurrencyNotAllowed,
                format!("no amount cap configured for currency {currency}"),
            ),
        ));
    };

    eval.risk.amount_limit = Some(*cap);
    if amount > *cap {
        eval.escalate(
            "amount_caps",
            Reason::new(
                ReasonCode::AmountThreshold,
                format!("amount {amount} exceeds cap {cap}"),
            )
            .with_details(serde_json::json!({"amount": amount, "cap": cap})),
        );
    } else {
        eval.pass("amount_caps");
    }
    Checked::Continue
}

fn check_thresholds(action: &Action, manifest: &Manifest, eval: &mut Eval) {
    let matched = manifest
        .policy
        .approval_thresholds
        .iter()
        .any(|threshold| threshold.matches(action));

    if matched {
        eval.escalate(
            "approval_thresholds",
            Reason::new(
                ReasonCode::RequiresApproval,
                "an approval threshold matches this action",
            ),
        );
    } else {
        eval.pass("approval_thresholds");
    }
}

/// Compute the counter probes for an action under a manifest.
///
/// Two keys are always tracked: the action type and the global `*` key.
/// Caps come from `policy.budgets`, with the declared
/// `constraints.max_actions_per_{day,hour}` folded into the global cap.
fn budget_probes(manifest: &Manifest, action: &Action) -> Vec<CounterProbe> {
    let type_budget = manifest
        .policy
        .budgets
        .get(&action.action_type)
        .copied()
        .unwrap_or_default();
    let global_budget = manifest.policy.budgets.get("*").copied().unwrap_or_default();

    let global_daily = merge_caps(global_budget.daily, manifest.constraints.max_actions_per_day);
    let global_hourly = merge_caps(
        global_budget.hourly,
        manifest.constraints.max_actions_per_hour,
    );

    vec![
        CounterProbe {
            action_key: action.action_type.clone(),
            kind: WindowKind::Day,
            cap: type_budget.daily,
        },
        CounterProbe {
            action_key: action.action_type.clone(),
            kind: WindowKind::Hour,
            cap: type_budget.hourly,
        },
        CounterProbe {
            action_key: "*".to_string(),
            kind: WindowKind::Day,
            cap: global_daily,
        },
        CounterProbe {
            action_key: "*".to_string(),
            kind: WindowKind::Hour,
            cap: global_hourly,
        },
    ]
}

fn merge_caps(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (cap, None) | (None, cap) => cap,
    }
}
