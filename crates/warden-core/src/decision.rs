//! The engine's verdict: outcome, structured reasons, and the policy trace.
//!
//! A `Decision` is a value, never an error. Policy denials and escalations
//! flow back to the caller through this type; only infrastructure faults
//! use the error channel.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::ApprovalId;

/// The three-valued outcome of policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The action may proceed to execution.
    Allow,
    /// The action is refused.
    Deny,
    /// The action needs human approval before it may proceed.
    Escalate,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::Deny => write!(f, "DENY"),
            Self::Escalate => write!(f, "ESCALATE"),
        }
    }
}

/// Machine-readable reason codes attached to decisions and trace entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// No active manifest exists for `(org, uapk)`.
    ManifestNotFound,
    /// A manifest exists but is not in ACTIVE status.
    ManifestInactive,
    /// The requested tool is not configured in the manifest.
    ToolNotConfigured,
    /// The tool is on the manifest deny list.
    ToolDenied,
    /// A tool allow list is present and the tool is not on it.
    ToolNotAllowed,
    /// Capability token failed signature or structural validation.
    TokenInvalid,
    /// Capability token is expired.
    TokenExpired,
    /// Capability token does not grant the requested action.
    CapabilityMissing,
    /// Override token failed signature or structural validation.
    OverrideTokenInvalid,
    /// Override token is expired.
    OverrideTokenExpired,
    /// Override token was already consumed.
    OverrideTokenConsumed,
    /// Override token is bound to a different action fingerprint.
    OverrideTokenMismatch,
    /// Counterparty jurisdiction is outside the allow list.
    JurisdictionBlocked,
    /// Counterparty host matches the deny list.
    CounterpartyBlocked,
    /// A counterparty allow list is present and the host is not on it.
    CounterpartyNotAllowed,
    /// Amount exceeds the configured cap for its currency.
    AmountThreshold,
    /// The action carries a currency with no configured cap.
    CurrencyNotAllowed,
    /// The action requires human approval.
    RequiresApproval,
    /// The daily budget for this action type is exhausted.
    BudgetExceededDay,
    /// The hourly budget for this action type is exhausted.
    BudgetExceededHour,
    /// A concurrent execution won the last budget slot.
    BudgetExceededRace,
    /// The request arrived outside the manifest's allowed hours.
    OutsideAllowedHours,
    /// A valid override token short-circuited pending escalations.
    OverrideApplied,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Matches the serde wire form.
        let s = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// One structured reason supporting a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reason {
    /// Machine-readable code.
    pub code: ReasonCode,
    /// Human-readable explanation.
    pub message: String,
    /// Optional structured detail (limits, observed values).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Reason {
    /// Create a reason with a code and message.
    #[must_use]
    pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Result of a single policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckResult {
    /// The check passed.
    Pass,
    /// The check failed (contributes a DENY).
    Fail,
    /// The check requests escalation.
    Escalate,
    /// The check did not apply to this action.
    Skip,
}

/// One entry in the ordered policy trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Name of the check, e.g. `"budgets"` or `"tool_lists"`.
    pub check: String,
    /// What the check concluded.
    pub result: CheckResult,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl TraceEntry {
    /// Create a trace entry.
    #[must_use]
    pub fn new(check: impl Into<String>, result: CheckResult) -> Self {
        Self {
            check: check.into(),
            result,
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Budget usage for one action type at evaluation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetUsage {
    /// Actions counted in the current UTC day window.
    pub day: u64,
    /// Actions counted in the current UTC hour window.
    pub hour: u64,
}

/// Snapshot of risk-relevant state at evaluation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Observed budget usage per action type key.
    #[serde(default)]
    pub budgets_used: BTreeMap<String, BudgetUsage>,
    /// The amount cap that applied, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_limit: Option<f64>,
}

/// The engine's full verdict for one `(Context, Action)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// ALLOW, DENY, or ESCALATE.
    pub outcome: Outcome,
    /// Structured reasons, most significant first.
    pub reasons: Vec<Reason>,
    /// Ordered trace of every check the engine ran.
    pub policy_trace: Vec<TraceEntry>,
    /// Risk-relevant state observed during evaluation.
    pub risk_snapshot: RiskSnapshot,
    /// The approval backing an ESCALATE outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<ApprovalId>,
    /// `jti` of the override token that authorized this ALLOW, if one did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_override_token_id: Option<String>,
}

impl Decision {
    /// Check if the outcome is ALLOW.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.outcome == Outcome::Allow
    }

    /// Check if the outcome is DENY.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.outcome == Outcome::Deny
    }

    /// Check if the outcome is ESCALATE.
    #[must_use]
    pub fn is_escalate(&self) -> bool {
        self.outcome == Outcome::Escalate
    }

    /// The reason codes in order.
    #[must_use]
    pub fn reason_codes(&self) -> Vec<ReasonCode> {
        self.reasons.iter().map(|r| r.code).collect()
    }

    /// Check whether a specific reason code is present.
    #[must_use]
    pub fn has_reason(&self, code: ReasonCode) -> bool {
        self.reasons.iter().any(|r| r.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_form() {
        assert_eq!(
            serde_json::to_string(&Outcome::Allow).unwrap(),
            "\"ALLOW\""
        );
        assert_eq!(
            serde_json::to_string(&Outcome::Escalate).unwrap(),
            "\"ESCALATE\""
        );
    }

    #[test]
    fn test_reason_code_wire_form() {
        assert_eq!(
            serde_json::to_string(&ReasonCode::BudgetExceededDay).unwrap(),
            "\"BUDGET_EXCEEDED_DAY\""
        );
        assert_eq!(ReasonCode::ManifestNotFound.to_string(), "MANIFEST_NOT_FOUND");
    }

    #[test]
    fn test_check_result_wire_form() {
        assert_eq!(
            serde_json::to_string(&CheckResult::Escalate).unwrap(),
            "\"escalate\""
        );
    }

    #[test]
    fn test_decision_helpers() {
        let decision = Decision {
            outcome: Outcome::Deny,
            reasons: vec![Reason::new(ReasonCode::ToolDenied, "tool on deny list")],
            policy_trace: vec![TraceEntry::new("tool_lists", CheckResult::Fail)],
            risk_snapshot: RiskSnapshot::default(),
            approval_id: None,
            consumed_override_token_id: None,
        };

        assert!(decision.is_deny());
        assert!(decision.has_reason(ReasonCode::ToolDenied));
        assert_eq!(decision.reason_codes(), vec![ReasonCode::ToolDenied]);
    }
}
