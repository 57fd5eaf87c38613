//! The manifest document model.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use warden_core::{Action, OrgId, UapkId};

use crate::error::{ManifestError, ManifestResult};
use crate::pattern::HostPattern;

/// Lifecycle status of a manifest version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ManifestStatus {
    /// Editable, not yet enforceable.
    Draft,
    /// The single enforceable version for its `(org, uapk)`.
    Active,
    /// Temporarily withdrawn; may be re-activated.
    Suspended,
    /// Permanently withdrawn.
    Revoked,
}

impl fmt::Display for ManifestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Suspended => write!(f, "SUSPENDED"),
            Self::Revoked => write!(f, "REVOKED"),
        }
    }
}

/// Reference to a secret resolved through the injected secrets provider.
///
/// Manifests never embed secret material, only names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRef {
    /// Auth scheme, e.g. `"bearer"` or `"basic"`.
    pub scheme: String,
    /// Name to resolve through the secrets provider.
    pub secret_name: String,
}

/// Configuration of an `http` or `webhook` tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpToolConfig {
    /// HTTP method; defaults to POST for webhooks and GET for http tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Base URL the tool talks to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Full URL, for tools that always hit one endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Host patterns the tool may reach. Empty falls back to the
    /// process-wide default list; if both are empty, execution is denied.
    pub allowed_domains: Vec<HostPattern>,
    /// Outbound authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthRef>,
    /// Per-call timeout override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Permit plain http for this tool (otherwise https is required).
    pub allow_http: bool,
}

impl HttpToolConfig {
    /// The endpoint this tool targets (`url` wins over `base_url`).
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.url.as_deref().or(self.base_url.as_deref())
    }
}

/// Configuration of a `mock` tool (tests and dry runs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockToolConfig {
    /// Fixed result returned by the mock; defaults to echoing params.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// A tool entry: execution kind plus kind-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "config", rename_all = "lowercase")]
pub enum ToolSpec {
    /// Outbound HTTP API call.
    Http(HttpToolConfig),
    /// Outbound webhook delivery.
    Webhook(HttpToolConfig),
    /// In-process mock, for tests and dry runs.
    Mock(MockToolConfig),
}

impl ToolSpec {
    /// The kind name as it appears on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Webhook(_) => "webhook",
            Self::Mock(_) => "mock",
        }
    }

    /// The HTTP configuration, for http/webhook tools.
    #[must_use]
    pub fn http_config(&self) -> Option<&HttpToolConfig> {
        match self {
            Self::Http(config) | Self::Webhook(config) => Some(config),
            Self::Mock(_) => None,
        }
    }
}

/// Declared operating constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    /// Cap on total actions per UTC day (enforced as a global budget).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_actions_per_day: Option<u64>,
    /// Cap on total actions per UTC hour (enforced as a global budget).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_actions_per_hour: Option<u64>,
    /// Action types that always need human approval.
    pub require_human_approval: BTreeSet<String>,
    /// UTC hours during which actions are allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_hours: Option<AllowedHours>,
}

/// A daily operating window in UTC hours.
///
/// `start` is inclusive, `end` exclusive. A window may wrap midnight
/// (`start > end`), e.g. `22..6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedHours {
    /// First allowed hour (0-23).
    pub start: u8,
    /// First disallowed hour (0-24).
    pub end: u8,
}

impl AllowedHours {
    /// Check whether a UTC hour falls inside the window.
    #[must_use]
    pub fn contains(&self, hour: u8) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

/// Budget for one action type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
    /// Maximum executions per UTC day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<u64>,
    /// Maximum executions per UTC hour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly: Option<u64>,
}

/// One approval threshold: an escalation trigger over action attributes.
///
/// Every present field must match for the threshold to fire. An `amount`
/// field fires when the action's amount is greater than or equal to it; if
/// `currency` is also present, only that currency is compared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalThreshold {
    /// Action types the threshold applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_types: Option<BTreeSet<String>>,
    /// Tools the threshold applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<BTreeSet<String>>,
    /// Amount at or above which the threshold fires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Currency the amount comparison is scoped to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ApprovalThreshold {
    /// Check whether an action trips this threshold.
    #[must_use]
    pub fn matches(&self, action: &Action) -> bool {
        if let Some(types) = &self.action_types {
            if !types.contains(&action.action_type) {
                return false;
            }
        }
        if let Some(tools) = &self.tools {
            if !tools.contains(&action.tool) {
                return false;
            }
        }
        if let Some(threshold) = self.amount {
            let Some(amount) = action.amount else {
                return false;
            };
            if let Some(currency) = &self.currency {
                if action.currency.as_deref() != Some(currency.as_str()) {
                    return false;
                }
            }
            if amount < threshold {
                return false;
            }
        }
        true
    }
}

/// The enforceable policy rules of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRules {
    /// Per-action-type budgets. The key `"*"` is the global budget.
    pub budgets: BTreeMap<String, Budget>,
    /// Counterparty hosts that are always allowed (suffix semantics).
    /// When present, hosts not on the list are denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_allow: Option<Vec<String>>,
    /// Counterparty hosts that are always denied (suffix semantics).
    pub counterparty_deny: Vec<String>,
    /// ISO 3166-1 alpha-2 codes of allowed counterparty jurisdictions.
    /// Empty means no jurisdiction filtering.
    pub jurisdiction_allow: BTreeSet<String>,
    /// Tools the agent may use. When present, others are denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_allow: Option<BTreeSet<String>>,
    /// Tools the agent may never use.
    pub tool_deny: BTreeSet<String>,
    /// Per-currency caps above which amounts escalate.
    pub amount_caps: BTreeMap<String, f64>,
    /// Escalation triggers over action attributes.
    pub approval_thresholds: Vec<ApprovalThreshold>,
    /// Require a valid capability token on every request.
    pub require_capability_token: bool,
}

/// A versioned, immutable policy document for one `(org, uapk)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Semver version string; versions are never mutated in place.
    pub version: String,
    /// Policy key this manifest governs.
    pub uapk_id: UapkId,
    /// Organization owning the policy key.
    pub org_id: OrgId,
    /// Tools the agent may invoke, by name.
    pub tools: BTreeMap<String, ToolSpec>,
    /// Capability strings the agent declares it wants.
    pub capabilities_requested: BTreeSet<String>,
    /// Declared operating constraints.
    #[serde(default)]
    pub constraints: Constraints,
    /// Enforceable policy rules.
    #[serde(default)]
    pub policy: PolicyRules,
    /// Lifecycle status.
    #[serde(default = "default_status")]
    pub status: ManifestStatus,
    /// Unknown top-level fields, preserved for forward compatibility.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

fn default_status() -> ManifestStatus {
    ManifestStatus::Draft
}

impl Manifest {
    /// Parse and validate a manifest from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] on malformed JSON or
    /// [`ManifestError::Validation`] when a field is out of range.
    pub fn from_json(json: &str) -> ManifestResult<Self> {
        let manifest: Self =
            serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the document. Called once at load; the engine assumes
    /// validated values.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Validation`] for the first field found out
    /// of range.
    pub fn validate(&self) -> ManifestResult<()> {
        if !is_semver_like(&self.version) {
            return Err(invalid("version", "expected MAJOR.MINOR.PATCH"));
        }
        if self.uapk_id.as_str().is_empty() {
            return Err(invalid("uapk_id", "must not be empty"));
        }
        if self.org_id.as_str().is_empty() {
            return Err(invalid("org_id", "must not be empty"));
        }

        for (name, spec) in &self.tools {
            if name.is_empty() {
                return Err(invalid("tools", "tool names must not be empty"));
            }
            if let Some(config) = spec.http_config() {
                if config.endpoint().is_none() {
                    return Err(invalid(
                        &format!("tools.{name}"),
                        "http/webhook tools need base_url or url",
                    ));
                }
            }
        }

        if let Some(hours) = &self.constraints.allowed_hours {
            if hours.start > 23 || hours.end > 24 {
                return Err(invalid(
                    "constraints.allowed_hours",
                    "hours must be within 0-23 (start) and 0-24 (end)",
                ));
            }
        }

        for (action_type, budget) in &self.policy.budgets {
            if budget.daily == Some(0) || budget.hourly == Some(0) {
                return Err(invalid(
                    &format!("policy.budgets.{action_type}"),
                    "budget caps must be at least 1",
                ));
            }
        }

        for (currency, cap) in &self.policy.amount_caps {
            if !cap.is_finite() || *cap < 0.0 {
                return Err(invalid(
                    &format!("policy.amount_caps.{currency}"),
                    "cap must be a finite non-negative number",
                ));
            }
        }

        for (idx, threshold) in self.policy.approval_thresholds.iter().enumerate() {
            if let Some(amount) = threshold.amount {
                if !amount.is_finite() || amount < 0.0 {
                    return Err(invalid(
                        &format!("policy.approval_thresholds[{idx}].amount"),
                        "amount must be a finite non-negative number",
                    ));
                }
            }
            if threshold.action_types.is_none()
                && threshold.tools.is_none()
                && threshold.amount.is_none()
            {
                return Err(invalid(
                    &format!("policy.approval_thresholds[{idx}]"),
                    "threshold must constrain at least one attribute",
                ));
            }
        }

        Ok(())
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }
}

fn invalid(field: &str, message: &str) -> ManifestError {
    ManifestError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn is_semver_like(version: &str) -> bool {
    let mut parts = 0;
    for part in version.split('.') {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        parts += 1;
    }
    parts == 3
}
