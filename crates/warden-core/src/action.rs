//! The request model: what an agent proposes to do, and on whose behalf.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_crypto::ContentHash;

use crate::canonical;
use crate::error::CoreResult;
use crate::ids::{AgentId, OrgId, RequestId, UapkId};

/// A proposed operation by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Action type, e.g. `"send_email"` or `"refund"`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Name of the manifest tool the action wants to invoke.
    pub tool: String,
    /// Free-form tool parameters.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Monetary amount, for actions that move value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// ISO currency code accompanying `amount`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// The external party the action is directed at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<Counterparty>,
}

impl Action {
    /// Create an action with just a type and tool.
    #[must_use]
    pub fn new(action_type: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            tool: tool.into(),
            params: serde_json::Value::Object(serde_json::Map::new()),
            amount: None,
            currency: None,
            counterparty: None,
        }
    }

    /// Set the tool parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Set amount and currency.
    #[must_use]
    pub fn with_amount(mut self, amount: f64, currency: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    /// Set the counterparty.
    #[must_use]
    pub fn with_counterparty(mut self, counterparty: Counterparty) -> Self {
        self.counterparty = Some(counterparty);
        self
    }

    /// Compute the action fingerprint binding override tokens to this action.
    ///
    /// The fingerprint covers the fields that identify "the same action" for
    /// approval purposes: uapk, type, tool, amount, currency, and the
    /// counterparty host. Params are deliberately excluded so a retried
    /// request with identical intent maps to the same approval.
    ///
    /// # Errors
    ///
    /// Returns an error if canonical serialization fails.
    pub fn fingerprint(&self, uapk_id: &UapkId) -> CoreResult<ContentHash> {
        #[derive(Serialize)]
        struct FingerprintFields<'a> {
            uapk_id: &'a str,
            #[serde(rename = "type")]
            action_type: &'a str,
            tool: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            amount: Option<f64>,
            #[serde(skip_serializing_if = "Option::is_none")]
            currency: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            counterparty_host: Option<&'a str>,
        }

        canonical::canonical_hash(&FingerprintFields {
            uapk_id: uapk_id.as_str(),
            action_type: &self.action_type,
            tool: &self.tool,
            amount: self.amount,
            currency: self.currency.as_deref(),
            counterparty_host: self
                .counterparty
                .as_ref()
                .and_then(|c| c.host.as_deref()),
        })
    }
}

/// The external party an action is directed at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counterparty {
    /// Caller-side identifier of the counterparty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Hostname of the counterparty endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// ISO 3166-1 alpha-2 country code of the counterparty's jurisdiction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
}

/// Who is asking, and with what credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Organization the request belongs to.
    pub org_id: OrgId,
    /// Policy key the request is evaluated under.
    pub uapk_id: UapkId,
    /// The agent instance making the request.
    pub agent_id: AgentId,
    /// Human principal on whose behalf the agent acts, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Compact capability token presented by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_token: Option<String>,
    /// Compact override token unblocking a previously escalated action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_token: Option<String>,
    /// Caller idempotency key.
    pub request_id: RequestId,
    /// Absolute deadline for serving this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl Context {
    /// Create a context with the mandatory identity fields.
    #[must_use]
    pub fn new(
        org_id: impl Into<OrgId>,
        uapk_id: impl Into<UapkId>,
        agent_id: impl Into<AgentId>,
        request_id: impl Into<RequestId>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            uapk_id: uapk_id.into(),
            agent_id: agent_id.into(),
            user_id: None,
            capability_token: None,
            override_token: None,
            request_id: request_id.into(),
            deadline: None,
        }
    }

    /// Attach a capability token.
    #[must_use]
    pub fn with_capability_token(mut self, token: impl Into<String>) -> Self {
        self.capability_token = Some(token.into());
        self
    }

    /// Attach an override token.
    #[must_use]
    pub fn with_override_token(mut self, token: impl Into<String>) -> Self {
        self.override_token = Some(token.into());
        self
    }

    /// Attach a deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_stable() {
        let uapk = UapkId::new("uapk-1");
        let action = Action::new("refund", "payments").with_amount(500.0, "EUR");

        let fp1 = action.fingerprint(&uapk).unwrap();
        let fp2 = action.fingerprint(&uapk).unwrap();
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn test_fingerprint_ignores_params() {
        let uapk = UapkId::new("uapk-1");
        let a = Action::new("refund", "payments").with_params(serde_json::json!({"note": "x"}));
        let b = Action::new("refund", "payments").with_params(serde_json::json!({"note": "y"}));

        assert_eq!(a.fingerprint(&uapk).unwrap(), b.fingerprint(&uapk).unwrap());
    }

    #[test]
    fn test_fingerprint_binds_amount_and_host() {
        let uapk = UapkId::new("uapk-1");
        let base = Action::new("refund", "payments").with_amount(500.0, "EUR");
        let other_amount = Action::new("refund", "payments").with_amount(501.0, "EUR");
        let other_host = base.clone().with_counterparty(Counterparty {
            host: Some("shop.example.com".to_string()),
            ..Counterparty::default()
        });

        let fp = base.fingerprint(&uapk).unwrap();
        assert_ne!(fp, other_amount.fingerprint(&uapk).unwrap());
        assert_ne!(fp, other_host.fingerprint(&uapk).unwrap());
    }

    #[test]
    fn test_fingerprint_binds_uapk() {
        let action = Action::new("read", "echo");
        let fp1 = action.fingerprint(&UapkId::new("uapk-1")).unwrap();
        let fp2 = action.fingerprint(&UapkId::new("uapk-2")).unwrap();
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn test_action_type_serializes_as_type() {
        let action = Action::new("read", "echo");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "read");
        assert_eq!(json["tool"], "echo");
    }
}
