//! The interaction record and the event it is assembled from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{AgentId, OrgId, Outcome, ReasonCode, RecordId, TraceEntry, UapkId, canonical};
use warden_crypto::{ContentHash, KeyPair, Signature};

use crate::error::{AuditError, AuditResult};

/// The structured event handed to the audit log for appending.
///
/// The log derives the hashes, chain link, and signature; the event carries
/// only what happened.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// When the decision/execution happened.
    pub timestamp: DateTime<Utc>,
    /// Organization the request belonged to.
    pub org_id: OrgId,
    /// Policy key the request was evaluated under.
    pub uapk_id: UapkId,
    /// The agent that made the request.
    pub agent_id: AgentId,
    /// Human principal, if known.
    pub user_id: Option<String>,
    /// Action type of the request.
    pub action_type: String,
    /// Tool the request targeted.
    pub tool: String,
    /// The full request payload; only its hash enters the record.
    pub request: serde_json::Value,
    /// The decision outcome.
    pub decision: Outcome,
    /// Reason codes supporting the decision.
    pub reason_codes: Vec<ReasonCode>,
    /// The ordered policy trace; only its hash enters the record.
    pub policy_trace: Vec<TraceEntry>,
    /// The execution result, if the action was executed.
    pub result: Option<serde_json::Value>,
}

impl AuditEvent {
    /// Build a minimal event, for tests and examples.
    #[must_use]
    pub fn minimal(
        org_id: impl Into<OrgId>,
        uapk_id: impl Into<UapkId>,
        agent_id: impl Into<AgentId>,
        action_type: impl Into<String>,
        tool: impl Into<String>,
        decision: Outcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            org_id: org_id.into(),
            uapk_id: uapk_id.into(),
            agent_id: agent_id.into(),
            user_id: None,
            action_type: action_type.into(),
            tool: tool.into(),
            request: serde_json::Value::Object(serde_json::Map::new()),
            decision,
            reason_codes: Vec::new(),
            policy_trace: Vec::new(),
            result: None,
        }
    }
}

/// One immutable, hash-chained, signed audit entry.
///
/// Every field is always serialized (optional ones as `null`), so a record's
/// JSON line carries the complete canonical field set and can be re-hashed
/// by any verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Unique record id.
    pub record_id: RecordId,
    /// When the decision/execution happened.
    pub timestamp: DateTime<Utc>,
    /// Organization the request belonged to.
    pub org_id: OrgId,
    /// Policy key the request was evaluated under.
    pub uapk_id: UapkId,
    /// The agent that made the request.
    pub agent_id: AgentId,
    /// Human principal, if known.
    pub user_id: Option<String>,
    /// Action type of the request.
    pub action_type: String,
    /// Tool the request targeted.
    pub tool: String,
    /// SHA-256 of the canonical request payload.
    pub request_hash: ContentHash,
    /// The decision outcome.
    pub decision: Outcome,
    /// Reason codes supporting the decision.
    pub reason_codes: Vec<ReasonCode>,
    /// SHA-256 of the canonical policy trace.
    pub policy_trace_hash: ContentHash,
    /// SHA-256 of the canonical execution result (`{}` when absent).
    pub result_hash: ContentHash,
    /// The previous record's hash; zero for a stream's first record.
    pub previous_record_hash: ContentHash,
    /// SHA-256 over this record's canonical form minus hash and signature.
    pub record_hash: ContentHash,
    /// Ed25519 signature over the record hash bytes.
    pub record_signature: Signature,
}

impl InteractionRecord {
    /// Assemble, hash, and sign a record from an event and a chain link.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if any payload fails canonical
    /// serialization.
    pub fn create(
        event: &AuditEvent,
        previous_record_hash: ContentHash,
        gateway_key: &KeyPair,
    ) -> AuditResult<Self> {
        let request_hash = canonical::canonical_hash(&event.request)?;
        let policy_trace_hash = canonical::canonical_hash(&event.policy_trace)?;
        let result_hash = match &event.result {
            Some(result) => canonical::canonical_hash(result)?,
            None => canonical::canonical_hash(&serde_json::json!({}))?,
        };

        let mut record = Self {
            record_id: RecordId::new(),
            timestamp: event.timestamp,
            org_id: event.org_id.clone(),
            uapk_id: event.uapk_id.clone(),
            agent_id: event.agent_id.clone(),
            user_id: event.user_id.clone(),
            action_type: event.action_type.clone(),
            tool: event.tool.clone(),
            request_hash,
            decision: event.decision,
            reason_codes: event.reason_codes.clone(),
            policy_trace_hash,
            result_hash,
            previous_record_hash,
            record_hash: ContentHash::zero(), // Placeholder
            record_signature: Signature::from_bytes([0u8; 64]), // Placeholder
        };

        record.record_hash = record.compute_hash()?;
        record.record_signature = gateway_key.sign(record.record_hash.as_bytes());

        Ok(record)
    }

    /// Recompute the record hash from the record's canonical form, with the
    /// `record_hash` and `record_signature` fields removed.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if serialization fails.
    pub fn compute_hash(&self) -> AuditResult<ContentHash> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;
        let Some(object) = value.as_object_mut() else {
            return Err(AuditError::Serialization(
                "record did not serialize to an object".to_string(),
            ));
        };
        object.remove("record_hash");
        object.remove("record_signature");

        canonical::canonical_hash(&value).map_err(AuditError::from)
    }

    /// Check whether this record's stored hash matches its contents.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if serialization fails.
    pub fn hash_is_consistent(&self) -> AuditResult<bool> {
        Ok(self.compute_hash()? == self.record_hash)
    }

    /// Check if this record follows another in the chain.
    #[must_use]
    pub fn follows(&self, previous: &Self) -> bool {
        self.previous_record_hash == previous.record_hash
    }

    /// The canonical JSON line for this record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if serialization fails.
    pub fn to_canonical_line(&self) -> AuditResult<String> {
        canonical::canonical_string(self).map_err(AuditError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> KeyPair {
        KeyPair::generate()
    }

    fn event() -> AuditEvent {
        let mut event = AuditEvent::minimal("org-1", "uapk-1", "agent-1", "read", "echo", Outcome::Allow);
        event.request = serde_json::json!({"params": {"x": 1}});
        event
    }

    #[test]
    fn test_create_signs_hash() {
        let key = key();
        let record = InteractionRecord::create(&event(), ContentHash::zero(), &key).unwrap();

        assert!(record.hash_is_consistent().unwrap());
        assert!(
            key.verify(record.record_hash.as_bytes(), &record.record_signature)
                .is_ok()
        );
    }

    #[test]
    fn test_tampering_detected() {
        let key = key();
        let mut record = InteractionRecord::create(&event(), ContentHash::zero(), &key).unwrap();

        record.action_type = "write".to_string();
        assert!(!record.hash_is_consistent().unwrap());
    }

    #[test]
    fn test_chain_linking() {
        let key = key();
        let first = InteractionRecord::create(&event(), ContentHash::zero(), &key).unwrap();
        let second = InteractionRecord::create(&event(), first.record_hash, &key).unwrap();

        assert!(second.follows(&first));
        assert!(!first.follows(&second));
    }

    #[test]
    fn test_missing_result_hashes_empty_object() {
        let key = key();
        let record = InteractionRecord::create(&event(), ContentHash::zero(), &key).unwrap();

        assert_eq!(
            record.result_hash,
            canonical::canonical_hash(&serde_json::json!({})).unwrap()
        );
    }

    #[test]
    fn test_canonical_line_roundtrip() {
        let key = key();
        let record = InteractionRecord::create(&event(), ContentHash::zero(), &key).unwrap();

        let line = record.to_canonical_line().unwrap();
        let parsed: InteractionRecord = serde_json::from_str(&line).unwrap();

        assert_eq!(parsed.record_hash, record.record_hash);
        assert!(parsed.hash_is_consistent().unwrap());
        // Re-serializing the parsed record reproduces the identical line.
        assert_eq!(parsed.to_canonical_line().unwrap(), line);
    }

    #[test]
    fn test_line_contains_all_fields_even_null() {
        let key = key();
        let record = InteractionRecord::create(&event(), ContentHash::zero(), &key).unwrap();

        let line = record.to_canonical_line().unwrap();
        assert!(line.contains("\"user_id\":null"));
        assert!(line.contains("\"previous_record_hash\":"));
    }
}
