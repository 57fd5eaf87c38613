//! The audit log: chained appends and chain verification.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use warden_core::{RecordId, StreamId};
use warden_crypto::{ContentHash, KeyPair, KeyRing};

use crate::error::{AuditError, AuditResult};
use crate::record::{AuditEvent, InteractionRecord};
use crate::store::AuditStore;

/// How many times an append retries after losing a tail race.
const APPEND_RETRIES: usize = 3;

/// The append-side of the audit chain.
///
/// Appends to one stream are serialized through a per-stream mutex, so the
/// optimistic tail check in the store is a safety net against other
/// processes, not the primary mechanism in-process.
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
    gateway_key: Arc<KeyPair>,
    stream_locks: Mutex<HashMap<StreamId, Arc<Mutex<()>>>>,
}

impl AuditLog {
    /// Create a log over a store and the gateway signing key.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, gateway_key: Arc<KeyPair>) -> Self {
        Self {
            store,
            gateway_key,
            stream_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    async fn stream_lock(&self, stream: &StreamId) -> Arc<Mutex<()>> {
        let mut locks = self.stream_locks.lock().await;
        locks
            .entry(stream.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append an event to a stream, returning the signed record.
    ///
    /// A failed append consumes nothing: no record id survives, the chain
    /// is unchanged, and the caller must treat the request as unrecorded.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainConflict`] if retries against concurrent
    /// writers are exhausted, or any store/serialization error.
    pub async fn append(
        &self,
        stream: &StreamId,
        event: AuditEvent,
    ) -> AuditResult<InteractionRecord> {
        let lock = self.stream_lock(stream).await;
        let _guard = lock.lock().await;

        let mut last_err = None;
        for attempt in 0..APPEND_RETRIES {
            let tail = self.store.tail_hash(stream).await?;
            let record = InteractionRecord::create(&event, tail, &self.gateway_key)?;

            match self.store.append(stream, record.clone(), &tail).await {
                Ok(()) => {
                    debug!(
                        stream = %stream,
                        record_id = %record.record_id,
                        decision = %record.decision,
                        "interaction record appended"
                    );
                    return Ok(record);
                },
                Err(AuditError::ChainConflict { .. }) if attempt + 1 < APPEND_RETRIES => {
                    // Another writer moved the tail; rebuild against it.
                    warn!(stream = %stream, attempt, "audit append lost tail race, retrying");
                },
                Err(AuditError::ChainConflict { stream, expected }) => {
                    last_err = Some(AuditError::ChainConflict { stream, expected });
                    break;
                },
                Err(other) => return Err(other),
            }
        }

        Err(last_err.unwrap_or_else(|| AuditError::Store("append retries exhausted".to_string())))
    }

    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get(
        &self,
        stream: &StreamId,
        record_id: &RecordId,
    ) -> AuditResult<Option<InteractionRecord>> {
        self.store.get(stream, record_id).await
    }

    /// Verify an entire stream: hashes, linkage, signatures.
    ///
    /// Verification stops at the first broken record and reports its index.
    ///
    /// # Errors
    ///
    /// Returns an error only for backend faults; a broken chain is a report,
    /// not an error.
    pub async fn verify_chain(
        &self,
        stream: &StreamId,
        keys: &KeyRing,
    ) -> AuditResult<ChainVerificationReport> {
        let records = self.store.read_all(stream).await?;
        Ok(verify_records(&records, keys))
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("key_id", &self.gateway_key.key_id())
            .finish_non_exhaustive()
    }
}

/// Verify a slice of records as one chain.
#[must_use]
pub(crate) fn verify_records(
    records: &[InteractionRecord],
    keys: &KeyRing,
) -> ChainVerificationReport {
    let mut previous_hash = ContentHash::zero();

    for (index, record) in records.iter().enumerate() {
        match record.compute_hash() {
            Ok(computed) if computed == record.record_hash => {},
            Ok(_) => {
                return ChainVerificationReport::failed(
                    index,
                    record,
                    "record hash does not match contents",
                );
            },
            Err(e) => {
                return ChainVerificationReport::failed(index, record, &e.to_string());
            },
        }

        if record.previous_record_hash != previous_hash {
            return ChainVerificationReport::failed(index, record, "chain link broken");
        }

        if keys
            .verify(record.record_hash.as_bytes(), &record.record_signature)
            .is_err()
        {
            return ChainVerificationReport::failed(index, record, "signature invalid");
        }

        previous_hash = record.record_hash;
    }

    ChainVerificationReport {
        ok: true,
        verified_count: records.len(),
        first_failure: None,
    }
}

/// Where and why a chain broke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainFailure {
    /// Zero-based index of the first broken record.
    pub index: usize,
    /// Its record id.
    pub record_id: RecordId,
    /// What failed: hash mismatch, broken link, or bad signature.
    pub reason: String,
}

/// Result of verifying one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerificationReport {
    /// Whether every record verified.
    pub ok: bool,
    /// Records verified before stopping.
    pub verified_count: usize,
    /// The first failure, when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<ChainFailure>,
}

impl ChainVerificationReport {
    fn failed(index: usize, record: &InteractionRecord, reason: &str) -> Self {
        Self {
            ok: false,
            verified_count: index,
            first_failure: Some(ChainFailure {
                index,
                record_id: record.record_id.clone(),
                reason: reason.to_string(),
            }),
        }
    }
}
