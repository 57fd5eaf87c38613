//! Audit store trait, in-memory implementation, and JSONL file store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::RwLock;
use warden_core::{RecordId, StreamId};
use warden_crypto::ContentHash;

use crate::error::{AuditError, AuditResult};
use crate::record::InteractionRecord;

/// Storage seam for interaction records.
///
/// Appends are optimistic: the caller states the tail hash it built the
/// record against, and the store refuses with [`AuditError::ChainConflict`]
/// if the stream has moved. A refused append leaves no trace - record ids
/// are minted by the caller and simply discarded on conflict.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a record whose `previous_record_hash` is `expected_tail`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainConflict`] if the stream tail is no
    /// longer `expected_tail`, or a backend error.
    async fn append(
        &self,
        stream: &StreamId,
        record: InteractionRecord,
        expected_tail: &ContentHash,
    ) -> AuditResult<()>;

    /// The hash of the last record in a stream (zero for an empty stream).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn tail_hash(&self, stream: &StreamId) -> AuditResult<ContentHash>;

    /// All records of a stream, in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn read_all(&self, stream: &StreamId) -> AuditResult<Vec<InteractionRecord>>;

    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get(
        &self,
        stream: &StreamId,
        record_id: &RecordId,
    ) -> AuditResult<Option<InteractionRecord>>;

    /// Number of records in a stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn count(&self, stream: &StreamId) -> AuditResult<usize>;
}

/// In-memory audit store (tests and single-process deployments).
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    streams: RwLock<HashMap<StreamId, Vec<InteractionRecord>>>,
}

impl MemoryAuditStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(
        &self,
        stream: &StreamId,
        record: InteractionRecord,
        expected_tail: &ContentHash,
    ) -> AuditResult<()> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| AuditError::Store("lock poisoned".to_string()))?;
        let records = streams.entry(stream.clone()).or_default();

        let tail = records
            .last()
            .map_or_else(ContentHash::zero, |r| r.record_hash);
        if tail != *expected_tail {
            return Err(AuditError::ChainConflict {
                stream: stream.to_string(),
                expected: expected_tail.to_hex(),
            });
        }

        records.push(record);
        Ok(())
    }

    async fn tail_hash(&self, stream: &StreamId) -> AuditResult<ContentHash> {
        let streams = self
            .streams
            .read()
            .map_err(|_| AuditError::Store("lock poisoned".to_string()))?;
        Ok(streams
            .get(stream)
            .and_then(|records| records.last())
            .map_or_else(ContentHash::zero, |r| r.record_hash))
    }

    async fn read_all(&self, stream: &StreamId) -> AuditResult<Vec<InteractionRecord>> {
        let streams = self
            .streams
            .read()
            .map_err(|_| AuditError::Store("lock poisoned".to_string()))?;
        Ok(streams.get(stream).cloned().unwrap_or_default())
    }

    async fn get(
        &self,
        stream: &StreamId,
        record_id: &RecordId,
    ) -> AuditResult<Option<InteractionRecord>> {
        let streams = self
            .streams
            .read()
            .map_err(|_| AuditError::Store("lock poisoned".to_string()))?;
        Ok(streams
            .get(stream)
            .and_then(|records| records.iter().find(|r| r.record_id == *record_id))
            .cloned())
    }

    async fn count(&self, stream: &StreamId) -> AuditResult<usize> {
        let streams = self
            .streams
            .read()
            .map_err(|_| AuditError::Store("lock poisoned".to_string()))?;
        Ok(streams.get(stream).map_or(0, Vec::len))
    }
}

/// Append-only JSONL file store: one file per stream, one canonical JSON
/// line per record.
///
/// This is the on-disk contract for interaction records: each line is
/// self-sufficient for verification given the prior line's `record_hash`
/// and a public key set. The store keeps an in-memory copy for reads; the
/// file is the durable projection.
#[derive(Debug)]
pub struct JsonlAuditStore {
    dir: PathBuf,
    cache: MemoryAuditStore,
}

impl JsonlAuditStore {
    /// Open (or create) a store rooted at a directory. Existing stream
    /// files are loaded and their records become the in-memory state.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// file fails to parse.
    pub fn open(dir: impl Into<PathBuf>) -> AuditResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let store = Self {
            dir,
            cache: MemoryAuditStore::new(),
        };
        store.load_existing()?;
        Ok(store)
    }

    fn load_existing(&self) -> AuditResult<()> {
        let mut streams = self
            .cache
            .streams
            .write()
            .map_err(|_| AuditError::Store("lock poisoned".to_string()))?;

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stream_name) = name.strip_suffix(".jsonl") else {
                continue;
            };

            let content = std::fs::read_to_string(&path)?;
            let mut records = Vec::new();
            for (idx, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: InteractionRecord = serde_json::from_str(line).map_err(|e| {
                    AuditError::Store(format!("{name} line {}: {e}", idx.saturating_add(1)))
                })?;
                records.push(record);
            }
            streams.insert(StreamId::new(stream_name), records);
        }
        Ok(())
    }

    fn stream_path(&self, stream: &StreamId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", stream.as_str()))
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn append(
        &self,
        stream: &StreamId,
        record: InteractionRecord,
        expected_tail: &ContentHash,
    ) -> AuditResult<()> {
        let line = record.to_canonical_line()?;

        // Commit to memory first; a conflict never touches the file.
        self.cache.append(stream, record, expected_tail).await?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.stream_path(stream))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        Ok(())
    }

    async fn tail_hash(&self, stream: &StreamId) -> AuditResult<ContentHash> {
        self.cache.tail_hash(stream).await
    }

    async fn read_all(&self, stream: &StreamId) -> AuditResult<Vec<InteractionRecord>> {
        self.cache.read_all(stream).await
    }

    async fn get(
        &self,
        stream: &StreamId,
        record_id: &RecordId,
    ) -> AuditResult<Option<InteractionRecord>> {
        self.cache.get(stream, record_id).await
    }

    async fn count(&self, stream: &StreamId) -> AuditResult<usize> {
        self.cache.count(stream).await
    }
}
