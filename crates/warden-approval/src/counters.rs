//! Windowed action counters backing budget enforcement.
//!
//! Counters are keyed by `(org, uapk, action_key, window)` where the window
//! is the UTC-aligned hour or day containing `now`. Old windows are simply
//! never written again; there is no decay job.
//!
//! The contract splits reads from writes deliberately: evaluation peeks,
//! execution commits. [`CounterStore::try_increment`] is the only mutating
//! entry point and performs check-and-increment per key with rollback, so
//! concurrent executions cannot push a count past its cap.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use warden_core::{OrgId, UapkId};

use crate::error::ApprovalResult;

/// The two budget window granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// One UTC hour.
    Hour,
    /// One UTC day.
    Day,
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
        }
    }
}

/// The UTC-aligned start of the window containing `now`.
#[must_use]
pub fn window_start(kind: WindowKind, now: DateTime<Utc>) -> DateTime<Utc> {
    let base = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now);
    match kind {
        WindowKind::Day => base,
        WindowKind::Hour => base + chrono::Duration::hours(i64::from(now.hour())),
    }
}

/// One cap-checked increment request.
#[derive(Debug, Clone)]
pub struct CounterProbe {
    /// Action type key; `"*"` is the global counter.
    pub action_key: String,
    /// Which window to count in.
    pub kind: WindowKind,
    /// Cap to enforce, if any. `None` counts without a limit.
    pub cap: Option<u64>,
}

/// A cap that would have been breached by an increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetBreach {
    /// The action key whose cap was hit.
    pub action_key: String,
    /// The window granularity of the breached cap.
    pub kind: WindowKind,
    /// The configured cap.
    pub cap: u64,
    /// The count observed at the time of the attempt.
    pub count: u64,
}

/// Storage seam for windowed counters.
///
/// The in-memory implementation is a process-local map; a production
/// backend implements the same contract with row locks or atomic updates.
/// Whatever the backend, `try_increment` must be atomic per key and must
/// roll back fully when any probe's cap is hit.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Peek the count for one key and window. Never mutates.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn count(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        action_key: &str,
        kind: WindowKind,
        now: DateTime<Utc>,
    ) -> ApprovalResult<u64>;

    /// Increment every probe's counter by one, atomically per key, rolling
    /// back all increments if any probe's cap is already reached.
    ///
    /// Returns `Ok(Err(breach))` when a cap was hit - that is a policy
    /// outcome for the caller, not a fault.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend fails.
    async fn try_increment(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        probes: &[CounterProbe],
        now: DateTime<Utc>,
    ) -> ApprovalResult<Result<(), BudgetBreach>>;
}

type CounterKey = (OrgId, UapkId, String, WindowKind, i64);

/// In-memory counter store built on a sharded concurrent map.
///
/// Each entry update holds the shard lock for that key, which makes the
/// per-key check-and-increment atomic without a global lock.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counts: DashMap<CounterKey, u64>,
}

impl MemoryCounterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(
        org_id: &OrgId,
        uapk_id: &UapkId,
        action_key: &str,
        kind: WindowKind,
        now: DateTime<Utc>,
    ) -> CounterKey {
        (
            org_id.clone(),
            uapk_id.clone(),
            action_key.to_string(),
            kind,
            window_start(kind, now).timestamp(),
        )
    }

    /// Check-and-increment one key. Returns the observed count on breach.
    fn bump(&self, key: CounterKey, cap: Option<u64>) -> Result<(), u64> {
        let mut entry = self.counts.entry(key).or_insert(0);
        if let Some(cap) = cap {
            if *entry >= cap {
                return Err(*entry);
            }
        }
        *entry = entry.saturating_add(1);
        Ok(())
    }

    fn unbump(&self, key: &CounterKey) {
        if let Some(mut entry) = self.counts.get_mut(key) {
            *entry = entry.saturating_sub(1);
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn count(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        action_key: &str,
        kind: WindowKind,
        now: DateTime<Utc>,
    ) -> ApprovalResult<u64> {
        let key = Self::key(org_id, uapk_id, action_key, kind, now);
        Ok(self.counts.get(&key).map(|e| *e).unwrap_or(0))
    }

    async fn try_increment(
        &self,
        org_id: &OrgId,
        uapk_id: &UapkId,
        probes: &[CounterProbe],
        now: DateTime<Utc>,
    ) -> ApprovalResult<Result<(), BudgetBreach>> {
        let mut committed: Vec<CounterKey> = Vec::with_capacity(probes.len());

        for probe in probes {
            let key = Self::key(org_id, uapk_id, &probe.action_key, probe.kind, now);
            match self.bump(key.clone(), probe.cap) {
                Ok(()) => committed.push(key),
                Err(count) => {
                    // Roll back everything this call already took.
                    for key in &committed {
                        self.unbump(key);
                    }
                    debug!(
                        action_key = %probe.action_key,
                        kind = %probe.kind,
                        count,
                        "budget cap hit, increments rolled back"
                    );
                    return Ok(Err(BudgetBreach {
                        action_key: probe.action_key.clone(),
                        kind: probe.kind,
                        cap: probe.cap.unwrap_or(0),
                        count,
                    }));
                },
            }
        }

        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ids() -> (OrgId, UapkId) {
        (OrgId::new("org-1"), UapkId::new("uapk-1"))
    }

    fn probe(action_key: &str, kind: WindowKind, cap: Option<u64>) -> CounterProbe {
        CounterProbe {
            action_key: action_key.to_string(),
            kind,
            cap,
        }
    }

    #[test]
    fn test_window_start_alignment() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 14, 35, 12).unwrap();

        assert_eq!(
            window_start(WindowKind::Day, now),
            Utc.with_ymd_and_hms(2025, 3, 7, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window_start(WindowKind::Hour, now),
            Utc.with_ymd_and_hms(2025, 3, 7, 14, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_count_and_increment() {
        let store = MemoryCounterStore::new();
        let (org, uapk) = ids();
        let now = Utc::now();

        assert_eq!(
            store
                .count(&org, &uapk, "send_email", WindowKind::Day, now)
                .await
                .unwrap(),
            0
        );

        store
            .try_increment(
                &org,
                &uapk,
                &[probe("send_email", WindowKind::Day, Some(5))],
                now,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            store
                .count(&org, &uapk, "send_email", WindowKind::Day, now)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_cap_enforced() {
        let store = MemoryCounterStore::new();
        let (org, uapk) = ids();
        let now = Utc::now();
        let probes = [probe("send_email", WindowKind::Day, Some(2))];

        for _ in 0..2 {
            store
                .try_increment(&org, &uapk, &probes, now)
                .await
                .unwrap()
                .unwrap();
        }

        let breach = store
            .try_increment(&org, &uapk, &probes, now)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(breach.cap, 2);
        assert_eq!(breach.count, 2);
    }

    #[tokio::test]
    async fn test_breach_rolls_back_partial_increments() {
        let store = MemoryCounterStore::new();
        let (org, uapk) = ids();
        let now = Utc::now();

        // The hour cap is already exhausted.
        store
            .try_increment(&org, &uapk, &[probe("x", WindowKind::Hour, None)], now)
            .await
            .unwrap()
            .unwrap();

        let probes = [
            probe("x", WindowKind::Day, Some(10)),
            probe("x", WindowKind::Hour, Some(1)),
        ];
        let result = store.try_increment(&org, &uapk, &probes, now).await.unwrap();
        assert!(result.is_err());

        // The day increment must have been rolled back.
        assert_eq!(
            store
                .count(&org, &uapk, "x", WindowKind::Day, now)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_windows_are_disjoint() {
        let store = MemoryCounterStore::new();
        let (org, uapk) = ids();
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 14, 59, 0).unwrap();

        store
            .try_increment(&org, &uapk, &[probe("x", WindowKind::Hour, None)], now)
            .await
            .unwrap()
            .unwrap();

        // Next hour: fresh counter.
        let next_hour = now + Duration::minutes(2);
        assert_eq!(
            store
                .count(&org, &uapk, "x", WindowKind::Hour, next_hour)
                .await
                .unwrap(),
            0
        );
        // Same day: still counted.
        assert_eq!(
            store
                .count(&org, &uapk, "x", WindowKind::Hour, now)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_increments_respect_cap() {
        use std::sync::Arc;

        let store = Arc::new(MemoryCounterStore::new());
        let (org, uapk) = ids();
        let now = Utc::now();
        let cap = 5u64;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            let org = org.clone();
            let uapk = uapk.clone();
            handles.push(tokio::spawn(async move {
                store
                    .try_increment(
                        &org,
                        &uapk,
                        &[CounterProbe {
                            action_key: "x".to_string(),
                            kind: WindowKind::Day,
                            cap: Some(cap),
                        }],
                        now,
                    )
                    .await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, cap);

        let final_count = store
            .count(&org, &uapk, "x", WindowKind::Day, now)
            .await
            .unwrap();
        assert_eq!(final_count, cap);
    }
}
