//! Due-time index contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StoreResult;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

/// `now + delay`, saturating instead of overflowing.
pub fn millis_after(now: Timestamp, delay: Duration) -> Timestamp {
    let delay = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    now.saturating_add(delay)
}

/// The earliest eligible entry of a type's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueJob {
    pub id: String,
    pub ready_at: Timestamp,
}

/// Job count for one registered type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    #[serde(rename = "type")]
    pub job_type: String,
    pub count: u64,
}

/// Per-type ordered mapping of job id to `ready_at`, plus the registry of
/// known types.
///
/// A job exists exactly while it has an entry here. Nothing is cached by
/// callers; every call reads authoritative state.
#[async_trait]
pub trait JobIndex: Send + Sync {
    /// Upsert `ready_at` and record the type in the registry, atomically.
    async fn schedule(&self, job_type: &str, id: &str, ready_at: Timestamp) -> StoreResult<()>;

    /// `ready_at` of the job, if it exists.
    async fn get(&self, job_type: &str, id: &str) -> StoreResult<Option<Timestamp>>;

    /// Whether the job has an entry, whatever its `ready_at`.
    async fn exists(&self, job_type: &str, id: &str) -> StoreResult<bool> {
        Ok(self.get(job_type, id).await?.is_some())
    }

    /// Ids of a type ordered by ascending `ready_at`, ties by id.
    async fn list(&self, job_type: &str) -> StoreResult<Vec<String>>;

    /// Delete the entry. If that leaves the type's index empty the type is
    /// dropped from the registry in the same atomic step.
    async fn remove(&self, job_type: &str, id: &str) -> StoreResult<()>;

    /// The entry with the smallest `ready_at <= now`, read in one call.
    async fn next_due(&self, job_type: &str, now: Timestamp) -> StoreResult<Option<DueJob>>;

    /// Registered job types, sorted.
    async fn types(&self) -> StoreResult<Vec<String>>;

    /// Per-type counts.
    ///
    /// The registry is read first and each count afterwards, so a type
    /// created or drained in between may show a stale count. Eventually
    /// consistent, not transactional.
    async fn stats(&self) -> StoreResult<Vec<TypeStats>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_after() {
        assert_eq!(millis_after(1_000, Duration::from_secs(2)), 3_000);
        assert_eq!(millis_after(i64::MAX - 1, Duration::from_secs(1)), i64::MAX);
    }

    #[test]
    fn test_now_millis_is_epoch_millis() {
        // Later than 2020-01-01 in milliseconds.
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_type_stats_serializes_type_field() {
        let stats = TypeStats {
            job_type: "emails".into(),
            count: 3,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json, serde_json::json!({"type": "emails", "count": 3}));
    }
}
