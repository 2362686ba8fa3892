//! Process-local due-time index.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

use crate::error::StoreResult;
use crate::index::{DueJob, JobIndex, Timestamp, TypeStats};

/// In-memory [`JobIndex`] for tests and single-process deployments.
///
/// Every operation runs under one mutex, which gives the same per-call
/// atomicity a Redis `MULTI` or Lua script does. Ties on `ready_at` are
/// broken by id in byte order, as a Redis sorted set does.
#[derive(Debug, Default)]
pub struct MemoryJobIndex {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    indices: HashMap<String, HashMap<String, Timestamp>>,
    registry: BTreeSet<String>,
}

impl MemoryJobIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobIndex for MemoryJobIndex {
    async fn schedule(&self, job_type: &str, id: &str, ready_at: Timestamp) -> StoreResult<()> {
        let mut state = self.state.lock();
        state
            .indices
            .entry(job_type.to_string())
            .or_default()
            .insert(id.to_string(), ready_at);
        state.registry.insert(job_type.to_string());
        Ok(())
    }

    async fn get(&self, job_type: &str, id: &str) -> StoreResult<Option<Timestamp>> {
        let state = self.state.lock();
        Ok(state
            .indices
            .get(job_type)
            .and_then(|index| index.get(id).copied()))
    }

    async fn list(&self, job_type: &str) -> StoreResult<Vec<String>> {
        let state = self.state.lock();
        let Some(index) = state.indices.get(job_type) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<(&String, &Timestamp)> = index.iter().collect();
        entries.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        Ok(entries.into_iter().map(|(id, _)| id.clone()).collect())
    }

    async fn remove(&self, job_type: &str, id: &str) -> StoreResult<()> {
        let mut state = self.state.lock();

        let drained = match state.indices.get_mut(job_type) {
            Some(index) => {
                index.remove(id);
                index.is_empty()
            }
            None => true,
        };

        if drained {
            state.indices.remove(job_type);
            state.registry.remove(job_type);
        }
        Ok(())
    }

    async fn next_due(&self, job_type: &str, now: Timestamp) -> StoreResult<Option<DueJob>> {
        let state = self.state.lock();
        let Some(index) = state.indices.get(job_type) else {
            return Ok(None);
        };

        Ok(index
            .iter()
            .filter(|(_, ready_at)| **ready_at <= now)
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(id, ready_at)| DueJob {
                id: id.clone(),
                ready_at: *ready_at,
            }))
    }

    async fn types(&self) -> StoreResult<Vec<String>> {
        Ok(self.state.lock().registry.iter().cloned().collect())
    }

    async fn stats(&self) -> StoreResult<Vec<TypeStats>> {
        let state = self.state.lock();
        Ok(state
            .registry
            .iter()
            .map(|job_type| TypeStats {
                job_type: job_type.clone(),
                count: state.indices.get(job_type).map_or(0, |index| index.len() as u64),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schedule_then_get() {
        let index = MemoryJobIndex::new();
        index.schedule("t", "a", 1_000).await.unwrap();

        assert!(index.exists("t", "a").await.unwrap());
        assert_eq!(index.get("t", "a").await.unwrap(), Some(1_000));
        assert_eq!(index.types().await.unwrap(), vec!["t".to_string()]);
    }

    #[tokio::test]
    async fn test_schedule_is_an_upsert() {
        let index = MemoryJobIndex::new();
        index.schedule("t", "a", 1_000).await.unwrap();
        index.schedule("t", "a", 5_000).await.unwrap();

        assert_eq!(index.get("t", "a").await.unwrap(), Some(5_000));
        assert_eq!(index.list("t").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exists_with_zero_and_negative_scores() {
        let index = MemoryJobIndex::new();
        index.schedule("t", "zero", 0).await.unwrap();
        index.schedule("t", "past", -5).await.unwrap();

        assert!(index.exists("t", "zero").await.unwrap());
        assert!(index.exists("t", "past").await.unwrap());
        assert!(!index.exists("t", "missing").await.unwrap());
        assert!(!index.exists("other", "zero").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_orders_by_ready_at_then_id() {
        let index = MemoryJobIndex::new();
        index.schedule("t", "late", 300).await.unwrap();
        index.schedule("t", "b", 100).await.unwrap();
        index.schedule("t", "a", 100).await.unwrap();
        index.schedule("t", "mid", 200).await.unwrap();

        assert_eq!(index.list("t").await.unwrap(), vec!["a", "b", "mid", "late"]);
        assert!(index.list("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_last_member_drops_type() {
        let index = MemoryJobIndex::new();
        index.schedule("t", "a", 100).await.unwrap();
        index.remove("t", "a").await.unwrap();

        assert!(!index.exists("t", "a").await.unwrap());
        assert!(index.types().await.unwrap().is_empty());
        assert_eq!(index.next_due("t", i64::MAX).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_keeps_type_with_remaining_members() {
        let index = MemoryJobIndex::new();
        index.schedule("t", "a", 100).await.unwrap();
        index.schedule("t", "b", 200).await.unwrap();
        index.remove("t", "a").await.unwrap();

        assert_eq!(index.types().await.unwrap(), vec!["t".to_string()]);
        assert_eq!(index.list("t").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_next_due_respects_now() {
        let index = MemoryJobIndex::new();
        index.schedule("t", "future", 2_000).await.unwrap();

        assert_eq!(index.next_due("t", 1_999).await.unwrap(), None);
        assert_eq!(
            index.next_due("t", 2_000).await.unwrap(),
            Some(DueJob {
                id: "future".into(),
                ready_at: 2_000
            })
        );
    }

    #[tokio::test]
    async fn test_next_due_picks_smallest() {
        let index = MemoryJobIndex::new();
        index.schedule("t", "newer", 500).await.unwrap();
        index.schedule("t", "older", 100).await.unwrap();
        index.schedule("t", "not-yet", 5_000).await.unwrap();

        let due = index.next_due("t", 1_000).await.unwrap().unwrap();
        assert_eq!(due.id, "older");
        assert_eq!(due.ready_at, 100);
    }

    #[tokio::test]
    async fn test_stats_counts_per_type() {
        let index = MemoryJobIndex::new();
        index.schedule("emails", "1", 1).await.unwrap();
        index.schedule("emails", "2", 2).await.unwrap();
        index.schedule("reports", "x", 3).await.unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(
            stats,
            vec![
                TypeStats {
                    job_type: "emails".into(),
                    count: 2
                },
                TypeStats {
                    job_type: "reports".into(),
                    count: 1
                },
            ]
        );
    }
}
