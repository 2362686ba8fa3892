//! Process-local lock service.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::lock::{LockBackend, LockError};

/// Lock backend that keeps leases in memory.
///
/// Leases follow the tokio clock, so paused-time tests can expire them.
/// Only useful when every worker lives in the same process.
#[derive(Debug, Default)]
pub struct MemoryLockBackend {
    leases: Mutex<HashMap<String, Lease>>,
}

#[derive(Debug)]
struct Lease {
    token: String,
    deadline: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline > now
    }
}

impl MemoryLockBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leases that have not lapsed.
    pub fn active_leases(&self) -> usize {
        let now = Instant::now();
        self.leases.lock().values().filter(|l| l.is_live(now)).count()
    }

    /// Whether `key` is currently held by anyone.
    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.leases.lock().get(key).is_some_and(|l| l.is_live(now))
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        if leases.get(key).is_some_and(|l| l.is_live(now)) {
            return Ok(false);
        }

        leases.insert(
            key.to_string(),
            Lease {
                token: token.to_string(),
                deadline: now + ttl,
            },
        );
        Ok(true)
    }

    async fn extend(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        match leases.get_mut(key) {
            Some(lease) if lease.token == token && lease.is_live(now) => {
                lease.deadline = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        match leases.get(key) {
            Some(lease) if lease.token == token => {
                let live = lease.is_live(now);
                leases.remove(key);
                Ok(live)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LockCoordinator;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_foreign_token_cannot_unlock() {
        let backend = MemoryLockBackend::new();
        assert!(backend.try_lock("k", "mine", Duration::from_secs(5)).await.unwrap());

        assert!(!backend.unlock("k", "theirs").await.unwrap());
        assert!(backend.is_locked("k"));
    }

    #[tokio::test]
    async fn test_foreign_token_cannot_extend() {
        let backend = MemoryLockBackend::new();
        assert!(backend.try_lock("k", "mine", Duration::from_secs(5)).await.unwrap());

        assert!(!backend.extend("k", "theirs", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_leases_ignores_lapsed() {
        let backend = MemoryLockBackend::new();
        backend.try_lock("a", "t1", Duration::from_secs(1)).await.unwrap();
        backend.try_lock("b", "t2", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(backend.active_leases(), 1);
        assert!(!backend.is_locked("a"));
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_winner() {
        let locks = LockCoordinator::from_arc(Arc::new(MemoryLockBackend::new()));
        let (a, b) = tokio::join!(
            locks.acquire("t:locks:a", Duration::from_secs(30)),
            locks.acquire("t:locks:a", Duration::from_secs(30)),
        );

        assert!(a.is_ok() ^ b.is_ok());
    }
}
