//! Lease-based lock coordination.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Distributed lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock contended: {0}")]
    Contended(String),

    #[error("lease expired: {0}")]
    Expired(String),

    #[error("lock already released: {0}")]
    Released(String),

    #[error("lock not held: {0}")]
    NotHeld(String),

    #[error("invalid lease duration for {0}")]
    InvalidLease(String),

    #[error("lock backend error: {0}")]
    Backend(String),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}

impl LockError {
    /// Whether the lock is simply owned by somebody else right now.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contended(_))
    }
}

/// The external lock service.
///
/// Every call is keyed by the resource and the owner token. Implementations
/// must make `try_lock` safe under concurrent callers; fencing and quorum are
/// their business.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Take `key` for `ttl` if nobody holds it. Returns `false` when held.
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Reset the lease to `ttl` if `token` still owns `key`.
    async fn extend(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Drop `key` if `token` still owns it.
    async fn unlock(&self, key: &str, token: &str) -> Result<bool, LockError>;
}

/// Translates "claim this resource" into lock-service calls.
///
/// A single attempt is made per `acquire`; retrying is the caller's policy.
#[derive(Clone)]
pub struct LockCoordinator {
    backend: Arc<dyn LockBackend>,
}

impl LockCoordinator {
    /// Create a coordinator over a lock backend.
    pub fn new(backend: impl LockBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Create a coordinator over a shared lock backend.
    pub fn from_arc(backend: Arc<dyn LockBackend>) -> Self {
        Self { backend }
    }

    /// Acquire exclusive ownership of `key` for `lease`.
    pub async fn acquire(&self, key: &str, lease: Duration) -> Result<LockHandle, LockError> {
        if lease.is_zero() {
            return Err(LockError::InvalidLease(key.to_string()));
        }

        let token = Uuid::new_v4().to_string();
        if !self.backend.try_lock(key, &token, lease).await? {
            debug!(key, "Lock already held");
            return Err(LockError::Contended(key.to_string()));
        }

        debug!(key, lease_ms = lease.as_millis() as u64, "Acquired lock");
        Ok(LockHandle {
            key: key.to_string(),
            token,
            expires_at: Instant::now() + lease,
            backend: self.backend.clone(),
            released: false,
        })
    }
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator").finish_non_exhaustive()
    }
}

/// A granted lease.
///
/// Nothing is released on drop: an abandoned handle simply lets the lease
/// run out.
pub struct LockHandle {
    key: String,
    token: String,
    expires_at: Instant,
    backend: Arc<dyn LockBackend>,
    released: bool,
}

impl LockHandle {
    /// Resource key this lease covers.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Local estimate of when the lease lapses.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether `release` has completed.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Reset the lease to `lease` from now.
    ///
    /// Only works while the current lease is still valid. Once it has lapsed
    /// the lock may already belong to someone else and the call fails with
    /// [`LockError::Expired`].
    pub async fn extend(&mut self, lease: Duration) -> Result<(), LockError> {
        if self.released {
            return Err(LockError::Released(self.key.clone()));
        }
        if lease.is_zero() {
            return Err(LockError::InvalidLease(self.key.clone()));
        }

        if self.backend.extend(&self.key, &self.token, lease).await? {
            self.expires_at = Instant::now() + lease;
            debug!(key = %self.key, lease_ms = lease.as_millis() as u64, "Extended lock");
            Ok(())
        } else {
            warn!(key = %self.key, "Cannot extend lock, lease already lapsed");
            Err(LockError::Expired(self.key.clone()))
        }
    }

    /// Release the lease early. Calling it again is a no-op.
    pub async fn release(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }

        let held = self.backend.unlock(&self.key, &self.token).await?;
        self.released = true;

        if held {
            debug!(key = %self.key, "Released lock");
            Ok(())
        } else {
            warn!(key = %self.key, "Lock was no longer held at release");
            Err(LockError::NotHeld(self.key.clone()))
        }
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.key)
            .field("expires_at", &self.expires_at)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLockBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts unlock round-trips to prove release idempotence.
    struct CountingBackend {
        inner: MemoryLockBackend,
        unlocks: AtomicUsize,
    }

    #[async_trait]
    impl LockBackend for CountingBackend {
        async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
            self.inner.try_lock(key, token, ttl).await
        }

        async fn extend(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
            self.inner.extend(key, token, ttl).await
        }

        async fn unlock(&self, key: &str, token: &str) -> Result<bool, LockError> {
            self.unlocks.fetch_add(1, Ordering::SeqCst);
            self.inner.unlock(key, token).await
        }
    }

    #[tokio::test]
    async fn test_second_acquire_is_contended() {
        let locks = LockCoordinator::new(MemoryLockBackend::new());

        let _first = locks.acquire("jobs:locks:a", Duration::from_secs(30)).await.unwrap();
        let second = locks.acquire("jobs:locks:a", Duration::from_secs(30)).await;

        assert!(matches!(second, Err(LockError::Contended(_))));
        assert!(second.unwrap_err().is_contention());
    }

    #[tokio::test]
    async fn test_release_allows_reacquire() {
        let locks = LockCoordinator::new(MemoryLockBackend::new());

        let mut handle = locks.acquire("r", Duration::from_secs(30)).await.unwrap();
        handle.release().await.unwrap();
        assert!(handle.is_released());

        assert!(locks.acquire("r", Duration::from_secs(30)).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let backend = Arc::new(CountingBackend {
            inner: MemoryLockBackend::new(),
            unlocks: AtomicUsize::new(0),
        });
        let locks = LockCoordinator::from_arc(backend.clone());

        let mut handle = locks.acquire("r", Duration::from_secs(30)).await.unwrap();
        handle.release().await.unwrap();
        handle.release().await.unwrap();

        assert_eq!(backend.unlocks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_before_expiry_keeps_lock() {
        let locks = LockCoordinator::new(MemoryLockBackend::new());
        let mut handle = locks.acquire("r", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        handle.extend(Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        assert!(matches!(
            locks.acquire("r", Duration::from_secs(10)).await,
            Err(LockError::Contended(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_after_expiry_fails() {
        let locks = LockCoordinator::new(MemoryLockBackend::new());
        let mut handle = locks.acquire("r", Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        let result = handle.extend(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(LockError::Expired(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_frees_resource() {
        let locks = LockCoordinator::new(MemoryLockBackend::new());
        let _stale = locks.acquire("r", Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(locks.acquire("r", Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_extend_after_release_fails() {
        let locks = LockCoordinator::new(MemoryLockBackend::new());
        let mut handle = locks.acquire("r", Duration::from_secs(5)).await.unwrap();
        handle.release().await.unwrap();

        let result = handle.extend(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(LockError::Released(_))));
    }

    #[tokio::test]
    async fn test_zero_lease_rejected() {
        let locks = LockCoordinator::new(MemoryLockBackend::new());
        let result = locks.acquire("r", Duration::ZERO).await;
        assert!(matches!(result, Err(LockError::InvalidLease(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_expiry_reports_not_held_once() {
        let locks = LockCoordinator::new(MemoryLockBackend::new());
        let mut handle = locks.acquire("r", Duration::from_secs(1)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(matches!(handle.release().await, Err(LockError::NotHeld(_))));
        assert!(handle.release().await.is_ok());
    }
}
