//! In-flight job handle and completion signal.

use admiral_lock::{LockError, LockHandle};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::index::Timestamp;

/// A claimed job, handed to the processing function.
///
/// Clones share the same lease: if the handler calls [`unlock`](Self::unlock)
/// itself, the loop's own unlock afterwards is a no-op.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Job type
    pub job_type: String,

    /// Caller-chosen job id
    pub id: String,

    /// `ready_at` observed when the job was fetched
    pub timestamp: Timestamp,

    lock: Arc<Mutex<LockHandle>>,
}

impl WorkItem {
    pub(crate) fn new(job_type: String, id: String, timestamp: Timestamp, lock: LockHandle) -> Self {
        Self {
            job_type,
            id,
            timestamp,
            lock: Arc::new(Mutex::new(lock)),
        }
    }

    /// Push the lease out to `lease` from now.
    ///
    /// Must be called while the current lease is still valid; a lapsed lease
    /// cannot be extended. Long-running handlers should extend well ahead of
    /// the configured lock time.
    pub async fn extend(&self, lease: Duration) -> Result<(), LockError> {
        self.lock.lock().await.extend(lease).await
    }

    /// Release the lease early. Other workers can claim the job again once
    /// its `ready_at` passes.
    pub async fn unlock(&self) -> Result<(), LockError> {
        self.lock.lock().await.release().await
    }

    /// Whether the lease has been released.
    pub async fn is_unlocked(&self) -> bool {
        self.lock.lock().await.is_released()
    }
}

/// What a processing function reports back: an optional error and an
/// optional delay until the job is due again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Failure reported by the handler
    pub error: Option<String>,

    /// Delay until the next run; the queue's default wait when `None`
    pub offset: Option<Duration>,
}

impl Completion {
    /// Success, next run after the default wait.
    pub fn ok() -> Self {
        Self::default()
    }

    /// Success, next run after `offset`.
    pub fn ok_after(offset: Duration) -> Self {
        Self {
            error: None,
            offset: Some(offset),
        }
    }

    /// Failure, next run after the default wait.
    pub fn err(error: impl Display) -> Self {
        Self {
            error: Some(error.to_string()),
            offset: None,
        }
    }

    /// Failure, next run after `offset`.
    pub fn err_after(error: impl Display, offset: Duration) -> Self {
        Self {
            error: Some(error.to_string()),
            offset: Some(offset),
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

impl<E: Display> From<Result<(), E>> for Completion {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Completion::ok(),
            Err(e) => Completion::err(e),
        }
    }
}
