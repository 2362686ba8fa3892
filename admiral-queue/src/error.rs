//! Error types for queue operations.

use admiral_lock::LockError;
use thiserror::Error;

/// Result type for due-time index operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// The ordered store failed or returned something unusable.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Reply did not have the expected shape
    #[error("Malformed store reply: {0}")]
    Malformed(String),

    /// Job type whose index key is taken by the type registry
    #[error("Reserved job type: {0}")]
    ReservedType(String),
}

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Due-time index failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Lock service failure
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Missing collaborator or invalid settings at construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// A processing function reported failure
    #[error("Job processing failed: {0}")]
    Processing(String),

    /// Could not establish the Redis connection
    #[error("Connection error: {0}")]
    Connection(#[from] admiral_redis::RedisError),
}

impl QueueError {
    /// Whether this error can only be fixed by changing how the queue is built.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
