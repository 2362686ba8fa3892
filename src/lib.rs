// Admiral - delayed and recurring jobs on Redis
//
// This library ties the due-time index, the lease-based lock service and the
// worker loop together behind one import.

// Re-export the queue surface
pub use admiral_queue::*;

// Re-export member crates
pub use admiral_lock;
pub use admiral_queue;
pub use admiral_redis;

pub use admiral_lock::{
    LockBackend, LockCoordinator, LockError, LockHandle, MemoryLockBackend, RedisLockBackend,
};
pub use admiral_redis::{RedisConfig, RedisConfigBuilder, RedisService};

/// Prelude for common imports.
///
/// ```
/// use admiral::prelude::*;
///
/// let config = QueueConfig::new("myapp");
/// assert_eq!(config.keyspace().registry_key(), "myapp:list");
/// ```
pub mod prelude {
    pub use admiral_lock::{LockCoordinator, MemoryLockBackend};
    pub use admiral_queue::prelude::*;
    pub use admiral_queue::{MemoryJobIndex, Stage};
    pub use admiral_redis::RedisConfig;
}
