//! Delayed and recurring job queue for Admiral.
//!
//! Jobs are `(type, id)` pairs with a due time held in an ordered index.
//! Worker loops claim due jobs under a distributed lock, run a handler and
//! put the job back on the schedule, so every job recurs until removed.
//!
//! - ⏰ Delayed jobs and per-run rescheduling
//! - 🔒 At most one active worker per job via leases
//! - 📦 Redis-backed index, or in-memory for tests
//! - 📊 Per-type job counts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use admiral_queue::*;
//! use admiral_redis::RedisConfig;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), QueueError> {
//! let queue = Queue::connect(RedisConfig::default(), QueueConfig::new("myapp")).await?;
//!
//! // Producer: make job "42" of type "emails" due now
//! queue.create("emails", "42").await?;
//!
//! // Consumer: check again in an hour after every run
//! let worker = queue.process("emails", |item: WorkItem| async move {
//!     println!("sending email {}", item.id);
//!     Completion::ok_after(Duration::from_secs(3600))
//! });
//! # worker.abort();
//! # Ok(())
//! # }
//! ```
//!
//! ## In-Memory Backends
//!
//! ```
//! use admiral_lock::MemoryLockBackend;
//! use admiral_queue::*;
//!
//! let queue = Queue::builder()
//!     .index(MemoryJobIndex::new())
//!     .locks(MemoryLockBackend::new())
//!     .config(QueueConfig::new("test"))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(queue.config().prefix, "test");
//! ```
//!
//! ## Events
//!
//! Infrastructure failures and handler failures never stop a worker loop;
//! they are published to every [`Queue::subscribe`] listener as
//! [`QueueEvent::Error`] and [`QueueEvent::JobError`].

pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod job;
pub mod memory;
pub mod queue;
pub mod redis_index;
pub mod worker;

pub use config::{Keyspace, QueueConfig};
pub use error::{QueueError, QueueResult, StoreError, StoreResult};
pub use events::{DEFAULT_EVENT_CAPACITY, EventEmitter, QueueEvent};
pub use index::{DueJob, JobIndex, Timestamp, TypeStats, millis_after, now_millis};
pub use job::{Completion, WorkItem};
pub use memory::MemoryJobIndex;
pub use queue::{Queue, QueueBuilder};
pub use redis_index::RedisJobIndex;
pub use worker::{IDLE_BACKOFF, JobHandler, Processor, RESERVATION_HORIZON, Stage, TickOutcome};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::QueueConfig;
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::events::QueueEvent;
    pub use crate::job::{Completion, WorkItem};
    pub use crate::queue::Queue;
    pub use crate::worker::TickOutcome;
}
