//! Lease-based distributed locks for Admiral.
//!
//! [`LockCoordinator`] turns "claim this resource" into one call against a
//! [`LockBackend`] and hands back a [`LockHandle`] that can extend or
//! release the lease.
//!
//! ## Features
//!
//! - **Single attempt** - contention fails fast, retry policy is the caller's
//! - **Token-checked** - extend/release only touch a lease this handle owns
//! - **Idempotent release** - a second release never reaches the backend
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use admiral_lock::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = redis::Client::open("redis://127.0.0.1/")?;
//!     let conn = client.get_connection_manager().await?;
//!
//!     let locks = LockCoordinator::new(RedisLockBackend::new(conn));
//!     let mut lease = locks.acquire("emails:locks:42", Duration::from_secs(30)).await?;
//!
//!     // Long work: push the lease out before it lapses
//!     lease.extend(Duration::from_secs(30)).await?;
//!
//!     lease.release().await?;
//!     Ok(())
//! }
//! ```

pub mod lock;
pub mod memory;
pub mod redis_backend;

pub use lock::{LockBackend, LockCoordinator, LockError, LockHandle};
pub use memory::MemoryLockBackend;
pub use redis_backend::RedisLockBackend;
