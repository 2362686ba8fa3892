//! # Admiral Redis
//!
//! Connection configuration and bootstrap for the Redis server that backs
//! the Admiral due-time index and lock service.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use admiral_redis::{RedisConfig, RedisService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .url("redis://localhost:6379")
//!         .database(2)
//!         .build();
//!
//!     let redis = RedisService::connect(config).await?;
//!     let mut conn = redis.connection();
//!
//!     let _: () = redis::cmd("SET")
//!         .arg("key")
//!         .arg("value")
//!         .query_async(&mut conn)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use service::RedisService;

// Re-export redis crate for convenience
pub use redis;
pub use redis::aio::ConnectionManager;
