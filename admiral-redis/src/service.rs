//! Redis connection bootstrap.

use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::{RedisConfig, RedisError, Result};

/// Owns the configuration and a multiplexed, auto-reconnecting connection.
///
/// `ConnectionManager` is cheap to clone; the job index and the lock
/// backend each take a clone of the same manager.
#[derive(Clone)]
pub struct RedisService {
    config: RedisConfig,
    conn: ConnectionManager,
}

impl RedisService {
    /// Connect and verify the server answers a PING.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        config.validate()?;
        debug!(url = %config.url, "Connecting to Redis");

        let client = redis::Client::open(config.connection_url())
            .map_err(|e| RedisError::Config(e.to_string()))?;

        let mut conn = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| RedisError::Timeout)?
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        let _: String = tokio::time::timeout(
            config.connection_timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| RedisError::Timeout)?
        .map_err(|e| RedisError::Connection(e.to_string()))?;

        info!(url = %config.url, "Redis connection ready");
        Ok(Self { config, conn })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get a handle to the shared connection.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Check if the connection is healthy.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = RedisConfig::new("memcached://localhost:11211");
        let result = RedisService::connect(config).await;
        assert!(matches!(result, Err(RedisError::Config(_))));
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_connect_and_ping() {
        let config = RedisConfig::from_env().build();
        let redis = RedisService::connect(config).await.unwrap();
        redis.health_check().await.unwrap();
    }
}
