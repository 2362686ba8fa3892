//! Redis-backed lock service.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::lock::{LockBackend, LockError};

const EXTEND_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

const UNLOCK_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// Single-instance Redis lock backend.
///
/// Ownership is a `SET NX PX` key holding the owner's token. Extend and
/// unlock are token-checked Lua scripts so a worker can never touch a lease
/// that lapsed and was taken by someone else.
#[derive(Clone)]
pub struct RedisLockBackend {
    conn: ConnectionManager,
}

impl RedisLockBackend {
    /// Create a backend over a Redis connection.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use admiral_lock::{LockCoordinator, RedisLockBackend};
    ///
    /// let client = redis::Client::open("redis://127.0.0.1/")?;
    /// let conn = client.get_connection_manager().await?;
    /// let locks = LockCoordinator::new(RedisLockBackend::new(conn));
    /// ```
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl LockBackend for RedisLockBackend {
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn extend(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();

        let result: i32 = redis::Script::new(EXTEND_SCRIPT)
            .key(key)
            .arg(token)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;

        Ok(result == 1)
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();

        let result: i32 = redis::Script::new(UNLOCK_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;

        Ok(result == 1)
    }
}
