//! Due-time index backed by Redis sorted sets.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::config::Keyspace;
use crate::error::{StoreError, StoreResult};
use crate::index::{DueJob, JobIndex, Timestamp, TypeStats};

/// Removes a member and, only if that empties the index, the type from the
/// registry. One script so a concurrent schedule cannot interleave.
const REMOVE_SCRIPT: &str = r#"
    redis.call("ZREM", KEYS[1], ARGV[2])
    if redis.call("ZCARD", KEYS[1]) == 0 then
        return redis.call("SREM", KEYS[2], ARGV[1])
    else
        return 0
    end
"#;

/// [`JobIndex`] over Redis.
///
/// - `ZADD {prefix}:{type} ready_at id` + `SADD {prefix}:list type` in one `MULTI`
/// - `ZRANGEBYSCORE {prefix}:{type} -inf now WITHSCORES LIMIT 0 1` to find due work
/// - `SMEMBERS {prefix}:list` then `ZCARD` per type for stats
#[derive(Clone)]
pub struct RedisJobIndex {
    conn: ConnectionManager,
    keys: Keyspace,
}

impl RedisJobIndex {
    /// Create an index over a Redis connection.
    pub fn new(conn: ConnectionManager, keys: Keyspace) -> Self {
        Self { conn, keys }
    }

    /// Key layout in use.
    pub fn keyspace(&self) -> &Keyspace {
        &self.keys
    }
}

fn to_timestamp(score: f64) -> StoreResult<Timestamp> {
    if score.is_finite() {
        Ok(score as Timestamp)
    } else {
        Err(StoreError::Malformed(format!("non-finite score {}", score)))
    }
}

#[async_trait]
impl JobIndex for RedisJobIndex {
    async fn schedule(&self, job_type: &str, id: &str, ready_at: Timestamp) -> StoreResult<()> {
        // MULTI does not roll back: a failed ZADD would still register the type
        self.keys.check_type(job_type)?;
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .zadd(self.keys.type_key(job_type), id, ready_at)
            .ignore()
            // In case someone updates before any job of the type was created
            .sadd(self.keys.registry_key(), job_type)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(job_type, job_id = id, ready_at, "Scheduled job");
        Ok(())
    }

    async fn get(&self, job_type: &str, id: &str) -> StoreResult<Option<Timestamp>> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = conn.zscore(self.keys.type_key(job_type), id).await?;
        score.map(to_timestamp).transpose()
    }

    async fn list(&self, job_type: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrange(self.keys.type_key(job_type), 0, -1).await?;
        Ok(ids)
    }

    async fn remove(&self, job_type: &str, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();

        let dropped: i32 = redis::Script::new(REMOVE_SCRIPT)
            .key(self.keys.type_key(job_type))
            .key(self.keys.registry_key())
            .arg(job_type)
            .arg(id)
            .invoke_async(&mut conn)
            .await?;

        debug!(job_type, job_id = id, type_dropped = dropped == 1, "Removed job");
        Ok(())
    }

    async fn next_due(&self, job_type: &str, now: Timestamp) -> StoreResult<Option<DueJob>> {
        self.keys.check_type(job_type)?;
        let mut conn = self.conn.clone();

        let mut results: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.keys.type_key(job_type))
            .arg("-inf")
            .arg(now)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        match results.pop() {
            Some((id, score)) => Ok(Some(DueJob {
                id,
                ready_at: to_timestamp(score)?,
            })),
            None => Ok(None),
        }
    }

    async fn types(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut types: Vec<String> = conn.smembers(self.keys.registry_key()).await?;
        types.sort();
        Ok(types)
    }

    async fn stats(&self) -> StoreResult<Vec<TypeStats>> {
        let types = self.types().await?;
        if types.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for job_type in &types {
            pipe.zcard(self.keys.type_key(job_type));
        }
        let counts: Vec<u64> = pipe.query_async(&mut conn).await?;

        if counts.len() != types.len() {
            return Err(StoreError::Malformed(format!(
                "expected {} counts, got {}",
                types.len(),
                counts.len()
            )));
        }

        Ok(types
            .into_iter()
            .zip(counts)
            .map(|(job_type, count)| TypeStats { job_type, count })
            .collect())
    }
}
