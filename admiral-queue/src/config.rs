//! Queue configuration and key layout.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{QueueError, QueueResult, StoreError, StoreResult};

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Namespace for every key the queue touches.
    pub prefix: String,

    /// Delay before a processed job is due again when the handler names none.
    #[serde(with = "duration_secs")]
    pub default_wait: Duration,

    /// Lease granted for each claim.
    #[serde(with = "duration_secs")]
    pub lock_time: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            prefix: "admiral".to_string(),
            default_wait: Duration::from_secs(10 * 60),
            lock_time: Duration::from_secs(5 * 60),
        }
    }
}

impl QueueConfig {
    /// Create a configuration with the given key prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Recognizes `ADMIRAL_PREFIX`, `ADMIRAL_DEFAULT_WAIT_SECS` and
    /// `ADMIRAL_LOCK_TIME_SECS`; anything unset or unparsable keeps its default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(prefix) = std::env::var("ADMIRAL_PREFIX") {
            config.prefix = prefix;
        }

        if let Ok(secs) = std::env::var("ADMIRAL_DEFAULT_WAIT_SECS")
            && let Ok(secs) = secs.parse()
        {
            config.default_wait = Duration::from_secs(secs);
        }

        if let Ok(secs) = std::env::var("ADMIRAL_LOCK_TIME_SECS")
            && let Ok(secs) = secs.parse()
        {
            config.lock_time = Duration::from_secs(secs);
        }

        config
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the default wait between runs of a job.
    pub fn with_default_wait(mut self, default_wait: Duration) -> Self {
        self.default_wait = default_wait;
        self
    }

    /// Set the lease duration per claim.
    pub fn with_lock_time(mut self, lock_time: Duration) -> Self {
        self.lock_time = lock_time;
        self
    }

    /// Reject settings the worker loop cannot run with.
    pub fn validate(&self) -> QueueResult<()> {
        if self.prefix.is_empty() {
            return Err(QueueError::Config("key prefix must not be empty".to_string()));
        }
        if self.prefix.starts_with(':') || self.prefix.ends_with(':') {
            return Err(QueueError::Config(format!(
                "key prefix must not start or end with ':' ({})",
                self.prefix
            )));
        }
        if self.lock_time.is_zero() {
            return Err(QueueError::Config("lock time must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Key layout for this prefix.
    pub fn keyspace(&self) -> Keyspace {
        Keyspace::new(&self.prefix)
    }
}

/// Shared key-naming convention.
///
/// `{prefix}:{type}` holds a type's due-time index, `{prefix}:list` the type
/// registry, `{prefix}:{type}:locks:{id}` a job's lease. A job type literally
/// named `list` would collide with the registry and is rejected by
/// [`check_type`](Self::check_type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    /// Create a key layout under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Due-time index of one job type.
    pub fn type_key(&self, job_type: &str) -> String {
        format!("{}:{}", self.prefix, job_type)
    }

    /// Registry of known job types.
    pub fn registry_key(&self) -> String {
        format!("{}:list", self.prefix)
    }

    /// Lease key of one job.
    pub fn lock_key(&self, job_type: &str, id: &str) -> String {
        format!("{}:{}:locks:{}", self.prefix, job_type, id)
    }

    /// Reject a job type whose index key is the registry key.
    pub fn check_type(&self, job_type: &str) -> StoreResult<()> {
        if self.type_key(job_type) == self.registry_key() {
            return Err(StoreError::ReservedType(job_type.to_string()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
