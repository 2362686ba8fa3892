//! Queue facade: producer and admin calls plus worker-loop construction.

use admiral_lock::{LockBackend, LockCoordinator, RedisLockBackend};
use admiral_redis::{RedisConfig, RedisService};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::events::{DEFAULT_EVENT_CAPACITY, EventEmitter, QueueEvent};
use crate::index::{JobIndex, Timestamp, TypeStats, millis_after, now_millis};
use crate::job::{Completion, WorkItem};
use crate::redis_index::RedisJobIndex;
use crate::worker::{JobHandler, Processor};

/// Delayed and recurring job queue.
///
/// Jobs are `(type, id)` pairs with a due time; there is no payload. Cloning
/// is cheap and every clone shares the same store, locks and event channel.
#[derive(Clone)]
pub struct Queue {
    index: Arc<dyn JobIndex>,
    locks: LockCoordinator,
    config: QueueConfig,
    events: EventEmitter,
}

impl Queue {
    /// Start building a queue from explicit collaborators.
    pub fn builder() -> QueueBuilder {
        QueueBuilder::default()
    }

    /// Connect to Redis and back both the index and the locks with it.
    pub async fn connect(redis: RedisConfig, config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;

        let service = RedisService::connect(redis).await?;
        let index = RedisJobIndex::new(service.connection(), config.keyspace());
        let locks = RedisLockBackend::new(service.connection());

        info!(prefix = %config.prefix, "Connected job queue to Redis");

        Self::builder()
            .index(index)
            .locks(locks)
            .config(config)
            .build()
    }

    /// Make a job due now. Re-creating an existing job resets its due time.
    pub async fn create(&self, job_type: &str, id: &str) -> QueueResult<()> {
        self.update(job_type, id, now_millis()).await
    }

    /// Set a job's due time, creating the job if needed.
    ///
    /// A type whose index key would collide with the type registry fails
    /// with [`StoreError::ReservedType`](crate::error::StoreError::ReservedType).
    pub async fn update(&self, job_type: &str, id: &str, ready_at: Timestamp) -> QueueResult<()> {
        self.config.keyspace().check_type(job_type)?;
        self.index.schedule(job_type, id, ready_at).await?;
        Ok(())
    }

    /// Make a job due `delay` from now.
    pub async fn schedule_after(&self, job_type: &str, id: &str, delay: Duration) -> QueueResult<()> {
        self.update(job_type, id, millis_after(now_millis(), delay))
            .await
    }

    pub async fn exists(&self, job_type: &str, id: &str) -> QueueResult<bool> {
        Ok(self.index.exists(job_type, id).await?)
    }

    /// Due time of a job, or `None` if it is not scheduled.
    pub async fn get(&self, job_type: &str, id: &str) -> QueueResult<Option<Timestamp>> {
        Ok(self.index.get(job_type, id).await?)
    }

    /// Ids of a type, soonest due first.
    pub async fn list(&self, job_type: &str) -> QueueResult<Vec<String>> {
        Ok(self.index.list(job_type).await?)
    }

    /// Delete a job. Removing an unknown job is not an error.
    pub async fn remove(&self, job_type: &str, id: &str) -> QueueResult<()> {
        self.index.remove(job_type, id).await?;
        debug!(job_type, job_id = id, "Removed job from queue");
        Ok(())
    }

    /// Registered job types, sorted.
    pub async fn types(&self) -> QueueResult<Vec<String>> {
        Ok(self.index.types().await?)
    }

    /// Job count per registered type.
    pub async fn stats(&self) -> QueueResult<Vec<TypeStats>> {
        Ok(self.index.stats().await?)
    }

    /// Listen for worker-loop events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Emitter shared by every worker loop of this queue.
    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Build a worker loop for `job_type` without starting it.
    ///
    /// The handler receives a [`WorkItem`] and reports a [`Completion`];
    /// it may call [`WorkItem::unlock`] itself.
    pub fn processor<F, Fut>(&self, job_type: impl Into<String>, handler: F) -> Processor
    where
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Completion> + Send + 'static,
    {
        let handler: JobHandler = Arc::new(
            move |item: WorkItem| -> Pin<Box<dyn Future<Output = Completion> + Send>> {
                Box::pin(handler(item))
            },
        );

        Processor::new(
            job_type.into(),
            self.index.clone(),
            self.locks.clone(),
            self.config.keyspace(),
            self.config.default_wait,
            self.config.lock_time,
            self.events.clone(),
            handler,
        )
    }

    /// Spawn a worker loop for `job_type` on the current runtime.
    ///
    /// Loops for several types, or several loops for one type, can run side
    /// by side. The loop runs until the returned handle is aborted.
    pub fn process<F, Fut>(&self, job_type: impl Into<String>, handler: F) -> JoinHandle<()>
    where
        F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Completion> + Send + 'static,
    {
        let processor = self.processor(job_type, handler);
        tokio::spawn(processor.run())
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("config", &self.config)
            .field("listeners", &self.events.listener_count())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Queue`].
pub struct QueueBuilder {
    index: Option<Arc<dyn JobIndex>>,
    locks: Option<LockCoordinator>,
    config: QueueConfig,
    event_capacity: usize,
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self {
            index: None,
            locks: None,
            config: QueueConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl QueueBuilder {
    /// Due-time index to store jobs in.
    pub fn index(mut self, index: impl JobIndex + 'static) -> Self {
        self.index = Some(Arc::new(index));
        self
    }

    /// Due-time index already shared with other components.
    pub fn shared_index(mut self, index: Arc<dyn JobIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Lock backend guarding job processing.
    pub fn locks(mut self, backend: impl LockBackend + 'static) -> Self {
        self.locks = Some(LockCoordinator::new(backend));
        self
    }

    /// Lock coordinator already shared with other components.
    pub fn lock_coordinator(mut self, locks: LockCoordinator) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Events buffered per subscriber before it starts lagging.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Build the queue.
    ///
    /// Fails with [`QueueError::Config`] when the index or the lock backend
    /// is missing, or the configuration does not validate.
    pub fn build(self) -> QueueResult<Queue> {
        let index = self
            .index
            .ok_or_else(|| QueueError::Config("a job index is required".to_string()))?;
        let locks = self
            .locks
            .ok_or_else(|| QueueError::Config("a lock backend is required".to_string()))?;
        self.config.validate()?;

        Ok(Queue {
            index,
            locks,
            config: self.config,
            events: EventEmitter::new(self.event_capacity),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryJobIndex;
    use admiral_lock::MemoryLockBackend;

    fn memory_queue() -> Queue {
        Queue::builder()
            .index(MemoryJobIndex::new())
            .locks(MemoryLockBackend::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_index() {
        let err = Queue::builder()
            .locks(MemoryLockBackend::new())
            .build()
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("job index"));
    }

    #[test]
    fn test_build_requires_locks() {
        let err = Queue::builder()
            .index(MemoryJobIndex::new())
            .build()
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("lock backend"));
    }

    #[test]
    fn test_build_validates_config() {
        let err = Queue::builder()
            .index(MemoryJobIndex::new())
            .locks(MemoryLockBackend::new())
            .config(QueueConfig::new(""))
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_create_makes_job_due() {
        let queue = memory_queue();
        let before = now_millis();
        queue.create("emails", "42").await.unwrap();

        let ready_at = queue.get("emails", "42").await.unwrap().unwrap();
        assert!(ready_at >= before && ready_at <= now_millis());
        assert!(queue.exists("emails", "42").await.unwrap());
    }

    #[tokio::test]
    async fn test_schedule_after_delays() {
        let queue = memory_queue();
        let before = now_millis();
        queue
            .schedule_after("emails", "42", Duration::from_secs(60))
            .await
            .unwrap();

        let ready_at = queue.get("emails", "42").await.unwrap().unwrap();
        assert!(ready_at >= before + 60_000);
    }

    #[tokio::test]
    async fn test_remove_and_stats() {
        let queue = memory_queue();
        queue.create("emails", "1").await.unwrap();
        queue.create("emails", "2").await.unwrap();
        queue.remove("emails", "1").await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].count, 1);

        queue.remove("emails", "2").await.unwrap();
        assert!(queue.stats().await.unwrap().is_empty());
        assert!(queue.types().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registry_name_rejected_before_store() {
        let queue = memory_queue();

        let err = queue.create("list", "x").await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::Store(StoreError::ReservedType(ref t)) if t == "list"
        ));
        assert!(queue.types().await.unwrap().is_empty());
        assert!(queue.stats().await.unwrap().is_empty());

        let err = queue
            .schedule_after("list", "x", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Store(StoreError::ReservedType(_))));
    }

    #[test]
    fn test_processor_carries_type() {
        let queue = memory_queue();
        let processor = queue.processor("emails", |_item| async { Completion::ok() });
        assert_eq!(processor.job_type(), "emails");
    }
}
