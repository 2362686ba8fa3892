//! Worker loop: claim due jobs, run the handler, reschedule.

use admiral_lock::LockCoordinator;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Keyspace;
use crate::error::QueueError;
use crate::events::EventEmitter;
use crate::index::{JobIndex, millis_after, now_millis};
use crate::job::{Completion, WorkItem};

/// How far `ready_at` is pushed when a job is claimed, so no other worker
/// fetches it while this one locks and processes it.
pub const RESERVATION_HORIZON: Duration = Duration::from_secs(2 * 60);

/// Sleep after a poll that found nothing due.
pub const IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// Job handler function type.
pub type JobHandler =
    Arc<dyn Fn(WorkItem) -> Pin<Box<dyn Future<Output = Completion> + Send>> + Send + Sync>;

/// Step at which a tick can be interrupted. Once the lock is held the tick
/// always runs to completion, so there is no stage after `Locking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Reserving,
    Locking,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Reserving => "reserving",
            Stage::Locking => "locking",
        };
        f.write_str(name)
    }
}

/// How a tick ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was due.
    Idle,

    /// A store or lock call failed before the handler ran; an `error` event
    /// was emitted and the job, if any, was left for a later tick.
    Interrupted { stage: Stage },

    /// The handler ran and finalization was attempted. `failed` is true when
    /// the handler reported an error.
    Processed { id: String, failed: bool },
}

/// Runs the claim/process/reschedule cycle for one job type.
///
/// Many processors, in this process or others, may work the same type
/// against the same store; the reservation plus the lease keep each job
/// with at most one active worker.
pub struct Processor {
    job_type: String,
    index: Arc<dyn JobIndex>,
    locks: LockCoordinator,
    keys: Keyspace,
    default_wait: Duration,
    lock_time: Duration,
    events: EventEmitter,
    handler: JobHandler,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        job_type: String,
        index: Arc<dyn JobIndex>,
        locks: LockCoordinator,
        keys: Keyspace,
        default_wait: Duration,
        lock_time: Duration,
        events: EventEmitter,
        handler: JobHandler,
    ) -> Self {
        Self {
            job_type,
            index,
            locks,
            keys,
            default_wait,
            lock_time,
            events,
            handler,
        }
    }

    /// Job type this processor works.
    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// Poll forever. Sleeps [`IDLE_BACKOFF`] only when nothing was due;
    /// after an interrupted tick it goes straight back to fetching.
    pub async fn run(self) {
        info!(job_type = %self.job_type, "Worker loop started");

        loop {
            match self.tick().await {
                TickOutcome::Idle => tokio::time::sleep(IDLE_BACKOFF).await,
                _ => tokio::task::yield_now().await,
            }
        }
    }

    /// One pass: fetch, reserve, lock, dispatch, finalize.
    pub async fn tick(&self) -> TickOutcome {
        let job_type = self.job_type.as_str();

        let due = match self.index.next_due(job_type, now_millis()).await {
            Ok(Some(due)) => due,
            Ok(None) => return TickOutcome::Idle,
            Err(e) => {
                self.events.error(
                    format_args!("Failed to fetch member from {}", self.keys.type_key(job_type)),
                    e,
                );
                return TickOutcome::Interrupted {
                    stage: Stage::Fetching,
                };
            }
        };
        let id = due.id;

        let reserved_until = millis_after(now_millis(), RESERVATION_HORIZON);
        if let Err(e) = self.index.schedule(job_type, &id, reserved_until).await {
            self.events
                .error(format_args!("Failed to update {}:{}", job_type, id), e);
            return TickOutcome::Interrupted {
                stage: Stage::Reserving,
            };
        }

        let lock_key = self.keys.lock_key(job_type, &id);
        let lease = match self.locks.acquire(&lock_key, self.lock_time).await {
            Ok(lease) => lease,
            Err(e) => {
                // Still reserved: due again once the horizon passes.
                self.events
                    .error(format_args!("Failed to lock {}:{}", job_type, id), e);
                return TickOutcome::Interrupted {
                    stage: Stage::Locking,
                };
            }
        };

        debug!(job_type, job_id = %id, ready_at = due.ready_at, "Claimed job");
        let item = WorkItem::new(job_type.to_string(), id.clone(), due.ready_at, lease);

        let completion = self.dispatch(item.clone()).await;
        let failed = completion.is_err();
        if let Some(error) = completion.error {
            self.events
                .job_error(job_type, &id, QueueError::Processing(error));
        }

        if let Err(e) = item.unlock().await {
            self.events
                .error(format_args!("Failed to unlock {}:{}", job_type, id), e);
        }

        let wait = completion.offset.unwrap_or(self.default_wait);
        let next_run = millis_after(now_millis(), wait);
        if let Err(e) = self.index.schedule(job_type, &id, next_run).await {
            self.events.error(
                format_args!("Failed to update the time for {}:{}", job_type, id),
                e,
            );
        }

        debug!(job_type, job_id = %id, next_run, failed, "Finished job");
        TickOutcome::Processed { id, failed }
    }

    /// Run the handler on its own task so a panic becomes a job error
    /// instead of taking the loop down.
    async fn dispatch(&self, item: WorkItem) -> Completion {
        let work = (self.handler)(item);
        match tokio::spawn(work).await {
            Ok(completion) => completion,
            Err(e) => Completion::err(format_args!("handler aborted: {}", e)),
        }
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("job_type", &self.job_type)
            .field("default_wait", &self.default_wait)
            .field("lock_time", &self.lock_time)
            .finish_non_exhaustive()
    }
}
