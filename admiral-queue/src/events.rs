//! Observable worker-loop events.

use serde::Serialize;
use std::fmt::Display;
use tokio::sync::broadcast;
use tracing::{error, warn};

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Events a worker loop reports to its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Infrastructure failure: the store or the lock service misbehaved.
    Error { message: String },

    /// A processing function reported failure.
    JobError {
        job_type: String,
        id: String,
        message: String,
    },
}

impl QueueEvent {
    /// `"error"` or `"job error"`.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueEvent::Error { .. } => "error",
            QueueEvent::JobError { .. } => "job error",
        }
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        match self {
            QueueEvent::Error { message } => message,
            QueueEvent::JobError { message, .. } => message,
        }
    }

    pub fn is_job_error(&self) -> bool {
        matches!(self, QueueEvent::JobError { .. })
    }
}

/// Fan-out of [`QueueEvent`]s to any number of listeners.
///
/// Emitting with nobody subscribed is fine; a slow subscriber that falls
/// more than the channel capacity behind sees `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<QueueEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventEmitter {
    /// Create an emitter buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Add a listener.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver an event to every listener.
    pub fn emit(&self, event: QueueEvent) {
        let _ = self.tx.send(event);
    }

    /// Report an infrastructure failure, prefixed by what was being attempted.
    pub fn error(&self, context: impl Display, err: impl Display) {
        let message = format!("{}: {}", context, err);
        error!(%message, "Queue error");
        self.emit(QueueEvent::Error { message });
    }

    /// Report a failure signalled by a processing function.
    pub fn job_error(&self, job_type: &str, id: &str, err: impl Display) {
        let message = err.to_string();
        warn!(job_type, job_id = id, %message, "Job reported an error");
        self.emit(QueueEvent::JobError {
            job_type: job_type.to_string(),
            id: id.to_string(),
            message,
        });
    }
}
