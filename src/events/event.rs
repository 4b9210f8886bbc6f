//! # Runtime events emitted by the queues, supervisors and hub.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Admission events**: a task entering the queue and being admitted
//! - **Worker events**: child slots, spawns, payload delivery, forwarded messages, termination
//! - **Settlement events**: how a task ended (success, failure, timeout, abnormal exit)
//! - **Runtime events**: shutdown progress and subscriber faults
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use actionvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TimeoutHit)
//!     .with_task("execute-1")
//!     .with_webhook("wh-9")
//!     .with_timeout(Duration::from_secs(3600));
//!
//! assert_eq!(ev.kind, EventKind::TimeoutHit);
//! assert_eq!(ev.task.as_deref(), Some("execute-1"));
//! assert_eq!(ev.timeout_ms, Some(3_600_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::request::TaskLabel;
use crate::worker::ExitInfo;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `task` (subscriber name) and `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `task` (subscriber name) and `reason`.
    SubscriberOverflow,

    // === Shutdown events ===
    /// `Hub::shutdown` was called; queues stop admitting work.
    ShutdownRequested,

    /// Every in-flight task settled within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; `reason` lists the worker tasks still alive.
    GraceExceeded,

    // === Admission events ===
    /// Task entered an admission queue.
    ///
    /// Sets `task`, `webhook_id`, `active` (tasks waiting in that queue).
    TaskQueued,

    /// Task left the queue and began executing.
    ///
    /// Sets `task`, `webhook_id`.
    TaskAdmitted,

    // === Worker events ===
    /// Every child slot is taken; the task waits for one to free up.
    ///
    /// Sets `task`, `webhook_id`, `active` (live workers of that variant).
    ChildSlotWaiting,

    /// Child slot acquired.
    ///
    /// Sets `task`, `webhook_id`, `active` (live workers including this one).
    ChildSlotAcquired,

    /// Worker process started.
    ///
    /// Sets `task`, `webhook_id`, `pid` (when known).
    WorkerSpawned,

    /// Request payload written to the worker.
    PayloadSent,

    /// Streaming worker produced an intermediate message that was forwarded.
    MessageForwarded,

    /// Worker process was killed and reaped; its slot is free again.
    ///
    /// Sets `task`, `webhook_id`, `pid`.
    WorkerTerminated,

    // === Settlement events ===
    /// Task settled successfully.
    TaskSucceeded,

    /// Task failed (worker error, spawn failure, queue closed).
    ///
    /// Sets `reason`.
    TaskFailed,

    /// Task exceeded its timeout; the worker is being killed.
    ///
    /// Sets `timeout_ms`.
    TimeoutHit,

    /// Worker exited or disconnected before finishing.
    ///
    /// Sets `reason`, `exit` (when the process status is known).
    AbnormalExit,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Queue-local task id (or subscriber name for subscriber events).
    pub task: Option<Arc<str>>,
    /// Correlation id extracted from the request payload.
    pub webhook_id: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Worker exit status.
    pub exit: Option<ExitInfo>,
    /// Worker process id.
    pub pid: Option<u32>,
    /// Gauge at the time of the event (queued tasks or live workers).
    pub active: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            webhook_id: None,
            reason: None,
            timeout_ms: None,
            exit: None,
            pid: None,
            active: None,
        }
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a webhook id.
    #[inline]
    pub fn with_webhook(mut self, webhook_id: impl Into<Arc<str>>) -> Self {
        self.webhook_id = Some(webhook_id.into());
        self
    }

    /// Attaches task id and webhook id from a label.
    #[inline]
    pub fn with_label(mut self, label: &TaskLabel) -> Self {
        self.task = Some(label.id_arc());
        self.webhook_id = label.webhook_arc();
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches a worker exit status.
    #[inline]
    pub fn with_exit(mut self, exit: ExitInfo) -> Self {
        self.exit = Some(exit);
        self
    }

    /// Attaches a worker pid, if known.
    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Attaches a gauge value.
    #[inline]
    pub fn with_active(mut self, n: usize) -> Self {
        self.active = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }

    /// Whether this event reports a task settling (one per task).
    #[inline]
    pub fn is_settlement(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskSucceeded
                | EventKind::TaskFailed
                | EventKind::TimeoutHit
                | EventKind::AbnormalExit
        )
    }
}
