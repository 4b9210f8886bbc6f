//! # LogWriter: structured event logging
//!
//! Writes every [`Event`] through `tracing` with structured fields, so the
//! output format (text or JSON) is whatever subscriber the binary installed
//! (see [`init_tracing`](crate::init_tracing)).
//!
//! ## Levels
//! - `warn`: timeouts, abnormal exits, failures, grace exceeded, subscriber faults
//! - `info`: settlement success, spawns, terminations, shutdown progress
//! - `debug`: queueing, admission, child slots, payload delivery, forwarded messages

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber backed by `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let webhook = e.webhook_id.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::TaskQueued => {
                debug!(seq = e.seq, task, webhook, queued = e.active, "task queued");
            }
            EventKind::TaskAdmitted => {
                debug!(seq = e.seq, task, webhook, "task admitted");
            }
            EventKind::ChildSlotWaiting => {
                debug!(seq = e.seq, task, webhook, live = e.active, "waiting for child slot");
            }
            EventKind::ChildSlotAcquired => {
                debug!(seq = e.seq, task, webhook, live = e.active, "child slot acquired");
            }
            EventKind::WorkerSpawned => {
                info!(seq = e.seq, task, webhook, pid = e.pid, "worker spawned");
            }
            EventKind::PayloadSent => {
                debug!(seq = e.seq, task, webhook, pid = e.pid, "payload sent to worker");
            }
            EventKind::MessageForwarded => {
                debug!(seq = e.seq, task, webhook, "worker message forwarded");
            }
            EventKind::WorkerTerminated => {
                info!(seq = e.seq, task, webhook, pid = e.pid, "worker terminated");
            }
            EventKind::TaskSucceeded => {
                info!(seq = e.seq, task, webhook, "task succeeded");
            }
            EventKind::TaskFailed => {
                warn!(seq = e.seq, task, webhook, reason, "task failed");
            }
            EventKind::TimeoutHit => {
                warn!(
                    seq = e.seq,
                    task,
                    webhook,
                    timeout_ms = e.timeout_ms,
                    "killed execute process due to timeout"
                );
            }
            EventKind::AbnormalExit => {
                warn!(
                    seq = e.seq,
                    task,
                    webhook,
                    code = e.exit.and_then(|x| x.code),
                    signal = e.exit.and_then(|x| x.signal),
                    reason,
                    "worker exited abnormally"
                );
            }
            EventKind::ShutdownRequested => {
                info!(seq = e.seq, "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!(seq = e.seq, "all tasks settled within grace");
            }
            EventKind::GraceExceeded => {
                warn!(seq = e.seq, stuck = reason, "grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                warn!(seq = e.seq, subscriber = task, reason, "subscriber dropped event");
            }
            EventKind::SubscriberPanicked => {
                warn!(seq = e.seq, subscriber = task, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
