//! # Admission queue: FIFO front door with bounded parallelism.
//!
//! Submissions are pushed onto an unbounded FIFO channel. A single dispatcher
//! task pops them in order and, when a limit is configured, waits for a permit
//! from a fair semaphore before spawning each one. Admission order therefore
//! equals submission order; completion order is unconstrained.
//!
//! ```text
//! push ──► [FIFO] ──► dispatcher ──► permit? ──► tracker.spawn(task) ──► permit dropped
//!                         │
//!                  close(): stop, drop waiting tasks
//! ```
//!
//! ## Rules
//! - The queue never inspects a task; it only runs the boxed future.
//! - Tasks still waiting when the queue closes are dropped unrun; whatever
//!   settlement they carry reports abandonment.
//! - Admitted tasks keep running after `close()`; [`AdmissionQueue::wait`] awaits them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::SettleError;
use crate::events::{Bus, Event, EventKind};
use crate::request::TaskLabel;

/// One submission waiting for admission.
struct QueuedTask {
    label: TaskLabel,
    run: BoxFuture<'static, ()>,
}

#[derive(Default)]
struct Gauges {
    queued: AtomicUsize,
    running: AtomicUsize,
}

/// Decrements `running` when an admitted task finishes (or unwinds).
struct RunningGuard {
    gauges: Arc<Gauges>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.gauges.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// FIFO queue admitting at most `limit` tasks at a time.
pub struct AdmissionQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
    limit: Option<usize>,
    gauges: Arc<Gauges>,
    tracker: TaskTracker,
    token: CancellationToken,
    bus: Bus,
}

impl AdmissionQueue {
    /// Creates a queue and spawns its dispatcher.
    ///
    /// - `limit = None` → every task is admitted as soon as it is popped
    /// - `limit = Some(n)` → at most `n` admitted tasks in flight (`n` clamped to ≥ 1)
    ///
    /// Cancelling `token` closes the queue.
    pub fn new(limit: Option<usize>, bus: Bus, token: CancellationToken) -> Self {
        let limit = limit.map(|n| n.max(1));
        let (tx, rx) = mpsc::unbounded_channel();
        let gauges = Arc::new(Gauges::default());
        let tracker = TaskTracker::new();

        let dispatcher = Dispatcher {
            rx,
            permits: limit.map(|n| Arc::new(Semaphore::new(n))),
            gauges: Arc::clone(&gauges),
            tracker: tracker.clone(),
            token: token.clone(),
            bus: bus.clone(),
        };
        tracker.spawn(dispatcher.run());

        Self {
            tx,
            limit,
            gauges,
            tracker,
            token,
            bus,
        }
    }

    /// Enqueues a task. Fails with [`SettleError::QueueClosed`] after `close()`.
    ///
    /// On failure `run` is dropped without being polled.
    pub fn push(&self, label: TaskLabel, run: BoxFuture<'static, ()>) -> Result<(), SettleError> {
        if self.token.is_cancelled() {
            return Err(SettleError::QueueClosed);
        }
        let queued = self.gauges.queued.fetch_add(1, Ordering::AcqRel) + 1;
        let ev = Event::new(EventKind::TaskQueued)
            .with_label(&label)
            .with_active(queued);

        if self.tx.send(QueuedTask { label, run }).is_err() {
            self.gauges.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(SettleError::QueueClosed);
        }
        self.bus.publish(ev);
        Ok(())
    }

    /// Tasks waiting for admission.
    pub fn queued(&self) -> usize {
        self.gauges.queued.load(Ordering::Acquire)
    }

    /// Admitted tasks still running.
    pub fn running(&self) -> usize {
        self.gauges.running.load(Ordering::Acquire)
    }

    /// Admission limit (`None` = unlimited).
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Stops admitting; waiting tasks are dropped.
    pub fn close(&self) {
        self.token.cancel();
        self.tracker.close();
    }

    /// True once the queue was closed.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until the queue is closed and every admitted task has finished.
    pub async fn wait(&self) {
        self.token.cancelled().await;
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Drop for AdmissionQueue {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct Dispatcher {
    rx: mpsc::UnboundedReceiver<QueuedTask>,
    permits: Option<Arc<Semaphore>>,
    gauges: Arc<Gauges>,
    tracker: TaskTracker,
    token: CancellationToken,
    bus: Bus,
}

impl Dispatcher {
    async fn run(mut self) {
        while let Some(task) = self.next_task().await {
            let permit = match &self.permits {
                Some(sem) => {
                    let acquired = tokio::select! {
                        biased;
                        _ = self.token.cancelled() => None,
                        p = Arc::clone(sem).acquire_owned() => p.ok(),
                    };
                    match acquired {
                        Some(p) => Some(p),
                        None => {
                            self.gauges.queued.fetch_sub(1, Ordering::AcqRel);
                            drop(task);
                            break;
                        }
                    }
                }
                None => None,
            };
            self.admit(task, permit);
        }

        self.rx.close();
        while let Ok(task) = self.rx.try_recv() {
            self.gauges.queued.fetch_sub(1, Ordering::AcqRel);
            drop(task);
        }
    }

    async fn next_task(&mut self) -> Option<QueuedTask> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            task = self.rx.recv() => task,
        }
    }

    fn admit(&self, task: QueuedTask, permit: Option<OwnedSemaphorePermit>) {
        self.gauges.queued.fetch_sub(1, Ordering::AcqRel);
        self.gauges.running.fetch_add(1, Ordering::AcqRel);
        self.bus
            .publish(Event::new(EventKind::TaskAdmitted).with_label(&task.label));

        let guard = RunningGuard {
            gauges: Arc::clone(&self.gauges),
            _permit: permit,
        };
        self.tracker.spawn(async move {
            let _guard = guard;
            task.run.await;
        });
    }
}
