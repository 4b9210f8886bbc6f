//! # Process queues: an admission queue bound to one supervisor.
//!
//! - [`SingleShotQueue`]: `submit` resolves with the worker's single message.
//! - [`StreamingQueue`]: `submit` returns a [`ResponseStream`] immediately;
//!   chunks arrive as the worker emits them.
//!
//! Both assign queue-local task ids (`execute-N` / `extended-N`) used in events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::SettleError;
use crate::events::Bus;
use crate::request::{ExecutionRequest, TaskLabel};

use super::admission::AdmissionQueue;
use super::settle::Settlement;
use super::single_shot::SingleShotSupervisor;
use super::streaming::{ResponseStream, StreamingSupervisor};

struct QueueBase {
    prefix: &'static str,
    next_id: AtomicU64,
    admission: AdmissionQueue,
}

impl QueueBase {
    fn new(prefix: &'static str, limit: Option<usize>, bus: Bus, token: CancellationToken) -> Self {
        Self {
            prefix,
            next_id: AtomicU64::new(1),
            admission: AdmissionQueue::new(limit, bus, token),
        }
    }

    fn label(&self, request: &ExecutionRequest) -> TaskLabel {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        TaskLabel::new(format!("{}-{n}", self.prefix), request)
    }
}

/// FIFO queue in front of a [`SingleShotSupervisor`].
#[derive(Clone)]
pub struct SingleShotQueue {
    base: Arc<QueueBase>,
    supervisor: SingleShotSupervisor,
}

impl SingleShotQueue {
    /// Creates a queue admitting at most `limit` tasks at once (`None` = unlimited).
    pub fn new(
        supervisor: SingleShotSupervisor,
        limit: Option<usize>,
        bus: Bus,
        token: CancellationToken,
    ) -> Self {
        Self {
            base: Arc::new(QueueBase::new("execute", limit, bus, token)),
            supervisor,
        }
    }

    /// Submits a request and waits for its settlement.
    pub async fn submit(&self, request: impl Into<ExecutionRequest>) -> Result<String, SettleError> {
        let request = request.into();
        let label = self.base.label(&request);
        let (mut settlement, rx) = Settlement::channel();

        let supervisor = self.supervisor.clone();
        let task_label = label.clone();
        let run = async move {
            let res = supervisor.execute(&task_label, &request).await;
            settlement.settle(res);
        }
        .boxed();

        self.base.admission.push(label, run)?;
        Settlement::wait(rx).await
    }

    /// The underlying admission queue.
    pub fn admission(&self) -> &AdmissionQueue {
        &self.base.admission
    }

    /// The supervisor running admitted tasks.
    pub fn supervisor(&self) -> &SingleShotSupervisor {
        &self.supervisor
    }
}

/// FIFO queue in front of a [`StreamingSupervisor`].
#[derive(Clone)]
pub struct StreamingQueue {
    base: Arc<QueueBase>,
    supervisor: StreamingSupervisor,
}

impl StreamingQueue {
    /// Creates a queue admitting at most `limit` tasks at once (`None` = unlimited).
    pub fn new(
        supervisor: StreamingSupervisor,
        limit: Option<usize>,
        bus: Bus,
        token: CancellationToken,
    ) -> Self {
        Self {
            base: Arc::new(QueueBase::new("extended", limit, bus, token)),
            supervisor,
        }
    }

    /// Submits a request; the returned stream yields its forwarded messages.
    ///
    /// If the queue is closed, the stream yields only [`SettleError::QueueClosed`].
    pub fn submit(&self, request: impl Into<ExecutionRequest>) -> ResponseStream {
        let request = request.into();
        let label = self.base.label(&request);
        let (sink, stream) = ResponseStream::channel();

        let supervisor = self.supervisor.clone();
        let task_label = label.clone();
        let run = async move {
            let mut sink = sink;
            let res = supervisor.execute(&task_label, &request, &sink.chunks).await;
            // Close the chunk channel before settling so the caller drains every chunk first.
            drop(sink.chunks);
            sink.done.settle(res);
        }
        .boxed();

        match self.base.admission.push(label, run) {
            Ok(()) => stream,
            Err(err) => ResponseStream::failed(err),
        }
    }

    /// The underlying admission queue.
    pub fn admission(&self) -> &AdmissionQueue {
        &self.base.admission
    }

    /// The supervisor running admitted tasks.
    pub fn supervisor(&self) -> &StreamingSupervisor {
        &self.supervisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DONE_MESSAGE;
    use crate::worker::scripted::{ScriptedSpawner, msg, sleep};
    use futures::StreamExt;
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn single_shot_submit_resolves_with_message() {
        let spawner = Arc::new(ScriptedSpawner::repeating(vec![sleep(1), msg("ok")]));
        let bus = Bus::new(64);
        let sup = SingleShotSupervisor::new(spawner.clone(), bus.clone(), HOUR);
        let queue = SingleShotQueue::new(sup, Some(2), bus, CancellationToken::new());

        let (a, b, c) = tokio::join!(
            queue.submit(r#"{"webhookId":"a"}"#),
            queue.submit(r#"{"webhookId":"b"}"#),
            queue.submit(r#"{"webhookId":"c"}"#),
        );
        assert_eq!((a, b, c), (Ok("ok".into()), Ok("ok".into()), Ok("ok".into())));
        let stats = spawner.stats();
        assert_eq!(stats.spawned, 3);
        assert_eq!(stats.peak, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_submit_yields_chunks_then_ends() {
        let spawner = Arc::new(ScriptedSpawner::repeating(vec![
            msg("a"),
            msg("b"),
            msg(DONE_MESSAGE),
        ]));
        let bus = Bus::new(64);
        let sup = StreamingSupervisor::new(spawner, bus.clone(), 2 * HOUR, DONE_MESSAGE)
            .with_child_limit(Some(2));
        let queue = StreamingQueue::new(sup, None, bus, CancellationToken::new());

        let mut stream = queue.submit("{}");
        assert_eq!(stream.next().await, Some(Ok("a".to_string())));
        assert_eq!(stream.next().await, Some(Ok("b".to_string())));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_queues_reject_submissions() {
        let spawner = Arc::new(ScriptedSpawner::repeating(vec![msg("ok")]));
        let bus = Bus::new(64);
        let token = CancellationToken::new();
        let single = SingleShotQueue::new(
            SingleShotSupervisor::new(spawner.clone(), bus.clone(), HOUR),
            None,
            bus.clone(),
            token.child_token(),
        );
        let streaming = StreamingQueue::new(
            StreamingSupervisor::new(spawner.clone(), bus.clone(), HOUR, DONE_MESSAGE),
            None,
            bus,
            token.child_token(),
        );
        token.cancel();

        assert_eq!(single.submit("{}").await, Err(SettleError::QueueClosed));
        assert_eq!(
            streaming.submit("{}").collect_all().await,
            Err(SettleError::QueueClosed)
        );
        assert_eq!(spawner.stats().spawned, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn task_ids_are_queue_local() {
        let spawner = Arc::new(ScriptedSpawner::repeating(vec![msg("ok")]));
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let queue = SingleShotQueue::new(
            SingleShotSupervisor::new(spawner, bus.clone(), HOUR),
            None,
            bus,
            CancellationToken::new(),
        );
        queue.submit("{}").await.unwrap();
        queue.submit("{}").await.unwrap();

        let mut ids = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == crate::events::EventKind::TaskQueued {
                ids.extend(ev.task.as_deref().map(str::to_string));
            }
        }
        assert_eq!(ids, vec!["execute-1", "execute-2"]);
    }
}
