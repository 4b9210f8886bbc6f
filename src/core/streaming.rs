//! # Streaming supervisor.
//!
//! The worker may send any number of intermediate messages before a reserved
//! sentinel (the *done message*). Each intermediate message is forwarded to the
//! caller immediately, in emission order; only the sentinel settles the task
//! successfully. A failure after some messages were forwarded still settles as
//! a failure; the caller sees the forwarded chunks first, then the error.
//!
//! Live workers are capped by a [`ChildGate`] (2 by default), independent of the
//! admission queue's own limit.
//!
//! At most `CHUNK_BUFFER` (128) chunks wait for the caller. A caller that stops
//! reading stalls the relay, and the worker then runs into its timeout.
//!
//! ```text
//! acquire slot ──► spawn ──► send payload
//!                               │
//!      msg != done ──► forward to caller (chunk), keep listening
//!      msg == done ──► Success(forwarded count)
//!      error/exit/disconnect/close/timeout ──► failure
//!                               │
//!                kill ──► slot released (drop) ──► next waiter spawns
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::SettleError;
use crate::events::{Bus, Event, EventKind};
use crate::request::{ExecutionRequest, TaskLabel};
use crate::worker::Spawn;

use super::gate::ChildGate;
use super::runner::{self, Relay};
use super::settle::{Settlement, SettlementRx};

/// Chunks buffered between a streaming worker and its caller.
pub(crate) const CHUNK_BUFFER: usize = 128;

struct Forward<'a> {
    sentinel: &'a str,
    chunks: &'a mpsc::Sender<String>,
    bus: &'a Bus,
    label: &'a TaskLabel,
    forwarded: u64,
}

#[async_trait]
impl<'a> Relay for Forward<'a> {
    type Output = u64;

    async fn on_message(&mut self, message: String) -> Option<u64> {
        if message == self.sentinel {
            return Some(self.forwarded);
        }
        self.forwarded += 1;
        // A caller that dropped its stream only loses the chunks; the worker still runs to completion.
        let _ = self.chunks.send(message).await;
        self.bus
            .publish(Event::new(EventKind::MessageForwarded).with_label(self.label));
        None
    }
}

/// Supervisor relaying a stream of messages terminated by a sentinel.
#[derive(Clone)]
pub struct StreamingSupervisor {
    spawner: Arc<dyn Spawn>,
    bus: Bus,
    timeout: Duration,
    sentinel: Arc<str>,
    gate: Option<ChildGate>,
}

impl StreamingSupervisor {
    /// Creates a supervisor with the given timeout and done message, without a child cap.
    pub fn new(
        spawner: Arc<dyn Spawn>,
        bus: Bus,
        timeout: Duration,
        sentinel: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            spawner,
            bus,
            timeout,
            sentinel: sentinel.into(),
            gate: None,
        }
    }

    /// Caps live workers at `limit` (`None` = uncapped).
    pub fn with_child_limit(mut self, limit: Option<usize>) -> Self {
        self.gate = limit.map(ChildGate::new);
        self
    }

    /// Child gate, when a cap is configured.
    pub fn gate(&self) -> Option<&ChildGate> {
        self.gate.as_ref()
    }

    /// The done message ending a successful stream.
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Runs `request` to completion, forwarding intermediate messages to `chunks`.
    ///
    /// Returns the number of forwarded messages once the sentinel arrives. This
    /// is the task-completion result; it is independent of what the caller
    /// already received through `chunks`.
    pub async fn execute(
        &self,
        label: &TaskLabel,
        request: &ExecutionRequest,
        chunks: &mpsc::Sender<String>,
    ) -> Result<u64, SettleError> {
        let _slot = match &self.gate {
            Some(gate) => Some(gate.acquire(&self.bus, label).await?),
            None => None,
        };
        let mut relay = Forward {
            sentinel: &self.sentinel,
            chunks,
            bus: &self.bus,
            label,
            forwarded: 0,
        };
        runner::supervise(
            self.spawner.as_ref(),
            &self.bus,
            label,
            self.timeout,
            request.payload(),
            &mut relay,
        )
        .await
    }
}

/// Producer half of a [`ResponseStream`], owned by the running task.
pub(crate) struct StreamSink {
    pub(crate) chunks: mpsc::Sender<String>,
    pub(crate) done: Settlement<u64>,
}

/// Caller-facing output of one streaming task.
///
/// Yields every forwarded message as `Ok(chunk)` in emission order. If the task
/// fails, the last item is `Err(_)`; on success the stream simply ends.
pub struct ResponseStream {
    chunks: mpsc::Receiver<String>,
    done: Option<SettlementRx<u64>>,
}

impl ResponseStream {
    pub(crate) fn channel() -> (StreamSink, ResponseStream) {
        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        let (done, done_rx) = Settlement::channel();
        (
            StreamSink { chunks: tx, done },
            ResponseStream {
                chunks: rx,
                done: Some(done_rx),
            },
        )
    }

    /// A stream that yields only `err`.
    pub fn failed(err: SettleError) -> Self {
        let (mut sink, stream) = Self::channel();
        sink.done.settle(Err(err));
        stream
    }

    /// Collects all chunks, or returns the failure that ended the stream.
    pub async fn collect_all(mut self) -> Result<Vec<String>, SettleError> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }
}

impl Stream for ResponseStream {
    type Item = Result<String, SettleError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Chunks end when the task drops its sender; only then read the settlement.
        match this.chunks.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => return Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(None) => {}
            Poll::Pending => return Poll::Pending,
        }

        let Some(done) = this.done.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(done).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(res) => {
                this.done = None;
                match res {
                    Ok(Ok(_forwarded)) => Poll::Ready(None),
                    Ok(Err(e)) => Poll::Ready(Some(Err(e))),
                    Err(_dropped) => Poll::Ready(Some(Err(SettleError::Abandoned))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DONE_MESSAGE;
    use crate::worker::scripted::{ScriptedSpawner, Step, exit, msg, sleep};
    use crate::worker::{Termination, WorkerSignal};
    use tokio::time::Instant;

    const TWO_HOURS: Duration = Duration::from_secs(2 * 60 * 60);

    fn supervisor(spawner: &Arc<ScriptedSpawner>, limit: usize) -> StreamingSupervisor {
        StreamingSupervisor::new(spawner.clone(), Bus::new(256), TWO_HOURS, DONE_MESSAGE)
            .with_child_limit(Some(limit))
    }

    async fn run(
        sup: &StreamingSupervisor,
        id: &str,
    ) -> (Result<u64, SettleError>, ResponseStream) {
        let req = ExecutionRequest::from(r#"{"webhookId":"wh-s"}"#);
        let label = TaskLabel::new(id.to_string(), &req);
        let (mut sink, stream) = ResponseStream::channel();
        let res = sup.execute(&label, &req, &sink.chunks).await;
        drop(sink.chunks);
        sink.done.settle(res.clone());
        (res, stream)
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_are_forwarded_in_order_until_sentinel() {
        let spawner = Arc::new(ScriptedSpawner::repeating(vec![
            msg("one"),
            sleep(1),
            msg("two"),
            msg(DONE_MESSAGE),
            msg("after done"),
        ]));
        let sup = supervisor(&spawner, 2);

        let (res, stream) = run(&sup, "extended-1").await;
        assert_eq!(res, Ok(2));
        assert_eq!(stream.collect_all().await, Ok(vec!["one".into(), "two".into()]));
        assert_eq!(spawner.stats().kills, 1);
        assert_eq!(sup.gate().map(ChildGate::active), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_after_partial_output_surfaces_both() {
        let spawner = Arc::new(ScriptedSpawner::repeating(vec![msg("partial"), exit(7)]));
        let sup = supervisor(&spawner, 2);

        let (res, mut stream) = run(&sup, "extended-1").await;
        assert!(matches!(res, Err(SettleError::AbnormalExit { .. })));

        assert_eq!(stream.next().await, Some(Ok("partial".to_string())));
        match stream.next().await {
            Some(Err(SettleError::AbnormalExit {
                termination: Termination::Exit(info),
            })) => assert_eq!(info.code, Some(7)),
            other => panic!("unexpected item: {other:?}"),
        }
        assert_eq!(stream.next().await, None);
        assert_eq!(sup.gate().map(ChildGate::active), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn third_task_waits_for_a_free_child_slot() {
        let spawner = Arc::new(ScriptedSpawner::repeating(vec![
            sleep(10),
            msg("chunk"),
            msg(DONE_MESSAGE),
        ]));
        let sup = supervisor(&spawner, 2);
        let start = Instant::now();

        let mut handles = Vec::new();
        for i in 1..=3 {
            let sup = sup.clone();
            handles.push(tokio::spawn(async move {
                run(&sup, &format!("extended-{i}")).await.0
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), Ok(1));
        }

        let stats = spawner.stats();
        assert_eq!(stats.spawned, 3);
        assert_eq!(stats.peak, 2);
        let mut times = stats.spawn_times.clone();
        times.sort();
        assert_eq!(times[0], start);
        assert_eq!(times[1], start);
        assert!(times[2] >= start + Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_stream_times_out_after_two_hours() {
        let spawner = Arc::new(ScriptedSpawner::repeating(vec![msg("started")]));
        let sup = supervisor(&spawner, 2);
        let start = Instant::now();

        let (res, stream) = run(&sup, "extended-1").await;
        assert_eq!(res, Err(SettleError::Timeout { timeout: TWO_HOURS }));
        assert_eq!(start.elapsed(), TWO_HOURS);
        assert!(stream.collect_all().await.unwrap_err().is_timeout());
        assert_eq!(spawner.stats().kills, 1);
        assert_eq!(sup.gate().map(ChildGate::active), Some(0));
    }

    /// With a single slot, the next task only spawns if the failed one released it.
    async fn assert_slot_released(sup: &StreamingSupervisor, spawner: &ScriptedSpawner) {
        assert_eq!(sup.gate().map(ChildGate::active), Some(0));
        let spawned = spawner.stats().spawned;

        let next = tokio::time::timeout(Duration::from_secs(60), run(sup, "extended-2"))
            .await
            .expect("second task never got the child slot");
        assert_eq!(next.0, Ok(0));
        assert_eq!(spawner.stats().spawned, spawned + 1);
        assert_eq!(sup.gate().map(ChildGate::active), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_releases_the_child_slot() {
        let spawner = Arc::new(ScriptedSpawner::sequence(vec![
            vec![],
            vec![msg(DONE_MESSAGE)],
        ]));
        let sup = supervisor(&spawner, 1);

        let (res, _stream) = run(&sup, "extended-1").await;
        assert_eq!(res, Err(SettleError::Timeout { timeout: TWO_HOURS }));
        assert_slot_released(&sup, &spawner).await;
    }

    #[tokio::test(start_paused = true)]
    async fn worker_error_releases_the_child_slot() {
        let spawner = Arc::new(ScriptedSpawner::sequence(vec![
            vec![msg("partial"), Step::Emit(WorkerSignal::Error("boom".into()))],
            vec![msg(DONE_MESSAGE)],
        ]));
        let sup = supervisor(&spawner, 1);

        let (res, _stream) = run(&sup, "extended-1").await;
        assert_eq!(
            res,
            Err(SettleError::Worker {
                error: "boom".into()
            })
        );
        assert_slot_released(&sup, &spawner).await;
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_failure_releases_the_child_slot() {
        let spawner = Arc::new(ScriptedSpawner::failing_first(1, vec![msg(DONE_MESSAGE)]));
        let sup = supervisor(&spawner, 1);

        let (res, _stream) = run(&sup, "extended-1").await;
        assert_eq!(res.unwrap_err().as_label(), "settle_spawn_failed");
        assert_eq!(spawner.stats().spawned, 0);
        assert_slot_released(&sup, &spawner).await;
    }

    #[tokio::test(start_paused = true)]
    async fn unread_chunks_are_bounded_and_the_worker_times_out() {
        let mut script: Vec<Step> = (0..CHUNK_BUFFER + 50)
            .map(|i| msg(&format!("chunk-{i}")))
            .collect();
        script.push(msg(DONE_MESSAGE));
        let spawner = Arc::new(ScriptedSpawner::repeating(script));
        let sup = supervisor(&spawner, 1);
        let start = Instant::now();

        // Nobody reads while the task runs.
        let (res, mut stream) = run(&sup, "extended-1").await;
        assert_eq!(res, Err(SettleError::Timeout { timeout: TWO_HOURS }));
        assert_eq!(start.elapsed(), TWO_HOURS);
        assert_eq!(spawner.stats().kills, 1);

        let mut received = Vec::new();
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => received.push(chunk),
                Err(e) => failure = Some(e),
            }
        }
        assert_eq!(received.len(), CHUNK_BUFFER);
        assert_eq!(received.first().map(String::as_str), Some("chunk-0"));
        assert!(failure.is_some_and(|e| e.is_timeout()));
    }

    #[tokio::test]
    async fn failed_stream_yields_only_the_error() {
        let mut stream = ResponseStream::failed(SettleError::QueueClosed);
        assert_eq!(stream.next().await, Some(Err(SettleError::QueueClosed)));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn dropped_sink_is_abandoned() {
        let (sink, stream) = ResponseStream::channel();
        drop(sink);
        assert_eq!(stream.collect_all().await, Err(SettleError::Abandoned));
    }
}
