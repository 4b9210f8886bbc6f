//! # Hub: the process-supervision entry point.
//!
//! The [`Hub`] owns the event bus, the subscriber fan-out and both process
//! queues. Callers pick a protocol per request with [`ExecutionMode`].
//!
//! ## Architecture
//! ```text
//! submit(request, mode)
//!   ├─ SingleShot ──► SingleShotQueue ──► SingleShotSupervisor ──► Response::Complete(msg)
//!   └─ Streaming  ──► StreamingQueue  ──► StreamingSupervisor  ──► Response::Stream(chunks)
//!
//! Event flow:
//!   queues / gates / runner ── publish ──► Bus ──► hub listener ──┬─► LiveWorkers::update
//!                                                                └─► SubscriberSet::emit
//!
//! Shutdown:
//!   shutdown()
//!     └─► publish(ShutdownRequested)
//!     └─► runtime_token.cancel()  → both admission queues close, waiting requests are dropped
//!     └─► child gates close        → tasks waiting for a slot settle with QueueClosed
//!     └─► wait for admitted tasks up to cfg.grace:
//!            ├─ all settled → publish(AllStoppedWithin)
//!            └─ timeout     → publish(GraceExceeded), Err(stuck task ids)
//!     └─► stop the listener, drain every subscriber queue
//! ```
//!
//! ## Example
//! ```no_run
//! use actionvisor::{Config, ExecutionMode, Hub, Response};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     actionvisor::init_tracing();
//!     let hub = Hub::builder(Config::from_env()?).build()?;
//!
//!     match hub.submit(r#"{"webhookId":"wh-1"}"#, ExecutionMode::SingleShot).await? {
//!         Response::Complete(answer) => println!("{answer}"),
//!         Response::Stream(chunks) => println!("{:?}", chunks.collect_all().await?),
//!     }
//!
//!     hub.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::error::{RuntimeError, SettleError};
use crate::events::{Bus, Event, EventKind};
use crate::request::ExecutionRequest;
use crate::subscribers::{LiveWorkers, SubscriberSet};

use super::builder::HubBuilder;
use super::queue::{SingleShotQueue, StreamingQueue};
use super::shutdown;
use super::streaming::ResponseStream;

/// Which supervisor protocol runs a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One message is the whole answer (1 h default timeout).
    SingleShot,
    /// Intermediate messages until the done message (2 h default timeout, 2 live workers).
    Streaming,
}

/// Caller-facing result of [`Hub::submit`].
pub enum Response {
    /// The single-shot worker's message.
    Complete(String),
    /// Forwarded messages of a streaming worker.
    Stream(ResponseStream),
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Complete(msg) => f.debug_tuple("Complete").field(msg).finish(),
            Response::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Owns both process queues, event delivery and graceful shutdown.
pub struct Hub {
    cfg: Config,
    bus: Bus,
    alive: Arc<LiveWorkers>,
    token: CancellationToken,
    listener: CancellationToken,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    single_shot: SingleShotQueue,
    streaming: StreamingQueue,
}

impl Hub {
    /// Starts building a hub from `cfg`.
    pub fn builder(cfg: Config) -> HubBuilder {
        HubBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: SubscriberSet,
        token: CancellationToken,
        single_shot: SingleShotQueue,
        streaming: StreamingQueue,
    ) -> Self {
        let hub = Self {
            cfg,
            bus,
            alive: Arc::new(LiveWorkers::new()),
            token,
            listener: CancellationToken::new(),
            listener_task: Mutex::new(None),
            single_shot,
            streaming,
        };
        let task = hub.subscriber_listener(subs);
        if let Ok(mut slot) = hub.listener_task.lock() {
            *slot = Some(task);
        }
        hub
    }

    /// Submits a request to the queue selected by `mode`.
    ///
    /// Single-shot requests resolve once the worker answers; streaming requests
    /// return their stream immediately.
    pub async fn submit(
        &self,
        request: impl Into<ExecutionRequest>,
        mode: ExecutionMode,
    ) -> Result<Response, SettleError> {
        match mode {
            ExecutionMode::SingleShot => self.single_shot.submit(request).await.map(Response::Complete),
            ExecutionMode::Streaming => Ok(Response::Stream(self.streaming.submit(request))),
        }
    }

    /// Single-shot queue.
    pub fn single_shot(&self) -> &SingleShotQueue {
        &self.single_shot
    }

    /// Streaming queue.
    pub fn streaming(&self) -> &StreamingQueue {
        &self.streaming
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Receiver for every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Sorted ids of tasks whose worker process is alive.
    pub async fn live_workers(&self) -> Vec<String> {
        self.alive.snapshot().await
    }

    /// Stops admitting work and waits up to `cfg.grace` for admitted tasks.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] with the tasks that still own a
    /// worker when the grace period runs out. Their workers keep their own
    /// timeouts and are killed when those fire or when the runtime drops them.
    ///
    /// Subscribers have handled every event up to the final
    /// `AllStoppedWithin` / `GraceExceeded` when this returns.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let res = self.drain_tasks().await;
        self.stop_listener().await;
        res
    }

    async fn drain_tasks(&self) -> Result<(), RuntimeError> {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.token.cancel();
        for gate in [
            self.single_shot.supervisor().gate(),
            self.streaming.supervisor().gate(),
        ]
        .into_iter()
        .flatten()
        {
            gate.close();
        }

        let grace = self.cfg.grace;
        let drained = async {
            tokio::join!(
                self.single_shot.admission().wait(),
                self.streaming.admission().wait(),
            );
        };
        match tokio::time::timeout(grace, drained).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_elapsed) => {
                let stuck = self.alive.snapshot().await;
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded)
                        .with_reason(stuck.join(","))
                        .with_timeout(grace),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Serves until a termination signal arrives, then shuts down gracefully.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let signal = shutdown::wait_for_signal()
            .await
            .map_err(|e| RuntimeError::Signal {
                error: e.to_string(),
            })?;
        tracing::info!(signal, "termination signal received");
        self.shutdown().await
    }

    /// Stops the listener and waits until subscribers drained their queues.
    async fn stop_listener(&self) {
        self.listener.cancel();
        let task = self.listener_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "hub listener stopped abnormally");
            }
        }
    }

    /// Forwards bus events to the live-worker tracker and the subscriber set.
    ///
    /// On stop, events already published are still delivered before the
    /// subscriber queues are closed and drained.
    fn subscriber_listener(&self, subs: SubscriberSet) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let alive = Arc::clone(&self.alive);
        let stop = self.listener.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    ev = rx.recv() => ev,
                    _ = stop.cancelled() => break,
                };
                match received {
                    Ok(ev) => {
                        alive.update(&ev).await;
                        subs.emit(&ev);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "hub listener lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            loop {
                match rx.try_recv() {
                    Ok(ev) => {
                        alive.update(&ev).await;
                        subs.emit(&ev);
                    }
                    Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                        warn!(skipped, "hub listener lagged behind the event bus");
                    }
                    Err(_) => break,
                }
            }
            subs.shutdown().await;
        })
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.listener.cancel();
        self.token.cancel();
    }
}
