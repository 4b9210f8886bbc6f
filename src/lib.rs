//! # actionvisor
//!
//! **actionvisor** runs opaque execution requests in isolated worker
//! processes, one process per request, with hard wall-clock timeouts, a cap
//! on live workers and exactly one settlement per request.
//!
//! ## Architecture
//! ```text
//!   submit(request, mode)
//!            │
//!            ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Hub                                                             │
//! │  - Bus (broadcast events)      - SubscriberSet (LogWriter, ...)  │
//! │  - LiveWorkers (stuck-worker report on shutdown)                 │
//! └──────┬──────────────────────────────────────────┬────────────────┘
//!        ▼                                          ▼
//!  SingleShotQueue                            StreamingQueue
//!  AdmissionQueue (FIFO, limit)               AdmissionQueue (FIFO, limit)
//!        ▼                                          ▼
//!  SingleShotSupervisor                       StreamingSupervisor
//!  (optional ChildGate, 1 h)                  (ChildGate = 2, 2 h)
//!        │                                          │
//!        └────────────► runner::supervise ◄─────────┘
//!                             │
//!          spawn ─► timer ─► send payload ─► race signals vs timer
//!                             │
//!                    Outcome ─► Settlement (once) ─► kill (always)
//! ```
//!
//! ### Worker protocol
//! ```text
//! parent ── stdin:  "<request payload as JSON string>\n" ──────────────► worker
//! parent ◄─ stdout: "<message>\n" ... ["PROCESS FINISHED"\n] ───────── worker
//! ```
//! A single-shot worker answers with one message. A streaming worker sends any
//! number of messages followed by the done message. Worker binaries can use
//! [`WorkerChannel`] for their side of the channel.
//!
//! ## Features
//! | Area              | Description                                              | Key types                                   |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Entry point**   | Route requests to either protocol, graceful shutdown.    | [`Hub`], [`HubBuilder`], [`ExecutionMode`]  |
//! | **Queues**        | FIFO admission with bounded parallelism.                 | [`SingleShotQueue`], [`StreamingQueue`]     |
//! | **Supervision**   | One worker per request, timeout, idempotent kill.        | [`SingleShotSupervisor`], [`StreamingSupervisor`] |
//! | **Workers**       | Process spawning and lifecycle signals.                  | [`Spawn`], [`WorkerProcess`], [`CommandSpawner`] |
//! | **Errors**        | Distinguish timeout, worker error and abnormal exit.     | [`SettleError`], [`RuntimeError`]           |
//! | **Observability** | Lifecycle events, subscribers, structured logs.          | [`Event`], [`Subscribe`], [`LogWriter`]     |
//! | **Configuration** | Defaults, environment loading.                           | [`Config`]                                  |
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use actionvisor::{CommandSpawner, Config, Hub};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     actionvisor::init_tracing();
//!
//!     let hub = Hub::builder(Config::default())
//!         .with_spawner(Arc::new(CommandSpawner::new("./action-worker")))
//!         .build()?;
//!
//!     let answer = hub.single_shot().submit(r#"{"webhookId":"wh-1"}"#).await?;
//!     println!("single-shot: {answer}");
//!
//!     let mut chunks = hub.streaming().submit(r#"{"webhookId":"wh-2"}"#);
//!     while let Some(chunk) = chunks.next().await {
//!         println!("chunk: {}", chunk?);
//!     }
//!
//!     hub.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod logging;
mod request;
mod subscribers;
mod worker;

pub use config::{Config, DONE_MESSAGE, Lifecycle, WorkerCommand};
pub use crate::core::{
    AdmissionQueue, ChildGate, ChildSlot, ExecutionMode, Hub, HubBuilder, Outcome, Response,
    ResponseStream, Settlement, SingleShotQueue, SingleShotSupervisor, StreamingQueue,
    StreamingSupervisor,
};
pub use error::{ConfigError, RuntimeError, SettleError, TIMEOUT_MESSAGE};
pub use events::{Bus, Event, EventKind};
pub use logging::{LogFormat, init_tracing};
pub use request::{ExecutionRequest, HasCorrelationId, TaskLabel};
pub use subscribers::{LiveWorkers, LogWriter, Subscribe, SubscriberSet};
pub use worker::{
    ChildWorker, CommandSpawner, ExitInfo, Spawn, Termination, WorkerChannel, WorkerProcess,
    WorkerSignal, frame,
};
