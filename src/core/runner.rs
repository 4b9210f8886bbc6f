//! # Supervise one worker lifetime.
//!
//! Shared base of both supervisor variants: spawn a worker, start its timer,
//! send the payload, and race worker signals against the timer until a
//! [`Relay`] declares success or a failure signal arrives.
//!
//! ## Event flow
//! ```text
//! spawn ──► WorkerSpawned ──► timer starts ──► send ──► PayloadSent
//!   │                                                     │
//!   └─ Err ──► TaskFailed                   signals ◄─────┘
//!                                              │
//!            Message ──► relay.on_message ── Some ──► TaskSucceeded
//!            Error   ──────────────────────────────► TaskFailed
//!            Exit / Disconnect / Close ────────────► AbnormalExit
//!            timer ────────────────────────────────► TimeoutHit
//!                                              │
//!                              kill (always) ──► WorkerTerminated
//! ```
//!
//! ## Rules
//! - Exactly one settlement event per call; the first signal wins.
//! - The timer is a `Sleep` owned by this future; it is dropped on every exit path.
//! - `kill` runs on every path, including success and after a natural exit.
//! - A broken pipe while sending means the worker already died; the exit status decides.
//! - A relay that waits (a caller not draining its chunks) still loses to the timer.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::error::SettleError;
use crate::events::{Bus, Event, EventKind};
use crate::request::TaskLabel;
use crate::worker::{Spawn, Termination, WorkerProcess, WorkerSignal};

use super::settle::Outcome;

/// Protocol-specific handling of worker messages.
#[async_trait]
pub(crate) trait Relay: Send {
    /// Value produced on success.
    type Output: Send;

    /// Handles one worker message; `Some` ends the lifetime successfully.
    async fn on_message(&mut self, message: String) -> Option<Self::Output>;
}

enum Wake {
    Signal(WorkerSignal),
    Deadline,
}

/// Runs one request in a fresh worker and returns its settlement.
pub(crate) async fn supervise<R: Relay>(
    spawner: &dyn Spawn,
    bus: &Bus,
    label: &TaskLabel,
    timeout: Duration,
    payload: &str,
    relay: &mut R,
) -> Result<R::Output, SettleError> {
    let worker = match spawner.spawn() {
        Ok(w) => w,
        Err(e) => {
            let err = SettleError::Spawn {
                error: e.to_string(),
            };
            bus.publish(
                Event::new(EventKind::TaskFailed)
                    .with_label(label)
                    .with_reason(err.to_string()),
            );
            return Err(err);
        }
    };

    bus.publish(
        Event::new(EventKind::WorkerSpawned)
            .with_label(label)
            .with_pid(worker.pid()),
    );

    run_worker(worker, bus, label, timeout, payload, relay)
        .await
        .into_result()
}

/// Drives one spawned worker to an [`Outcome`], then kills it.
pub(crate) async fn run_worker<R: Relay>(
    mut worker: Box<dyn WorkerProcess>,
    bus: &Bus,
    label: &TaskLabel,
    timeout: Duration,
    payload: &str,
    relay: &mut R,
) -> Outcome<R::Output> {
    let pid = worker.pid();
    let deadline = time::sleep_until(Instant::now() + timeout);
    tokio::pin!(deadline);

    let outcome = 'run: {
        let sent = tokio::select! {
            biased;
            res = worker.send(payload) => Some(res),
            _ = &mut deadline => None,
        };
        match sent {
            None => break 'run Outcome::Timeout(timeout),
            Some(Ok(())) => {
                bus.publish(
                    Event::new(EventKind::PayloadSent)
                        .with_label(label)
                        .with_pid(pid),
                );
            }
            Some(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(task = label.id(), error = %e, "worker closed stdin before the request was sent");
            }
            Some(Err(e)) => break 'run Outcome::WorkerError(format!("failed to send request: {e}")),
        }

        loop {
            let wake = tokio::select! {
                biased;
                sig = worker.next_signal() => Wake::Signal(sig),
                _ = &mut deadline => Wake::Deadline,
            };
            let signal = match wake {
                Wake::Signal(sig) => sig,
                Wake::Deadline => break 'run Outcome::Timeout(timeout),
            };
            match signal {
                WorkerSignal::Message(msg) => {
                    let handled = tokio::select! {
                        biased;
                        out = relay.on_message(msg) => Some(out),
                        _ = &mut deadline => None,
                    };
                    match handled {
                        None => break 'run Outcome::Timeout(timeout),
                        Some(Some(out)) => break 'run Outcome::Success(out),
                        Some(None) => {}
                    }
                }
                WorkerSignal::Error(error) => break 'run Outcome::WorkerError(error),
                WorkerSignal::Exit(info) => break 'run Outcome::AbnormalExit(Termination::Exit(info)),
                WorkerSignal::Disconnect => break 'run Outcome::AbnormalExit(Termination::Disconnect),
                WorkerSignal::Close(info) => {
                    break 'run Outcome::AbnormalExit(Termination::Close(info));
                }
            }
        }
    };

    publish_outcome(bus, label, &outcome);

    worker.kill().await;
    bus.publish(
        Event::new(EventKind::WorkerTerminated)
            .with_label(label)
            .with_pid(pid),
    );

    outcome
}

fn publish_outcome<T>(bus: &Bus, label: &TaskLabel, outcome: &Outcome<T>) {
    let ev = match outcome {
        Outcome::Success(_) => Event::new(EventKind::TaskSucceeded),
        Outcome::Timeout(timeout) => Event::new(EventKind::TimeoutHit).with_timeout(*timeout),
        Outcome::WorkerError(error) => Event::new(EventKind::TaskFailed).with_reason(error.as_str()),
        Outcome::AbnormalExit(termination) => {
            let ev = Event::new(EventKind::AbnormalExit).with_reason(termination.to_string());
            match termination.exit_info() {
                Some(exit) => ev.with_exit(exit),
                None => ev,
            }
        }
    };
    bus.publish(ev.with_label(label));
}
