//! # Worker processes and the message channel.
//!
//! A worker is an isolated OS process that runs exactly one request. The
//! supervisors only depend on the contract in this module:
//!
//! - [`Spawn`] starts a fresh worker per request;
//! - [`WorkerProcess`] sends the request once, yields lifecycle [`WorkerSignal`]s,
//!   and can be killed any number of times.
//!
//! ## Signals
//! ```text
//! child ──► Message(text)          one decoded message from the worker
//!       ──► Error(text)            channel or process fault
//!       ──► Exit(code, signal)     process reaped
//!       ──► Disconnect             worker's output channel reached EOF
//!       ──► Close(code, signal)    exit + EOF both observed
//! ```
//!
//! Implementations:
//! - [`CommandSpawner`] / real `tokio::process` children speaking [`frame`] over stdio;
//! - [`WorkerChannel`]: the worker-side half of the same protocol.

use std::fmt;
use std::io;
use std::process::ExitStatus;

use async_trait::async_trait;

mod child;
pub mod frame;
mod process;
#[cfg(test)]
pub(crate) mod scripted;

pub use child::WorkerChannel;
pub use process::{ChildWorker, CommandSpawner};

/// Exit status of a worker process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number (Unix only).
    pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// How a worker went away without a terminal message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The process exited.
    Exit(ExitInfo),
    /// The message channel disconnected.
    Disconnect,
    /// The process exited and its channel closed.
    Close(ExitInfo),
}

impl Termination {
    /// Exit details, when the process status is known.
    pub fn exit_info(&self) -> Option<ExitInfo> {
        match self {
            Termination::Exit(info) | Termination::Close(info) => Some(*info),
            Termination::Disconnect => None,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exit(info) => write!(f, "exited with {info}"),
            Termination::Disconnect => f.write_str("Child Disconnected"),
            Termination::Close(info) => write!(f, "closed with {info}"),
        }
    }
}

/// Lifecycle notification from a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerSignal {
    /// One message from the worker.
    Message(String),
    /// The worker or its channel raised an error.
    Error(String),
    /// The process exited.
    Exit(ExitInfo),
    /// The channel disconnected.
    Disconnect,
    /// Process exited and channel closed.
    Close(ExitInfo),
}

/// Starts one isolated worker per request.
pub trait Spawn: Send + Sync + 'static {
    /// Launches a fresh worker process.
    fn spawn(&self) -> io::Result<Box<dyn WorkerProcess>>;
}

/// One running worker, exclusively owned by the supervisor that spawned it.
///
/// ### Implementation requirements
/// - `next_signal` must be cancel-safe: the supervisor races it against its timer.
/// - `kill` must be idempotent and safe after the process already exited.
/// - `send` must not wait for the worker to consume the payload; a write that
///   fails after `send` returned is reported as [`WorkerSignal::Error`].
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id, when known.
    fn pid(&self) -> Option<u32>;

    /// Sends the request payload to the worker.
    async fn send(&mut self, payload: &str) -> io::Result<()>;

    /// Waits for the next lifecycle signal.
    async fn next_signal(&mut self) -> WorkerSignal;

    /// Forcibly terminates the worker (no-op when already terminated).
    async fn kill(&mut self);
}
