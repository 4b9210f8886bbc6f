//! # Real worker processes over stdio.
//!
//! [`CommandSpawner`] launches one `tokio::process` child per request with
//! piped stdin/stdout and inherited stderr. [`ChildWorker`] turns the child's
//! output and exit status into [`WorkerSignal`]s.
//!
//! ## Signal order
//! ```text
//! stdout line         ──► Message / Error (malformed)
//! stdout EOF          ──► Disconnect
//! child reaped        ──► drain stdout (≤ exit_drain) ──► Exit
//! exit + EOF observed ──► Close (once)
//! ```
//! Draining on exit keeps a message written right before exit ahead of the
//! exit signal.
//!
//! The request is written by a separate task, so a worker that answers before
//! reading a payload larger than the pipe buffer is still heard.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant};
use tracing::debug;

use super::{ExitInfo, Spawn, WorkerProcess, WorkerSignal, frame};
use crate::config::WorkerCommand;

/// Launches worker processes from a fixed command line.
#[derive(Clone, Debug)]
pub struct CommandSpawner {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    exit_drain: Duration,
}

impl CommandSpawner {
    /// Creates a spawner for `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            exit_drain: WorkerCommand::default().exit_drain,
        }
    }

    /// Builds a spawner from configuration, if a program is configured.
    pub fn from_config(cmd: &WorkerCommand) -> Option<Self> {
        let program = cmd.program.as_ref()?;
        Some(
            Self::new(program)
                .args(cmd.args.iter())
                .with_exit_drain(cmd.exit_drain),
        )
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for every worker.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Sets how long stdout is drained after the worker exits.
    pub fn with_exit_drain(mut self, drain: Duration) -> Self {
        self.exit_drain = drain;
        self
    }
}

impl Spawn for CommandSpawner {
    fn spawn(&self) -> io::Result<Box<dyn WorkerProcess>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(|out| BufReader::new(out).lines());

        Ok(Box::new(ChildWorker {
            child,
            stdin,
            stdout,
            writer: None,
            pending: VecDeque::new(),
            exit: None,
            closed: false,
            killed: false,
            exit_drain: self.exit_drain,
        }))
    }
}

type StdoutLines = Lines<BufReader<ChildStdout>>;

/// Writer task result; stdin is handed back so it stays open until kill.
type Written = (ChildStdin, io::Result<()>);

enum Step {
    Line(io::Result<Option<String>>),
    Written(Result<Written, JoinError>),
    Reaped(io::Result<std::process::ExitStatus>),
}

/// A live `tokio::process` worker.
pub struct ChildWorker {
    child: Child,
    stdin: Option<ChildStdin>,
    /// `None` once EOF (or a read error) was observed.
    stdout: Option<StdoutLines>,
    /// In-flight request write.
    writer: Option<JoinHandle<Written>>,
    pending: VecDeque<WorkerSignal>,
    exit: Option<ExitInfo>,
    closed: bool,
    killed: bool,
    exit_drain: Duration,
}

impl ChildWorker {
    /// Exit status, once the process has been reaped.
    pub fn exit_info(&self) -> Option<ExitInfo> {
        self.exit
    }

    fn on_line(&mut self, line: io::Result<Option<String>>) -> Option<WorkerSignal> {
        match line {
            Ok(Some(line)) => match frame::decode(&line) {
                Ok(Some(msg)) => Some(WorkerSignal::Message(msg)),
                Ok(None) => None,
                Err(e) => Some(WorkerSignal::Error(format!(
                    "malformed message from worker: {e}"
                ))),
            },
            Ok(None) => {
                self.stdout = None;
                self.stdin = None;
                Some(WorkerSignal::Disconnect)
            }
            Err(e) => {
                self.stdout = None;
                Some(WorkerSignal::Error(format!("worker channel read failed: {e}")))
            }
        }
    }

    fn on_written(&mut self, written: Result<Written, JoinError>) -> Option<WorkerSignal> {
        self.writer = None;
        match written {
            Ok((stdin, Ok(()))) => {
                if self.stdout.is_some() && !self.killed {
                    self.stdin = Some(stdin);
                }
                None
            }
            Ok((_, Err(e))) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(pid = ?self.child.id(), "worker closed stdin before reading the request");
                None
            }
            Ok((_, Err(e))) => Some(WorkerSignal::Error(format!("failed to send request: {e}"))),
            Err(e) => Some(WorkerSignal::Error(format!("request writer stopped: {e}"))),
        }
    }

    /// Reads whatever the worker wrote before exiting, bounded by `exit_drain`.
    async fn drain_after_exit(&mut self) {
        let deadline = Instant::now() + self.exit_drain;
        while let Some(lines) = self.stdout.as_mut() {
            match time::timeout_at(deadline, lines.next_line()).await {
                Ok(line) => {
                    if let Some(sig) = self.on_line(line) {
                        self.pending.push_back(sig);
                    }
                }
                // A grandchild may still hold the pipe open.
                Err(_elapsed) => break,
            }
        }
    }
}

impl Drop for ChildWorker {
    fn drop(&mut self) {
        // A grandchild holding the stdin pipe would otherwise park the writer forever.
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

async fn next_line(lines: Option<&mut StdoutLines>) -> io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

async fn written(writer: Option<&mut JoinHandle<Written>>) -> Result<Written, JoinError> {
    match writer {
        Some(writer) => writer.await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl WorkerProcess for ChildWorker {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn send(&mut self, payload: &str) -> io::Result<()> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin closed"))?;
        let line = frame::encode(payload);
        self.writer = Some(tokio::spawn(async move {
            let mut res = stdin.write_all(line.as_bytes()).await;
            if res.is_ok() {
                res = stdin.flush().await;
            }
            (stdin, res)
        }));
        Ok(())
    }

    async fn next_signal(&mut self) -> WorkerSignal {
        loop {
            if let Some(sig) = self.pending.pop_front() {
                return sig;
            }
            if let (Some(exit), None) = (self.exit, self.stdout.as_ref()) {
                if self.closed {
                    return std::future::pending().await;
                }
                self.closed = true;
                return WorkerSignal::Close(exit);
            }

            let reading = self.stdout.is_some();
            let sending = self.writer.is_some();
            let running = self.exit.is_none();
            let step = {
                let Self {
                    child,
                    stdout,
                    writer,
                    ..
                } = self;
                tokio::select! {
                    biased;
                    line = next_line(stdout.as_mut()), if reading => Step::Line(line),
                    res = written(writer.as_mut()), if sending => Step::Written(res),
                    status = child.wait(), if running => Step::Reaped(status),
                }
            };

            match step {
                Step::Line(line) => {
                    if let Some(sig) = self.on_line(line) {
                        return sig;
                    }
                }
                Step::Written(res) => {
                    if let Some(sig) = self.on_written(res) {
                        return sig;
                    }
                }
                Step::Reaped(Ok(status)) => {
                    let info = ExitInfo::from(status);
                    self.exit = Some(info);
                    self.drain_after_exit().await;
                    self.pending.push_back(WorkerSignal::Exit(info));
                }
                Step::Reaped(Err(e)) => {
                    self.exit = Some(ExitInfo::default());
                    return WorkerSignal::Error(format!("waiting on worker failed: {e}"));
                }
            }
        }
    }

    async fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        self.stdin = None;
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if self.exit.is_some() {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            debug!(pid = ?self.child.id(), error = %e, "worker kill skipped");
        }
        match self.child.wait().await {
            Ok(status) => self.exit = Some(ExitInfo::from(status)),
            Err(e) => debug!(error = %e, "reaping killed worker failed"),
        }
    }
}
