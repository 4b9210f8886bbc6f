//! Error types used by the actionvisor runtime.
//!
//! This module defines three enums:
//!
//! - [`SettleError`]: why a submitted task settled with a failure.
//! - [`RuntimeError`]: errors raised by the hub itself (shutdown, signals).
//! - [`ConfigError`]: invalid or incomplete configuration.
//!
//! [`SettleError`] and [`RuntimeError`] provide `as_label` / `as_message` helpers
//! for logs and metrics.

use std::time::Duration;
use thiserror::Error;

use crate::worker::Termination;

/// Message reported to callers when a worker exceeds its timeout window.
pub const TIMEOUT_MESSAGE: &str =
    "Killed execute process due to timeout in responding to parent process";

/// # Failure settlement of a submitted task.
///
/// Exactly one of these (or a success value) retires every submitted request.
/// The variant tells the caller whether the worker timed out, reported an error,
/// or went away without answering.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettleError {
    /// No terminal message arrived within the configured window; the worker was killed.
    #[error(
        "Killed execute process due to timeout in responding to parent process (after {timeout:?})"
    )]
    Timeout {
        /// The timeout window that elapsed.
        timeout: Duration,
    },

    /// The worker raised an error signal (channel or process fault).
    #[error("execute process sent error message: {error}")]
    Worker {
        /// The error text reported for the worker.
        error: String,
    },

    /// The worker exited, disconnected or closed its channel before a terminal message.
    #[error("execute process terminated abnormally: {termination}")]
    AbnormalExit {
        /// How the worker went away.
        termination: Termination,
    },

    /// The worker process could not be started.
    #[error("failed to spawn execute process: {error}")]
    Spawn {
        /// The OS error text.
        error: String,
    },

    /// The queue was shut down before the request could be enqueued.
    #[error("process queue is closed")]
    QueueClosed,

    /// The task was dropped before it settled (queue shut down while it waited).
    #[error("task abandoned before settlement")]
    Abandoned,
}

impl SettleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use actionvisor::SettleError;
    /// use std::time::Duration;
    ///
    /// let err = SettleError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "settle_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SettleError::Timeout { .. } => "settle_timeout",
            SettleError::Worker { .. } => "settle_worker_error",
            SettleError::AbnormalExit { .. } => "settle_abnormal_exit",
            SettleError::Spawn { .. } => "settle_spawn_failed",
            SettleError::QueueClosed => "settle_queue_closed",
            SettleError::Abandoned => "settle_abandoned",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SettleError::Timeout { .. } => TIMEOUT_MESSAGE.to_string(),
            SettleError::Worker { error } => error.clone(),
            SettleError::AbnormalExit { termination } => termination.to_string(),
            SettleError::Spawn { error } => format!("spawn failed: {error}"),
            SettleError::QueueClosed => "process queue is closed".to_string(),
            SettleError::Abandoned => "task abandoned".to_string(),
        }
    }

    /// True when the worker was killed because its window elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SettleError::Timeout { .. })
    }
}

/// # Errors produced by the hub runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some workers were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Task ids that still owned a live worker.
        stuck: Vec<String>,
    },

    /// OS signal handlers could not be installed.
    #[error("failed to listen for shutdown signals: {error}")]
    Signal {
        /// The OS error text.
        error: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal { .. } => "runtime_signal_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck tasks={stuck:?}")
            }
            RuntimeError::Signal { error } => format!("signal listener failed: {error}"),
        }
    }
}

/// # Configuration errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment value could not be parsed.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        /// Environment key.
        key: String,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// No spawner was supplied and no worker program is configured.
    #[error("no worker program configured (set ACTION_HUB_WORKER_PROGRAM)")]
    MissingWorker,
}
