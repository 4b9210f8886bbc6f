//! # Single settlement per task.
//!
//! Up to five worker signals (message, error, exit, disconnect, close) plus the
//! timer can race to end a task. The runner reduces them to one tagged
//! [`Outcome`], and [`Settlement`] delivers the caller-visible result exactly once.
//!
//! ```text
//! message ─┐
//! error   ─┤
//! exit    ─┼──► first wins ──► Outcome ──► Settlement::settle ──► caller
//! close   ─┤                                   (later calls: no-op)
//! timer   ─┘
//! ```

use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::SettleError;
use crate::worker::Termination;

/// How one supervised worker lifetime ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The protocol's terminal success.
    Success(T),
    /// The timer fired first.
    Timeout(Duration),
    /// The worker raised an error signal.
    WorkerError(String),
    /// The worker went away before finishing.
    AbnormalExit(Termination),
}

impl<T> Outcome<T> {
    /// Converts into the caller-facing result.
    pub fn into_result(self) -> Result<T, SettleError> {
        match self {
            Outcome::Success(v) => Ok(v),
            Outcome::Timeout(timeout) => Err(SettleError::Timeout { timeout }),
            Outcome::WorkerError(error) => Err(SettleError::Worker { error }),
            Outcome::AbnormalExit(termination) => Err(SettleError::AbnormalExit { termination }),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Single-assignment result slot for one queued task.
///
/// Dropping an unsettled `Settlement` makes the receiver observe
/// [`SettleError::Abandoned`] (see [`Settlement::wait`]).
#[derive(Debug)]
pub struct Settlement<T> {
    tx: Option<oneshot::Sender<Result<T, SettleError>>>,
}

/// Receiving half of a [`Settlement`].
pub type SettlementRx<T> = oneshot::Receiver<Result<T, SettleError>>;

impl<T> Settlement<T> {
    /// Creates a settlement and the receiver the caller awaits.
    pub fn channel() -> (Self, SettlementRx<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Settles the task. Returns `false` if it was already settled.
    ///
    /// A caller that stopped waiting still counts as settled.
    pub fn settle(&mut self, result: Result<T, SettleError>) -> bool {
        match self.tx.take() {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// True once `settle` has been called.
    pub fn is_settled(&self) -> bool {
        self.tx.is_none()
    }

    /// Awaits the result on the receiving side.
    pub async fn wait(rx: SettlementRx<T>) -> Result<T, SettleError> {
        rx.await.unwrap_or(Err(SettleError::Abandoned))
    }
}
