//! # Child gate: cap on live worker processes.
//!
//! [`ChildGate`] bounds how many workers one supervisor keeps alive at once.
//! It is a fair `tokio::sync::Semaphore`: waiters are woken in arrival order
//! as soon as a permit is released, with no polling.
//!
//! The returned [`ChildSlot`] is held for the worker's whole lifetime and
//! releases the slot on drop, so every exit path gives it back exactly once.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::SettleError;
use crate::events::{Bus, Event, EventKind};
use crate::request::TaskLabel;

/// Semaphore-backed limit on concurrently running workers.
#[derive(Clone, Debug)]
pub struct ChildGate {
    sem: Arc<Semaphore>,
    limit: usize,
}

/// RAII slot in a [`ChildGate`].
#[derive(Debug)]
pub struct ChildSlot {
    _permit: OwnedSemaphorePermit,
}

impl ChildGate {
    /// Creates a gate admitting at most `limit` workers (clamped to at least 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            sem: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Waits for a free slot.
    ///
    /// Publishes `ChildSlotWaiting` when the task has to wait and
    /// `ChildSlotAcquired` once it holds a slot. Fails only after [`close`](Self::close).
    pub async fn acquire(&self, bus: &Bus, label: &TaskLabel) -> Result<ChildSlot, SettleError> {
        let permit = match Arc::clone(&self.sem).try_acquire_owned() {
            Ok(p) => p,
            Err(TryAcquireError::NoPermits) => {
                bus.publish(
                    Event::new(EventKind::ChildSlotWaiting)
                        .with_label(label)
                        .with_active(self.active()),
                );
                Arc::clone(&self.sem)
                    .acquire_owned()
                    .await
                    .map_err(|_closed| SettleError::QueueClosed)?
            }
            Err(TryAcquireError::Closed) => return Err(SettleError::QueueClosed),
        };

        bus.publish(
            Event::new(EventKind::ChildSlotAcquired)
                .with_label(label)
                .with_active(self.active()),
        );
        Ok(ChildSlot { _permit: permit })
    }

    /// Rejects current and future waiters; held slots stay valid.
    pub fn close(&self) {
        self.sem.close();
    }

    /// Number of slots currently held.
    pub fn active(&self) -> usize {
        self.limit - self.sem.available_permits()
    }

    /// Maximum number of concurrent workers.
    pub fn limit(&self) -> usize {
        self.limit
    }
}
