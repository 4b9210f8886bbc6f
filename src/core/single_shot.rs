//! # Single-shot supervisor.
//!
//! Runs one request in a fresh worker and settles with the first message the
//! worker sends. Any message counts as the answer; the worker is killed right
//! after it arrives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SettleError;
use crate::events::Bus;
use crate::request::{ExecutionRequest, TaskLabel};
use crate::worker::Spawn;

use super::gate::ChildGate;
use super::runner::{self, Relay};

struct FirstMessage;

#[async_trait]
impl Relay for FirstMessage {
    type Output = String;

    async fn on_message(&mut self, message: String) -> Option<String> {
        Some(message)
    }
}

/// Supervisor expecting exactly one message per request.
#[derive(Clone)]
pub struct SingleShotSupervisor {
    spawner: Arc<dyn Spawn>,
    bus: Bus,
    timeout: Duration,
    gate: Option<ChildGate>,
}

impl SingleShotSupervisor {
    /// Creates a supervisor with the given worker timeout and no child cap.
    pub fn new(spawner: Arc<dyn Spawn>, bus: Bus, timeout: Duration) -> Self {
        Self {
            spawner,
            bus,
            timeout,
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

    /// Configured worker timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `request` to completion and returns the worker's message.
    pub async fn execute(
        &self,
        label: &TaskLabel,
        request: &ExecutionRequest,
    ) -> Result<String, SettleError> {
        let _slot = match &self.gate {
            Some(gate) => Some(gate.acquire(&self.bus, label).await?),
            None => None,
        };
        runner::supervise(
            self.spawner.as_ref(),
            &self.bus,
            label,
            self.timeout,
            request.payload(),
            &mut FirstMessage,
        )
        .await
    }
}
