use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ConfigError;
use crate::events::Bus;
use crate::subscribers::{LogWriter, Subscribe, SubscriberSet};
use crate::worker::{CommandSpawner, Spawn};

use super::hub::Hub;
use super::queue::{SingleShotQueue, StreamingQueue};
use super::single_shot::SingleShotSupervisor;
use super::streaming::StreamingSupervisor;

/// Builder for a [`Hub`].
pub struct HubBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    spawner: Option<Arc<dyn Spawn>>,
    log_writer: bool,
}

impl HubBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            spawner: None,
            log_writer: true,
        }
    }

    /// Adds event subscribers (metrics, audit, alerts).
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Uses `spawner` instead of launching `cfg.worker.program`.
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Skips the built-in [`LogWriter`] subscriber.
    pub fn without_log_writer(mut self) -> Self {
        self.log_writer = false;
        self
    }

    /// Builds the hub. Must be called inside a Tokio runtime.
    ///
    /// Fails with [`ConfigError::MissingWorker`] if no spawner was supplied and
    /// `cfg.worker.program` is unset.
    pub fn build(self) -> Result<Hub, ConfigError> {
        let spawner: Arc<dyn Spawn> = match self.spawner {
            Some(s) => s,
            None => Arc::new(
                CommandSpawner::from_config(&self.cfg.worker).ok_or(ConfigError::MissingWorker)?,
            ),
        };

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let mut subscribers = self.subscribers;
        if self.log_writer {
            subscribers.insert(0, Arc::new(LogWriter::new()));
        }
        let subs = SubscriberSet::new(subscribers, bus.clone());
        let token = CancellationToken::new();

        let single_shot = SingleShotQueue::new(
            SingleShotSupervisor::new(Arc::clone(&spawner), bus.clone(), self.cfg.single_shot.timeout)
                .with_child_limit(self.cfg.single_shot.child_limit()),
            self.cfg.queue_limit(),
            bus.clone(),
            token.child_token(),
        );
        let streaming = StreamingQueue::new(
            StreamingSupervisor::new(
                spawner,
                bus.clone(),
                self.cfg.streaming.timeout,
                self.cfg.done_message.as_str(),
            )
            .with_child_limit(self.cfg.streaming.child_limit()),
            self.cfg.queue_limit(),
            bus.clone(),
            token.child_token(),
        );

        Ok(Hub::new_internal(
            self.cfg,
            bus,
            subs,
            token,
            single_shot,
            streaming,
        ))
    }
}
