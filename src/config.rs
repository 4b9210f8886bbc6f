//! # Runtime configuration.
//!
//! Provides [`Config`], the centralized settings for a [`Hub`](crate::Hub).
//!
//! Config is used in two ways:
//! 1. **Hub creation**: `Hub::builder(config)`
//! 2. **Environment loading**: [`Config::from_env`] for service deployments
//!
//! ## Sentinel values
//! - `queue_concurrency = 0` → unlimited admission (no semaphore created)
//! - `Lifecycle::max_children = 0` → no dedicated child gate for that variant

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default end-of-stream sentinel for the streaming protocol.
pub const DONE_MESSAGE: &str = "PROCESS FINISHED";

/// Lifecycle parameters of one supervisor variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lifecycle {
    /// Hard wall-clock window for one worker process.
    pub timeout: Duration,

    /// Maximum number of live worker processes for this variant.
    ///
    /// - `0` = no dedicated cap (admission queue parallelism only)
    /// - `n > 0` = at most `n` workers alive at once
    pub max_children: usize,
}

impl Lifecycle {
    /// Returns the child cap as an `Option` (`None` = uncapped).
    #[inline]
    pub fn child_limit(&self) -> Option<usize> {
        match self.max_children {
            0 => None,
            n => Some(n),
        }
    }
}

/// How to start a real worker process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Executable to launch per request. `None` means a spawner must be supplied explicitly.
    pub program: Option<PathBuf>,
    /// Arguments passed to every worker.
    pub args: Vec<String>,
    /// How long to keep reading stdout after the worker exits.
    pub exit_drain: Duration,
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            exit_drain: Duration::from_millis(250),
        }
    }
}

/// Global configuration for the hub runtime.
///
/// ## Field semantics
/// - `queue_concurrency`: in-flight tasks per admission queue (`0` = unlimited)
/// - `single_shot`: timeout 1h, no child cap by default
/// - `streaming`: timeout 2h, at most 2 live workers by default
/// - `done_message`: sentinel that ends a streaming task
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `grace`: how long `Hub::shutdown` waits for in-flight workers
/// - `worker`: command used when no custom spawner is provided
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of admitted (in-flight) tasks per queue.
    pub queue_concurrency: usize,

    /// Single-shot supervisor lifecycle.
    pub single_shot: Lifecycle,

    /// Streaming supervisor lifecycle.
    pub streaming: Lifecycle,

    /// Reserved end-of-stream message for the streaming protocol.
    pub done_message: String,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Maximum time to wait for in-flight workers during shutdown.
    pub grace: Duration,

    /// Real worker process command.
    pub worker: WorkerCommand,
}

impl Config {
    /// Returns the admission limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` admitted tasks per queue
    #[inline]
    pub fn queue_limit(&self) -> Option<usize> {
        match self.queue_concurrency {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Builds a config from process environment (and `.env`, if present).
    ///
    /// Unset keys keep their defaults; unparsable values are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(n) = parse(&lookup, "ACTION_HUB_QUEUE_CONCURRENCY")? {
            cfg.queue_concurrency = n;
        }
        if let Some(secs) = parse(&lookup, "ACTION_HUB_EXECUTE_TIMEOUT_SECS")? {
            cfg.single_shot.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse(&lookup, "ACTION_HUB_EXECUTE_MAX_CHILDREN")? {
            cfg.single_shot.max_children = n;
        }
        if let Some(secs) = parse(&lookup, "ACTION_HUB_EXTENDED_TIMEOUT_SECS")? {
            cfg.streaming.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse(&lookup, "ACTION_HUB_EXTENDED_MAX_CHILDREN")? {
            cfg.streaming.max_children = n;
        }
        if let Some(n) = parse(&lookup, "ACTION_HUB_BUS_CAPACITY")? {
            cfg.bus_capacity = n;
        }
        if let Some(secs) = parse(&lookup, "ACTION_HUB_GRACE_SECS")? {
            cfg.grace = Duration::from_secs(secs);
        }
        if let Some(done) = lookup("ACTION_HUB_DONE_MESSAGE").filter(|s| !s.is_empty()) {
            cfg.done_message = done;
        }
        if let Some(program) = lookup("ACTION_HUB_WORKER_PROGRAM").filter(|s| !s.is_empty()) {
            cfg.worker.program = Some(PathBuf::from(program));
        }
        if let Some(args) = lookup("ACTION_HUB_WORKER_ARGS") {
            cfg.worker.args = args.split_whitespace().map(str::to_string).collect();
        }

        Ok(cfg)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `queue_concurrency = 0` (unlimited)
    /// - `single_shot = 1h timeout, uncapped`
    /// - `streaming = 2h timeout, 2 children`
    /// - `done_message = "PROCESS FINISHED"`
    /// - `bus_capacity = 1024`
    /// - `grace = 60s`
    fn default() -> Self {
        Self {
            queue_concurrency: 0,
            single_shot: Lifecycle {
                timeout: Duration::from_secs(60 * 60),
                max_children: 0,
            },
            streaming: Lifecycle {
                timeout: Duration::from_secs(2 * 60 * 60),
                max_children: 2,
            },
            done_message: DONE_MESSAGE.to_string(),
            bus_capacity: 1024,
            grace: Duration::from_secs(60),
            worker: WorkerCommand::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_supervisor_variants() {
        let cfg = Config::default();
        assert_eq!(cfg.queue_limit(), None);
        assert_eq!(cfg.single_shot.timeout, Duration::from_secs(3600));
        assert_eq!(cfg.single_shot.child_limit(), None);
        assert_eq!(cfg.streaming.timeout, Duration::from_secs(7200));
        assert_eq!(cfg.streaming.child_limit(), Some(2));
        assert_eq!(cfg.done_message, "PROCESS FINISHED");
    }

    #[test]
    fn bus_capacity_is_clamped() {
        let cfg = Config {
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("ACTION_HUB_QUEUE_CONCURRENCY", "4"),
            ("ACTION_HUB_EXECUTE_TIMEOUT_SECS", "30"),
            ("ACTION_HUB_EXECUTE_MAX_CHILDREN", "3"),
            ("ACTION_HUB_EXTENDED_MAX_CHILDREN", " 5 "),
            ("ACTION_HUB_WORKER_PROGRAM", "/usr/bin/worker"),
            ("ACTION_HUB_WORKER_ARGS", "--mode  execute"),
        ]))
        .unwrap();

        assert_eq!(cfg.queue_limit(), Some(4));
        assert_eq!(cfg.single_shot.timeout, Duration::from_secs(30));
        assert_eq!(cfg.single_shot.child_limit(), Some(3));
        assert_eq!(cfg.streaming.child_limit(), Some(5));
        assert_eq!(cfg.worker.program, Some(PathBuf::from("/usr/bin/worker")));
        assert_eq!(cfg.worker.args, vec!["--mode", "execute"]);
    }

    #[test]
    fn unparsable_value_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("ACTION_HUB_GRACE_SECS", "soon")]))
            .unwrap_err();
        match err {
            ConfigError::Invalid { key, value, .. } => {
                assert_eq!(key, "ACTION_HUB_GRACE_SECS");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
