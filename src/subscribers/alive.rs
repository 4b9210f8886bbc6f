//! # Live worker tracker with sequence-based ordering.
//!
//! [`LiveWorkers`] records which tasks currently own a running worker process,
//! using event sequence numbers to survive out-of-order delivery.
//!
//! ```text
//! run_worker ──► Bus ──► hub listener ──► LiveWorkers::update()
//!                                               │
//!                                               ▼
//!                                   HashMap<task id, {seq, alive}>
//! ```
//!
//! ## Rules
//! - `WorkerSpawned` marks a task alive; `WorkerTerminated` marks it dead.
//! - Events with `seq <= last_seq` for the same task are rejected (stale).
//! - Reads are eventually consistent with the bus.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::events::{Event, EventKind};

#[derive(Debug, Clone)]
struct WorkerState {
    last_seq: u64,
    alive: bool,
}

/// Thread-safe view of tasks whose worker process is alive.
///
/// Used by `Hub::shutdown` to report stuck workers when the grace period runs out.
#[derive(Default)]
pub struct LiveWorkers {
    state: RwLock<HashMap<String, WorkerState>>,
}

impl LiveWorkers {
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an event if it is newer than the last one seen for its task.
    ///
    /// Returns `true` when the alive state changed.
    pub async fn update(&self, ev: &Event) -> bool {
        let alive = match ev.kind {
            EventKind::WorkerSpawned => true,
            EventKind::WorkerTerminated => false,
            _ => return false,
        };
        let Some(task) = ev.task.as_deref() else {
            return false;
        };

        let mut state = self.state.write().await;
        if !alive && !state.contains_key(task) {
            return false;
        }
        let entry = state.entry(task.to_string()).or_insert(WorkerState {
            last_seq: 0,
            alive: false,
        });
        if ev.seq <= entry.last_seq {
            return false;
        }
        entry.last_seq = ev.seq;
        let changed = entry.alive != alive;
        entry.alive = alive;

        // Task ids are never reused.
        if !alive {
            state.remove(task);
        }
        changed
    }

    /// Returns the sorted ids of tasks with a live worker.
    pub async fn snapshot(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut alive: Vec<String> = state
            .iter()
            .filter(|(_, ws)| ws.alive)
            .map(|(task, _)| task.clone())
            .collect();
        alive.sort_unstable();
        alive
    }

    /// Number of live workers.
    pub async fn count(&self) -> usize {
        self.state.read().await.values().filter(|ws| ws.alive).count()
    }
}
