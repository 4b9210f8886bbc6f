//! Scripted in-memory workers for supervisor tests.
//!
//! Each spawn pops the next script (or reuses the fallback). A script is a list
//! of [`Step`]s replayed by `next_signal`; once exhausted the worker stays silent
//! until killed. Timing uses `tokio::time`, so tests run on the paused clock.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{ExitInfo, Spawn, WorkerProcess, WorkerSignal};

#[derive(Clone, Debug)]
pub(crate) enum Step {
    Emit(WorkerSignal),
    Sleep(Duration),
}

pub(crate) fn msg(text: &str) -> Step {
    Step::Emit(WorkerSignal::Message(text.to_string()))
}

pub(crate) fn sleep(secs: u64) -> Step {
    Step::Sleep(Duration::from_secs(secs))
}

pub(crate) fn exit(code: i32) -> Step {
    Step::Emit(WorkerSignal::Exit(ExitInfo {
        code: Some(code),
        signal: None,
    }))
}

#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub spawned: usize,
    pub alive: usize,
    pub peak: usize,
    /// Workers that were alive when killed.
    pub kills: usize,
    /// Every `kill()` call, including repeats.
    pub kill_calls: usize,
    pub payloads: Vec<String>,
    pub spawn_times: Vec<Instant>,
}

#[derive(Default)]
pub(crate) struct ScriptedSpawner {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    fallback: Vec<Step>,
    /// Spawns left to fail before workers start.
    spawn_failures: Mutex<usize>,
    stats: Arc<Mutex<Stats>>,
}

impl ScriptedSpawner {
    /// Every worker replays `script`.
    pub fn repeating(script: Vec<Step>) -> Self {
        Self {
            fallback: script,
            ..Self::default()
        }
    }

    /// Workers replay `scripts` in spawn order, then stay silent.
    pub fn sequence(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::failing_first(usize::MAX, Vec::new())
    }

    /// The first `failures` spawns fail, later workers replay `script`.
    pub fn failing_first(failures: usize, script: Vec<Step>) -> Self {
        Self {
            fallback: script,
            spawn_failures: Mutex::new(failures),
            ..Self::default()
        }
    }

    pub fn stats(&self) -> std::sync::MutexGuard<'_, Stats> {
        self.stats.lock().unwrap()
    }
}

impl Spawn for ScriptedSpawner {
    fn spawn(&self) -> io::Result<Box<dyn WorkerProcess>> {
        {
            let mut failures = self.spawn_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such worker"));
            }
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let mut stats = self.stats.lock().unwrap();
        stats.spawned += 1;
        stats.alive += 1;
        stats.peak = stats.peak.max(stats.alive);
        stats.spawn_times.push(Instant::now());
        let pid = stats.spawned as u32;
        drop(stats);

        Ok(Box::new(ScriptedWorker {
            pid,
            script: script.into(),
            sleeping_until: None,
            dead: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct ScriptedWorker {
    pid: u32,
    script: VecDeque<Step>,
    sleeping_until: Option<Instant>,
    dead: bool,
    stats: Arc<Mutex<Stats>>,
}

impl ScriptedWorker {
    fn mark_dead(&mut self) -> bool {
        if self.dead {
            return false;
        }
        self.dead = true;
        self.stats.lock().unwrap().alive -= 1;
        true
    }
}

#[async_trait]
impl WorkerProcess for ScriptedWorker {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn send(&mut self, payload: &str) -> io::Result<()> {
        self.stats.lock().unwrap().payloads.push(payload.to_string());
        Ok(())
    }

    async fn next_signal(&mut self) -> WorkerSignal {
        loop {
            // Cancel-safe: an interrupted sleep resumes at the same deadline.
            if let Some(until) = self.sleeping_until {
                tokio::time::sleep_until(until).await;
                self.sleeping_until = None;
            }
            match self.script.pop_front() {
                Some(Step::Sleep(d)) => self.sleeping_until = Some(Instant::now() + d),
                Some(Step::Emit(sig)) => {
                    if matches!(sig, WorkerSignal::Exit(_) | WorkerSignal::Close(_)) {
                        self.mark_dead();
                    }
                    return sig;
                }
                None => return std::future::pending().await,
            }
        }
    }

    async fn kill(&mut self) {
        let was_alive = self.mark_dead();
        let mut stats = self.stats.lock().unwrap();
        stats.kill_calls += 1;
        if was_alive {
            stats.kills += 1;
        }
    }
}

impl Drop for ScriptedWorker {
    fn drop(&mut self) {
        self.mark_dead();
    }
}
