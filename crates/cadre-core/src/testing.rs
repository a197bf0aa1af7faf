//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::app::{ContextBuilder, SchedulerContext};
use crate::config::Config;
use crate::domain::{Outcome, TaskDescriptor, TeamSpec};
use crate::impls::MemoryBackend;
use crate::ports::{StateBackend, TaskExecutor};

/// Executor that records every dispatch and fails the teams it is told to.
#[derive(Default)]
pub struct ScriptedExecutor {
    /// team -> number of leading attempts that fail
    failures: HashMap<String, usize>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
    attempts: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt of `team` fails.
    pub fn failing(mut self, team: &str) -> Self {
        self.failures.insert(team.to_string(), usize::MAX);
        self
    }

    /// The first `attempts` attempts of `team` fail, later ones succeed.
    pub fn flaky(mut self, team: &str, attempts: usize) -> Self {
        self.failures.insert(team.to_string(), attempts);
        self
    }

    pub fn slow(mut self, team: &str, delay: Duration) -> Self {
        self.delays.insert(team.to_string(), delay);
        self
    }

    /// Teams in dispatch order, one entry per attempt.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self) -> HashSet<String> {
        self.calls().into_iter().collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, task: &TaskDescriptor) -> Outcome {
        self.calls.lock().unwrap().push(task.id.clone());
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(task.id.clone()).or_default();
            *n += 1;
            *n
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .delays
            .get(&task.id)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.failures.get(&task.id) {
            Some(failing) if attempt <= *failing => {
                Outcome::failure(format!("{} attempt {attempt} failed", task.id))
            }
            _ => Outcome::success(format!("{} done", task.id)),
        }
    }
}

/// alpha, bravo (phase 1) -> charlie (phase 2) -> delta (phase 3).
pub fn sample_teams() -> Vec<TeamSpec> {
    vec![
        TeamSpec::new("alpha", 1),
        TeamSpec::new("bravo", 1),
        TeamSpec::new("charlie", 2).with_dependencies(["alpha", "bravo"]),
        TeamSpec::new("delta", 3).with_dependencies(["charlie"]),
    ]
}

/// Config with no retry delay, so retry tests do not sleep for real.
pub fn test_config(teams: Vec<TeamSpec>) -> Config {
    let mut config = Config::with_teams(teams);
    config.error_handling.retry_delay_secs = 0;
    config
}

/// Context over an in-memory backend. The backend handle is shared with the
/// store, so tests can inspect what was persisted.
pub fn context(
    config: Config,
    executor: Arc<ScriptedExecutor>,
) -> (SchedulerContext, MemoryBackend) {
    let backend = MemoryBackend::new();
    let ctx = ContextBuilder::new(config)
        .executor(executor)
        .backend(Box::new(backend.clone()))
        .build()
        .unwrap();
    (ctx, backend)
}

/// Context over a caller-supplied backend, e.g. a `FileBackend` in a temp dir.
pub fn context_with_backend(
    config: Config,
    executor: Arc<ScriptedExecutor>,
    backend: Box<dyn StateBackend>,
) -> SchedulerContext {
    ContextBuilder::new(config)
        .executor(executor)
        .backend(backend)
        .build()
        .unwrap()
}
