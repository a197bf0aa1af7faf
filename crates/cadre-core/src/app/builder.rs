//! ContextBuilder - wires configuration and ports into a SchedulerContext
//!
//! Fail-fast: everything a session needs is checked when the context is
//! built, not when the first task is dispatched.

use std::sync::Arc;

use tracing::debug;

use super::context::SchedulerContext;
use super::failure::FailureController;
use crate::config::Config;
use crate::domain::{Decider, DefaultDecider};
use crate::error::{Result, WorkflowError};
use crate::impls::{FileBackend, MemoryBackend};
use crate::ports::{Clock, IdGenerator, StateBackend, SystemClock, TaskExecutor, UlidGenerator};
use crate::store::{StateStore, StoreOptions};

/// Builds a `SchedulerContext`.
///
/// # Example
/// ```ignore
/// let ctx = ContextBuilder::new(config)
///     .executor(Arc::new(CommandExecutor::new("run-step {team}")))
///     .build()?;
/// ```
///
/// Defaults:
/// - state backend: JSON file at `state.state_file` when `state.persistence`
///   is on, memory otherwise
/// - clock: `SystemClock`, ids: `UlidGenerator` over that clock
/// - decider: `DefaultDecider` from `error_handling`
pub struct ContextBuilder {
    config: Config,
    executor: Option<Arc<dyn TaskExecutor>>,
    backend: Option<Box<dyn StateBackend>>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
}

impl ContextBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            executor: None,
            backend: None,
            clock: Arc::new(SystemClock),
            ids: None,
            decider: None,
        }
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn backend(mut self, backend: Box<dyn StateBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Keep the run state in memory regardless of configuration.
    pub fn in_memory(self) -> Self {
        self.backend(Box::new(MemoryBackend::new()))
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// # Errors
    /// `Configuration` when no execution backend was supplied.
    pub fn build(self) -> Result<SchedulerContext> {
        let executor = self.executor.ok_or_else(|| {
            WorkflowError::Configuration(
                "no execution backend configured (set backend.command)".to_string(),
            )
        })?;

        let backend: Box<dyn StateBackend> = match self.backend {
            Some(backend) => backend,
            None if self.config.state.persistence => {
                Box::new(FileBackend::new(self.config.state_file_path()))
            }
            None => Box::new(MemoryBackend::new()),
        };
        debug!(location = %backend.describe(), "state backend selected");

        let store = StateStore::open(
            backend,
            Arc::clone(&self.clock),
            StoreOptions::from_config(&self.config),
        );
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&self.clock))));
        let decider = self.decider.unwrap_or_else(|| {
            Arc::new(DefaultDecider::from_config(&self.config.error_handling))
        });
        let failure =
            FailureController::new(decider, self.config.error_handling.rollback_on_failure);

        Ok(SchedulerContext::new(
            Arc::new(self.config),
            store,
            executor,
            failure,
            ids,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TeamSpec;

    fn config() -> Config {
        Config::with_teams(vec![TeamSpec::new("alpha", 1)])
    }

    #[test]
    fn build_without_executor_fails_fast() {
        let err = ContextBuilder::new(config()).in_memory().build().err().unwrap();
        assert!(matches!(err, WorkflowError::Configuration(msg) if msg.contains("backend.command")));
    }

    #[tokio::test]
    async fn persistent_config_uses_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.project.base_path = dir.path().to_path_buf();

        let executor = Arc::new(crate::impls::CommandExecutor::new("true"));
        let ctx = ContextBuilder::new(config).executor(executor).build().unwrap();
        ctx.store().lock().await.mark_team_complete("alpha");

        assert!(dir.path().join("state/workflow_state.json").exists());
    }

    #[tokio::test]
    async fn disabled_persistence_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.project.base_path = dir.path().to_path_buf();
        config.state.persistence = false;

        let executor = Arc::new(crate::impls::CommandExecutor::new("true"));
        let ctx = ContextBuilder::new(config).executor(executor).build().unwrap();
        ctx.store().lock().await.mark_team_complete("alpha");

        assert!(ctx.store().lock().await.is_team_completed("alpha"));
        assert!(!dir.path().join("state").exists());
    }
}
