//! Orchestrator - the command surface of the workflow.
//!
//! Every operation the CLI offers is a method here: run (or dry run), run a
//! single phase, resume, resume after a team, status, rollback, reset and
//! checkpoint listing.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use super::builder::ContextBuilder;
use super::context::{SchedulerContext, SessionGuard};
use crate::config::Config;
use crate::domain::{Outcome, TaskDescriptor, WorkflowEvent};
use crate::error::{Result, WorkflowError};
use crate::impls::CommandExecutor;
use crate::observability::StatusReport;
use crate::ports::{Confirmation, TaskExecutor};
use crate::schedule::{ExecutionPlan, RunReport, Scheduler, TaskGraphBuilder};

/// Result of `run`: the resolved plan for a dry run, the report otherwise.
#[derive(Debug)]
pub enum RunOutcome {
    Planned(ExecutionPlan),
    Finished(RunReport),
}

pub struct Orchestrator {
    ctx: SchedulerContext,
    backend_configured: bool,
}

/// Stands in for the execution backend when `backend.command` is unset.
/// Never dispatched to: executing operations are refused up front.
struct Unconfigured;

#[async_trait]
impl TaskExecutor for Unconfigured {
    async fn execute(&self, task: &TaskDescriptor) -> Outcome {
        Outcome::failure(format!("no execution backend configured for '{}'", task.id))
    }
}

impl Orchestrator {
    pub fn new(ctx: SchedulerContext) -> Self {
        Self {
            ctx,
            backend_configured: true,
        }
    }

    /// Orchestrator over the `CommandExecutor` described by `backend.command`.
    ///
    /// Without a backend command the read-only and recovery operations still
    /// work; anything that would dispatch a task fails with `Configuration`.
    pub fn from_config(config: Config) -> Result<Self> {
        let command = CommandExecutor::from_config(&config);
        let backend_configured = command.is_some();
        let executor: Arc<dyn TaskExecutor> = match command {
            Some(command) => Arc::new(command),
            None => Arc::new(Unconfigured),
        };
        let ctx = ContextBuilder::new(config).executor(executor).build()?;
        Ok(Self {
            ctx,
            backend_configured,
        })
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.ctx.subscribe()
    }

    /// The plan a full run would follow from the current run state.
    pub async fn plan(&self) -> Result<ExecutionPlan> {
        let completed = self.completed().await;
        let tasks = TaskGraphBuilder::from_config(self.ctx.config()).build(&completed)?;
        Ok(ExecutionPlan::new(tasks, &completed))
    }

    /// Run the full workflow, or only resolve the plan when `dry_run`.
    pub async fn run(&self, dry_run: bool) -> Result<RunOutcome> {
        if dry_run {
            return Ok(RunOutcome::Planned(self.plan().await?));
        }
        let guard = self.claim("run")?;
        let report = self
            .execute(guard, TaskGraphBuilder::from_config(self.ctx.config()))
            .await?;
        Ok(RunOutcome::Finished(report))
    }

    /// Run only the teams of `phase`.
    ///
    /// Dependencies on earlier phases must already be completed, otherwise
    /// the session is rejected as unsatisfiable.
    pub async fn run_phase(&self, phase: u32) -> Result<RunReport> {
        if !self.ctx.config().phases().contains(&phase) {
            return Err(WorkflowError::Configuration(format!(
                "no teams configured for phase {phase}"
            )));
        }
        let guard = self.claim("run")?;
        info!(phase, "running single phase");
        let builder = TaskGraphBuilder::from_config(self.ctx.config()).only_phase(phase);
        self.execute(guard, builder).await
    }

    /// Continue from the persisted run state, or from a named checkpoint.
    ///
    /// With persistence off the in-memory state of this process is used.
    pub async fn resume(&self, checkpoint: Option<&str>) -> Result<RunReport> {
        let guard = self.claim("resume")?;
        {
            let mut store = self.ctx.store().lock().await;
            store.reload();
            if let Some(name) = checkpoint {
                if store.restore_checkpoint(name).is_none() {
                    return Err(WorkflowError::CheckpointNotFound(name.to_string()));
                }
                info!(checkpoint = %name, "resuming from checkpoint");
            }
        }
        self.execute(guard, TaskGraphBuilder::from_config(self.ctx.config()))
            .await
    }

    /// Mark every team up to and including `team` (configuration order) as
    /// completed, then run the rest.
    pub async fn resume_from(&self, team: &str) -> Result<RunReport> {
        let guard = self.claim("resume-from")?;
        let teams = &self.ctx.config().teams;
        let position = teams
            .iter()
            .position(|t| t.id == team)
            .ok_or_else(|| WorkflowError::UnknownTeam(team.to_string()))?;

        {
            let mut store = self.ctx.store().lock().await;
            store.reload();
            store.mark_teams_complete(teams[..=position].iter().map(|t| t.id.as_str()));
        }
        info!(team = %team, skipped = position + 1, "resuming after team");
        self.execute(guard, TaskGraphBuilder::from_config(self.ctx.config()))
            .await
    }

    pub async fn status(&self) -> StatusReport {
        let store = self.ctx.store().lock().await;
        StatusReport::collect(self.ctx.config(), &store, self.ctx.monitor().running())
    }

    pub async fn rollback_to_phase(&self, phase: u32) -> Result<Vec<String>> {
        self.ctx.failure().rollback_to_phase(&self.ctx, phase).await
    }

    pub async fn full_reset(&self, confirm: &dyn Confirmation) -> Result<()> {
        self.ctx.failure().full_reset(&self.ctx, confirm).await
    }

    pub async fn checkpoints(&self) -> Vec<String> {
        self.ctx.store().lock().await.list_checkpoints()
    }

    async fn completed(&self) -> HashSet<String> {
        self.ctx
            .store()
            .lock()
            .await
            .completed_teams()
            .into_iter()
            .collect()
    }

    /// Session flag for an executing operation. Refused up front when there
    /// is no backend to dispatch to.
    fn claim(&self, operation: &'static str) -> Result<SessionGuard> {
        if !self.backend_configured {
            return Err(WorkflowError::Configuration(
                "no execution backend configured (set backend.command)".to_string(),
            ));
        }
        self.ctx.claim(operation)
    }

    async fn execute(&self, guard: SessionGuard, builder: TaskGraphBuilder) -> Result<RunReport> {
        let completed = self.completed().await;
        let tasks = builder.build(&completed)?;
        Scheduler::new(&self.ctx).run_claimed(guard, tasks).await
    }
}
