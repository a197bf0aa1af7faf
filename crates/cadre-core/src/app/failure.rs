//! Failure & rollback controller.
//!
//! Decides what happens after a failed attempt, raises the rollback signal,
//! and implements the two operator-driven recovery operations: rolling back
//! to a phase and wiping the run state.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::context::SchedulerContext;
use crate::domain::{Decider, Decision, Outcome, WorkflowEvent};
use crate::error::{Result, WorkflowError};
use crate::ports::Confirmation;
use crate::schedule::TaskRecord;
use crate::store::document::list_value;
use crate::store::{Document, keys};

pub const RESET_PROMPT: &str =
    "This deletes all workflow progress, checkpoints and history. Continue?";

pub struct FailureController {
    decider: Arc<dyn Decider>,
    rollback_on_failure: bool,
}

impl FailureController {
    pub fn new(decider: Arc<dyn Decider>, rollback_on_failure: bool) -> Self {
        Self {
            decider,
            rollback_on_failure,
        }
    }

    pub fn decide(&self, task: &TaskRecord, outcome: &Outcome) -> Decision {
        self.decider.decide(task, outcome)
    }

    /// Rollback signal for a task the scheduler gave up on, when
    /// `rollback_on_failure` is set. Completed entries are not undone; the
    /// signal names the most recently completed task as the point to return
    /// to.
    pub fn rollback_signal(
        &self,
        failed_team: &str,
        completed: &[String],
    ) -> Option<WorkflowEvent> {
        if !self.rollback_on_failure {
            return None;
        }
        let last_completed = completed.last().cloned();
        warn!(
            team = %failed_team,
            last_completed = last_completed.as_deref().unwrap_or("none"),
            "rollback requested after failure"
        );
        Some(WorkflowEvent::RollbackSignal {
            failed_team: failed_team.to_string(),
            last_completed,
        })
    }

    /// Keep only completed tasks whose phase is below `phase`.
    ///
    /// Works from the persisted run state, whatever `restore_on_startup`
    /// says. Ids that are no longer configured are dropped. Failed entries
    /// are left alone. Returns the completed list after the rollback.
    pub async fn rollback_to_phase(
        &self,
        ctx: &SchedulerContext,
        phase: u32,
    ) -> Result<Vec<String>> {
        let _guard = ctx.claim("rollback")?;

        let mut store = ctx.store().lock().await;
        store.reload();
        let before = store.completed_teams();
        let mut kept = Vec::new();
        for id in &before {
            match ctx.config().team(id) {
                Some(team) if team.phase < phase => kept.push(id.clone()),
                Some(_) => {}
                None => {
                    warn!(team = %id, "dropping completed team that is no longer configured")
                }
            }
        }

        let mut partial = Document::new();
        partial.insert(keys::COMPLETED_TEAMS.to_string(), list_value(kept.clone()));
        partial.insert(keys::ROLLBACK_PHASE.to_string(), Value::from(phase));
        store.save(partial);

        info!(
            phase,
            kept = kept.len(),
            removed = before.len() - kept.len(),
            "rolled back to phase"
        );
        Ok(kept)
    }

    /// Wipe completed, failed, history and the state file after confirmation.
    pub async fn full_reset(
        &self,
        ctx: &SchedulerContext,
        confirm: &dyn Confirmation,
    ) -> Result<()> {
        let _guard = ctx.claim("reset")?;

        if !confirm.confirm(RESET_PROMPT) {
            info!("full reset declined");
            return Err(WorkflowError::ResetDeclined);
        }

        ctx.store().lock().await.clear();
        warn!("run state wiped by full reset");
        Ok(())
    }
}
