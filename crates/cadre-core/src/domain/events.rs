//! Events broadcast while a scheduling session runs.
//!
//! Monitoring is observation only; nothing in the scheduler depends on
//! whether anyone is subscribed.

use std::time::Duration;

use super::ids::RunId;
use super::state::SessionState;

/// Event emitted during a scheduling session
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// Session started with `total` tasks to schedule
    SessionStarted { run_id: RunId, total: usize },
    /// Task handed to the execution backend
    TaskDispatched {
        team: String,
        phase: u32,
        attempt: u32,
    },
    /// Task completed and persisted
    TaskCompleted { team: String },
    /// Task failed and the failure policy gave up on it
    TaskFailed { team: String, error: String },
    /// Task will be dispatched again after `delay`
    RetryScheduled {
        team: String,
        attempt: u32,
        delay: Duration,
    },
    /// Task will not run this session because `cause` failed
    TaskBlocked { team: String, cause: String },
    /// Rollback requested after a failure; `last_completed` is the most
    /// recently completed task, if any
    RollbackSignal {
        failed_team: String,
        last_completed: Option<String>,
    },
    /// Named checkpoint written to the state store
    CheckpointWritten { name: String },
    /// Session finished
    SessionFinished {
        run_id: RunId,
        state: SessionState,
        completed: usize,
        failed: usize,
    },
}

impl WorkflowEvent {
    /// Team the event is about, if any.
    pub fn team(&self) -> Option<&str> {
        match self {
            WorkflowEvent::TaskDispatched { team, .. }
            | WorkflowEvent::TaskCompleted { team }
            | WorkflowEvent::TaskFailed { team, .. }
            | WorkflowEvent::RetryScheduled { team, .. }
            | WorkflowEvent::TaskBlocked { team, .. } => Some(team),
            WorkflowEvent::RollbackSignal { failed_team, .. } => Some(failed_team),
            _ => None,
        }
    }
}
