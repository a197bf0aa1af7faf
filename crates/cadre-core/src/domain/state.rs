//! Task and session state machines.

use serde::{Deserialize, Serialize};

/// Task state within one scheduling session.
///
/// State transitions:
/// - Pending -> Eligible -> Running -> Completed
/// - Pending -> Eligible -> Running -> Failed (retries stay in Running)
/// - Pending -> Blocked (a dependency failed, directly or transitively)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for dependencies.
    Pending,

    /// Dependencies satisfied, about to be dispatched.
    Eligible,

    /// Dispatched to the execution backend.
    Running,

    Completed,

    Failed,

    /// Will not run this session because a prerequisite failed.
    Blocked,
}

impl TaskState {
    /// Is this a terminal state (no further transitions this session)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Blocked
        )
    }

    pub fn is_pending(self) -> bool {
        matches!(self, TaskState::Pending)
    }
}

/// Global state of a scheduling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    InProgress,

    /// Nothing left to schedule. Failed or blocked tasks may remain.
    Done,

    /// The failure policy stopped the session.
    Aborted,
}

impl SessionState {
    pub fn is_finished(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Aborted)
    }
}
