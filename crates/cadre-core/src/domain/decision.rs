//! Decision model: what to do after a task's execution failed.
//!
//! This module defines the Decision type (what to do next) and the Decider trait
//! (how to determine the next action from the task record and its outcome).

use std::time::Duration;

use super::Outcome;
use crate::config::ErrorHandlingConfig;
use crate::schedule::{RetryPolicy, TaskRecord};

/// The next action after a failed execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Dispatch the task again after a delay. Nothing is recorded as failed.
    Retry { delay: Duration, reason: String },

    /// Record the failure and keep scheduling tasks that do not depend on it.
    Continue { reason: String },

    /// Record the failure and stop dispatching. In-flight tasks are awaited.
    Abort { reason: String },
}

impl Decision {
    /// Does this decision record the task as failed?
    pub fn gives_up(&self) -> bool {
        !matches!(self, Decision::Retry { .. })
    }
}

/// Trait for deciding the next action after a failure.
///
/// Deciders are pure functions: given the task record and the outcome,
/// they return the next action without side effects. The scheduler carries
/// the decision out.
pub trait Decider: Send + Sync {
    /// # Arguments
    /// * `task` - The task record (attempts so far, including the failed one)
    /// * `outcome` - The outcome of the most recent attempt
    fn decide(&self, task: &TaskRecord, outcome: &Outcome) -> Decision;
}

/// Attempt-based decider:
/// - Retry with exponential backoff while attempts < max_attempts
/// - Then give up, aborting the session when `abort_on_failure` is set
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
    max_attempts: u32,
    abort_on_failure: bool,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy, max_attempts: u32, abort_on_failure: bool) -> Self {
        Self {
            retry_policy,
            max_attempts: max_attempts.max(1),
            abort_on_failure,
        }
    }

    pub fn from_config(config: &ErrorHandlingConfig) -> Self {
        Self::new(
            RetryPolicy::new(Duration::from_secs(config.retry_delay_secs), 2.0),
            config.max_attempts,
            config.abort_on_failure,
        )
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, task: &TaskRecord, outcome: &Outcome) -> Decision {
        if task.attempts < self.max_attempts {
            let delay = self.retry_policy.next_delay(task.attempts);
            return Decision::Retry {
                delay,
                reason: format!(
                    "retry attempt {}/{} after {:?}",
                    task.attempts + 1,
                    self.max_attempts,
                    delay
                ),
            };
        }

        let reason = format!(
            "gave up after {}/{} attempts: {}",
            task.attempts, self.max_attempts, outcome.detail
        );
        if self.abort_on_failure {
            Decision::Abort { reason }
        } else {
            Decision::Continue { reason }
        }
    }
}
