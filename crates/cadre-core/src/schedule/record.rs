//! Task record: per-session runtime state of one task.

use std::time::Instant;

use crate::domain::{TaskDescriptor, TaskState};

/// Descriptor + runtime state for a task in the current session.
///
/// Design:
/// - This is the single source of truth for a task's in-session state.
/// - The durable completed/failed sets live in the state store; a record
///   only mirrors them for the duration of a session.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub descriptor: TaskDescriptor,
    pub state: TaskState,

    /// Number of times this task has been dispatched (including the current one).
    pub attempts: u32,

    /// Last error reported by the backend (if any).
    pub last_error: Option<String>,

    pub created_at: Instant,
    pub updated_at: Instant,
}

impl TaskRecord {
    pub fn new(descriptor: TaskDescriptor) -> Self {
        let now = Instant::now();
        Self {
            descriptor,
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn mark_eligible(&mut self) {
        self.state = TaskState::Eligible;
        self.updated_at = Instant::now();
    }

    /// Mark as running (increment attempts).
    pub fn start_attempt(&mut self) {
        self.state = TaskState::Running;
        self.attempts += 1;
        self.updated_at = Instant::now();
    }

    /// A retry keeps the task in Running; the next dispatch is already queued.
    pub fn schedule_retry(&mut self, error: String) {
        self.last_error = Some(error);
        self.attempts += 1;
        self.updated_at = Instant::now();
    }

    pub fn mark_completed(&mut self) {
        self.state = TaskState::Completed;
        self.updated_at = Instant::now();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = TaskState::Failed;
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    pub fn mark_blocked(&mut self, reason: String) {
        self.state = TaskState::Blocked;
        self.last_error = Some(reason);
        self.updated_at = Instant::now();
    }
}
