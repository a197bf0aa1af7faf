//! Execution backend port.
//!
//! The scheduler hands each dispatched task to a `TaskExecutor` and waits for
//! its terminal `Outcome`. How the work is performed (shell command, remote
//! agent, ...) is the backend's business.

use async_trait::async_trait;

use crate::domain::{Outcome, TaskDescriptor};

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Perform one attempt of `task`.
    ///
    /// Backend errors are reported as `Outcome::failure`, never as a panic.
    async fn execute(&self, task: &TaskDescriptor) -> Outcome;
}
