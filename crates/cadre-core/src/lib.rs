//! cadre-core
//!
//! Core building blocks for the Cadre phased build-out orchestrator.
//!
//! # Modules
//! - **domain**: domain model (teams, task descriptors, outcomes, decisions, state, events, roles)
//! - **ports**: seams to the outside (TaskExecutor, StateBackend, Clock, IdGenerator, Confirmation)
//! - **impls**: port implementations (FileBackend, MemoryBackend, CommandExecutor)
//! - **config**: YAML configuration and the validated team list
//! - **store**: checkpointed run state with bounded history
//! - **schedule**: task graph builder, dependency graph, retry policy, scheduler
//! - **app**: context wiring, failure & rollback controller, orchestrator
//! - **observability**: session monitor and status report
//! - **error**: error types

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod schedule;
pub mod store;

#[cfg(test)]
mod testing;

pub use app::{ContextBuilder, Orchestrator, RunOutcome, SchedulerContext};
pub use config::Config;
pub use error::{PersistenceError, Result, WorkflowError};
pub use schedule::{ExecutionPlan, RunReport};
