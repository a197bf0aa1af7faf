//! App layer: wires the ports into a context and exposes the workflow
//! operations.
//!
//! # Components
//! - **ContextBuilder**: builds a `SchedulerContext` from config and ports
//! - **SchedulerContext**: shared state threaded through every operation
//! - **FailureController**: retry decisions, rollback and reset
//! - **Orchestrator**: the command surface (run, phase, resume, status, ...)

pub mod builder;
pub mod context;
pub mod failure;
pub mod orchestrator;

pub use self::builder::ContextBuilder;
pub use self::context::{SchedulerContext, SessionGuard};
pub use self::failure::{FailureController, RESET_PROMPT};
pub use self::orchestrator::{Orchestrator, RunOutcome};
