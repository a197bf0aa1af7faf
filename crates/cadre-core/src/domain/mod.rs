//! Domain model (teams, task descriptors, outcomes, decisions, events).

pub mod decision;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod roles;
pub mod state;
pub mod task;
pub mod team;

pub use decision::{Decider, Decision, DefaultDecider};
pub use events::WorkflowEvent;
pub use ids::RunId;
pub use outcome::{Outcome, OutcomeKind};
pub use roles::Role;
pub use state::{SessionState, TaskState};
pub use task::TaskDescriptor;
pub use team::{PRIORITY_CEILING, TeamSpec, priority};
