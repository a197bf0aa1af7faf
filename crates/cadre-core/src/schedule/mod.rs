//! Scheduling: task set construction, dependency resolution, retries and
//! the session loop.

pub mod builder;
pub mod dependency;
pub mod plan;
pub mod record;
pub mod retry;
pub mod scheduler;

pub use self::builder::TaskGraphBuilder;
pub use self::dependency::DependencyGraph;
pub use self::plan::ExecutionPlan;
pub use self::record::TaskRecord;
pub use self::retry::RetryPolicy;
pub use self::scheduler::{RunReport, Scheduler};
