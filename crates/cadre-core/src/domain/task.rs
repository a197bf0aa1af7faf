use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A schedulable unit of work handed to the execution backend.
///
/// `description` and `system_prompt` are opaque to the scheduler; only the
/// backend reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: String,
    pub name: String,
    pub phase: u32,
    pub dependencies: Vec<String>,
    pub priority: u32,
    pub duration_estimate: Option<f64>,
    pub step_file: Option<String>,
    pub description: String,
    pub system_prompt: String,

    /// Configuration order of the team.
    pub order: usize,
}

impl TaskDescriptor {
    /// Eligible once every declared dependency is in `completed`.
    pub fn is_eligible(&self, completed: &HashSet<String>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// Dispatch order: descending priority, then configuration order.
    pub fn dispatch_cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.order.cmp(&other.order))
    }
}

#[cfg(test)]
pub(crate) fn descriptor(id: &str, phase: u32, deps: &[&str], order: usize) -> TaskDescriptor {
    let dependencies: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
    TaskDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        phase,
        priority: super::team::priority(phase, dependencies.len()),
        dependencies,
        duration_estimate: None,
        step_file: None,
        description: String::new(),
        system_prompt: String::new(),
        order,
    }
}
