//! Resolved execution plan, as shown by a dry run.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::DependencyGraph;
use crate::domain::TaskDescriptor;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    /// Tasks of the session in configuration order.
    pub tasks: Vec<TaskDescriptor>,

    /// Dispatch waves with unlimited parallelism and every task succeeding.
    /// Within a wave, dispatch order (priority, then configuration order).
    pub waves: Vec<Vec<String>>,

    /// Tasks that can never become eligible.
    pub unresolved: Vec<String>,
}

impl ExecutionPlan {
    pub fn new(tasks: Vec<TaskDescriptor>, completed: &HashSet<String>) -> Self {
        let graph = DependencyGraph::from_tasks(&tasks);
        let by_id: HashMap<&str, &TaskDescriptor> =
            tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        let waves = graph
            .levels(completed)
            .into_iter()
            .map(|wave| {
                let mut members: Vec<&TaskDescriptor> = wave
                    .iter()
                    .filter_map(|id| by_id.get(id.as_str()).copied())
                    .collect();
                members.sort_by(|a, b| a.dispatch_cmp(b));
                members.into_iter().map(|t| t.id.clone()).collect()
            })
            .collect();
        let unresolved = graph.unresolved(completed);

        Self {
            tasks,
            waves,
            unresolved,
        }
    }

    pub fn is_runnable(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Tasks grouped by phase, ascending.
    pub fn by_phase(&self) -> BTreeMap<u32, Vec<&TaskDescriptor>> {
        let mut phases: BTreeMap<u32, Vec<&TaskDescriptor>> = BTreeMap::new();
        for task in &self.tasks {
            phases.entry(task.phase).or_default().push(task);
        }
        phases
    }

    /// Sum of the known duration estimates, in hours.
    pub fn estimated_hours(&self) -> f64 {
        self.tasks.iter().filter_map(|t| t.duration_estimate).sum()
    }
}
