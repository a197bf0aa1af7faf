//! Dependency graph over the tasks of one session.
//!
//! Design:
//! - Forward edges: task -> tasks it depends on (waits for)
//! - Reverse edges: task -> tasks that depend on it (waiting tasks)
//! - Invariant: edges and reverse_edges must be kept in sync
//! - A dependency on an id that is not a node stays in `edges`; it is
//!   satisfiable only through the completed set passed to the queries.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::TaskDescriptor;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node ids in insertion order. Query results follow this order.
    nodes: Vec<String>,

    /// Forward edges: task -> tasks it depends on (waits for)
    edges: HashMap<String, HashSet<String>>,

    /// Reverse edges: task -> tasks that depend on it (waiting tasks)
    reverse_edges: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph of `tasks` and their declared dependencies.
    pub fn from_tasks(tasks: &[TaskDescriptor]) -> Self {
        let mut graph = Self::new();
        for task in tasks {
            graph.add_task(&task.id);
        }
        for task in tasks {
            for dep in &task.dependencies {
                graph.add_dependency(&task.id, dep);
            }
        }
        graph
    }

    pub fn add_task(&mut self, task: &str) {
        if !self.contains(task) {
            self.nodes.push(task.to_string());
        }
    }

    pub fn contains(&self, task: &str) -> bool {
        self.nodes.iter().any(|n| n == task)
    }

    /// Add a dependency: `task` depends on `depends_on`.
    ///
    /// Example: add_dependency("bravo", "alpha") means "bravo waits for alpha"
    pub fn add_dependency(&mut self, task: &str, depends_on: &str) {
        self.edges
            .entry(task.to_string())
            .or_default()
            .insert(depends_on.to_string());
        self.reverse_edges
            .entry(depends_on.to_string())
            .or_default()
            .insert(task.to_string());
    }

    pub fn dependencies_of(&self, task: &str) -> Vec<String> {
        self.in_node_order(self.edges.get(task))
    }

    /// Tasks that declared `task` as a dependency.
    pub fn dependents_of(&self, task: &str) -> Vec<String> {
        self.in_node_order(self.reverse_edges.get(task))
    }

    /// Every task that depends on `task`, directly or through other tasks.
    pub fn transitive_dependents(&self, task: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([task.to_string()]);
        while let Some(current) = queue.pop_front() {
            if let Some(waiting) = self.reverse_edges.get(&current) {
                for dependent in waiting {
                    if dependent != task && seen.insert(dependent.clone()) {
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }
        self.nodes
            .iter()
            .filter(|n| seen.contains(*n))
            .cloned()
            .collect()
    }

    /// Tasks that can never become eligible when only `satisfied` (plus the
    /// tasks of this graph as they complete) counts as done.
    ///
    /// Kahn's algorithm: repeatedly retire tasks whose dependencies are all
    /// satisfied or retired. Whatever is left is a cycle member, depends on a
    /// cycle, or depends on an id that is neither a node nor satisfied.
    pub fn unresolved(&self, satisfied: &HashSet<String>) -> Vec<String> {
        let (_, remaining) = self.kahn_levels(satisfied);
        remaining
    }

    /// Dispatch waves: level `k` holds the tasks whose last unsatisfied
    /// dependency sits in level `k - 1`. Unresolvable tasks are left out.
    pub fn levels(&self, satisfied: &HashSet<String>) -> Vec<Vec<String>> {
        let (levels, _) = self.kahn_levels(satisfied);
        levels
    }

    fn kahn_levels(&self, satisfied: &HashSet<String>) -> (Vec<Vec<String>>, Vec<String>) {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| {
                let open = self
                    .edges
                    .get(n)
                    .map(|deps| deps.iter().filter(|d| !satisfied.contains(*d)).count())
                    .unwrap_or(0);
                (n.as_str(), open)
            })
            .collect();

        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut frontier: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| in_degree.get(n.as_str()) == Some(&0))
            .cloned()
            .collect();

        while !frontier.is_empty() {
            let mut next: HashSet<String> = HashSet::new();
            for task in &frontier {
                in_degree.remove(task.as_str());
                // a satisfied id never counted against its dependents
                if satisfied.contains(task) {
                    continue;
                }
                if let Some(waiting) = self.reverse_edges.get(task) {
                    for dependent in waiting {
                        if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                            *degree = degree.saturating_sub(1);
                            if *degree == 0 {
                                next.insert(dependent.clone());
                            }
                        }
                    }
                }
            }
            levels.push(frontier);
            frontier = self
                .nodes
                .iter()
                .filter(|n| next.contains(*n))
                .cloned()
                .collect();
        }

        let remaining = self
            .nodes
            .iter()
            .filter(|n| in_degree.contains_key(n.as_str()))
            .cloned()
            .collect();
        (levels, remaining)
    }

    /// Find one dependency cycle among the nodes, as a path that starts and
    /// ends with the same id. `None` when the graph is acyclic.
    ///
    /// Iterative DFS with three colours, O(V + E).
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<&str, Color> =
            self.nodes.iter().map(|n| (n.as_str(), Color::White)).collect();

        for start in &self.nodes {
            if color.get(start.as_str()) != Some(&Color::White) {
                continue;
            }

            // (node, its dependencies still to explore)
            let mut stack: Vec<(&str, Vec<&str>)> = vec![(start.as_str(), self.node_deps(start))];
            color.insert(start.as_str(), Color::Gray);

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                match pending.pop() {
                    Some(dep) => match color.get(dep).copied() {
                        Some(Color::Gray) => {
                            let begin = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                            let mut cycle: Vec<String> =
                                stack[begin..].iter().map(|(n, _)| n.to_string()).collect();
                            cycle.push(dep.to_string());
                            return Some(cycle);
                        }
                        Some(Color::White) => {
                            color.insert(dep, Color::Gray);
                            stack.push((dep, self.node_deps(dep)));
                        }
                        _ => {}
                    },
                    None => {
                        color.insert(node, Color::Black);
                        stack.pop();
                    }
                }
            }
        }
        None
    }

    /// Dependencies of `task` that are nodes, reverse node order so that
    /// popping explores them in node order.
    fn node_deps(&self, task: &str) -> Vec<&str> {
        let mut deps: Vec<&str> = self
            .nodes
            .iter()
            .filter(|n| {
                self.edges
                    .get(task)
                    .is_some_and(|deps| deps.contains(n.as_str()))
            })
            .map(String::as_str)
            .collect();
        deps.reverse();
        deps
    }

    fn in_node_order(&self, set: Option<&HashSet<String>>) -> Vec<String> {
        let Some(set) = set else {
            return Vec::new();
        };
        let mut ordered: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| set.contains(*n))
            .cloned()
            .collect();
        // ids outside the graph go last, sorted for stable output
        let mut foreign: Vec<String> = set
            .iter()
            .filter(|id| !self.contains(id))
            .cloned()
            .collect();
        foreign.sort();
        ordered.extend(foreign);
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::descriptor;

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn diamond() -> DependencyGraph {
        DependencyGraph::from_tasks(&[
            descriptor("alpha", 1, &[], 0),
            descriptor("bravo", 1, &[], 1),
            descriptor("charlie", 2, &["alpha", "bravo"], 2),
            descriptor("delta", 3, &["charlie"], 3),
        ])
    }

    #[test]
    fn forward_and_reverse_edges_stay_in_sync() {
        let graph = diamond();
        assert_eq!(graph.dependencies_of("charlie"), vec!["alpha", "bravo"]);
        assert_eq!(graph.dependents_of("alpha"), vec!["charlie"]);
        assert!(graph.dependents_of("delta").is_empty());
    }

    #[test]
    fn transitive_dependents_follow_chains() {
        let graph = diamond();
        assert_eq!(graph.transitive_dependents("alpha"), vec!["charlie", "delta"]);
        assert!(graph.transitive_dependents("delta").is_empty());
    }

    #[test]
    fn levels_group_dispatch_waves() {
        let graph = diamond();
        assert_eq!(
            graph.levels(&HashSet::new()),
            vec![vec!["alpha", "bravo"], vec!["charlie"], vec!["delta"]]
        );
    }

    #[test]
    fn satisfied_ids_count_as_done() {
        let graph = DependencyGraph::from_tasks(&[
            descriptor("charlie", 2, &["alpha", "bravo"], 2),
            descriptor("delta", 3, &["charlie"], 3),
        ]);
        assert_eq!(graph.unresolved(&set(&["alpha"])), vec!["charlie", "delta"]);
        assert!(graph.unresolved(&set(&["alpha", "bravo"])).is_empty());
    }

    #[test]
    fn cycle_members_and_their_dependents_are_unresolved() {
        let graph = DependencyGraph::from_tasks(&[
            descriptor("a", 1, &["b"], 0),
            descriptor("b", 1, &["a"], 1),
            descriptor("c", 2, &["a"], 2),
            descriptor("free", 1, &[], 3),
        ]);
        assert_eq!(graph.unresolved(&HashSet::new()), vec!["a", "b", "c"]);
        assert_eq!(graph.levels(&HashSet::new()), vec![vec!["free"]]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = DependencyGraph::from_tasks(&[descriptor("a", 1, &["a"], 0)]);
        assert_eq!(graph.unresolved(&HashSet::new()), vec!["a"]);
        assert_eq!(graph.detect_cycle(), Some(vec!["a".to_string(), "a".to_string()]));
    }

    #[test]
    fn unknown_dependency_is_unresolved() {
        let graph = DependencyGraph::from_tasks(&[descriptor("a", 1, &["ghost"], 0)]);
        assert_eq!(graph.unresolved(&HashSet::new()), vec!["a"]);
        assert!(graph.detect_cycle().is_none());
        assert_eq!(graph.dependents_of("ghost"), vec!["a"]);
    }

    #[test]
    fn detect_cycle_reports_path() {
        let graph = DependencyGraph::from_tasks(&[
            descriptor("a", 1, &["c"], 0),
            descriptor("b", 1, &["a"], 1),
            descriptor("c", 1, &["b"], 2),
        ]);
        let cycle = graph.detect_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        assert!(diamond().detect_cycle().is_none());
    }
}
