//! Task graph builder: validated teams + completed set -> task descriptors.

use std::collections::HashSet;

use tracing::debug;

use crate::config::{Config, SshConfig};
use crate::domain::{TaskDescriptor, TeamSpec, roles};
use crate::error::{Result, WorkflowError};

/// Builds the task set of a session.
///
/// Building is pure: the same teams and completed set always give the same
/// descriptors in the same order.
#[derive(Debug, Clone)]
pub struct TaskGraphBuilder {
    teams: Vec<TeamSpec>,
    ssh: SshConfig,
    phase: Option<u32>,
}

impl TaskGraphBuilder {
    pub fn new(teams: Vec<TeamSpec>) -> Self {
        Self {
            teams,
            ssh: SshConfig::default(),
            phase: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.teams.clone()).with_ssh(config.ssh.clone())
    }

    pub fn with_ssh(mut self, ssh: SshConfig) -> Self {
        self.ssh = ssh;
        self
    }

    /// Restrict the task set to one phase.
    pub fn only_phase(mut self, phase: u32) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Descriptors for every team not in `completed`, in configuration order.
    ///
    /// Dependencies are copied as declared, including ones already completed.
    pub fn build(&self, completed: &HashSet<String>) -> Result<Vec<TaskDescriptor>> {
        self.validate()?;

        let mut tasks = Vec::new();
        for team in &self.teams {
            if completed.contains(&team.id) {
                debug!(team = %team.id, "skipping team, already completed");
                continue;
            }
            if self.phase.is_some_and(|phase| phase != team.phase) {
                continue;
            }
            tasks.push(self.descriptor(team));
        }
        debug!(tasks = tasks.len(), "task set built");
        Ok(tasks)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for team in &self.teams {
            team.validate()?;
            if !seen.insert(team.id.as_str()) {
                return Err(WorkflowError::Configuration(format!(
                    "team '{}' is declared more than once",
                    team.id
                )));
            }
        }
        Ok(())
    }

    fn descriptor(&self, team: &TeamSpec) -> TaskDescriptor {
        TaskDescriptor {
            id: team.id.clone(),
            name: team.name.clone(),
            phase: team.phase,
            dependencies: team.dependencies.clone(),
            priority: team.priority(),
            duration_estimate: team.duration_estimate,
            step_file: team.step_file.clone(),
            description: describe(team, &self.ssh),
            system_prompt: roles::system_prompt(&team.id, &team.name),
            order: team.order,
        }
    }
}

/// Work description handed to the execution backend.
fn describe(team: &TeamSpec, ssh: &SshConfig) -> String {
    let step_file = team.step_file.as_deref().unwrap_or("(none)");
    let dependencies = if team.dependencies.is_empty() {
        "None".to_string()
    } else {
        team.dependencies.join(", ")
    };
    let duration = team
        .duration_estimate
        .map(|hours| format!("{hours} hours"))
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "Execute {name} (Phase {phase})\n\
         \n\
         Step documentation: {step_file}\n\
         \n\
         Steps:\n\
         1. Connect to the server over SSH (host: {host})\n\
         2. Change to the project directory: {remote_path}\n\
         3. Follow every instruction in {step_file}\n\
         4. Run each command carefully and verify its result\n\
         5. Run the verification script if one exists\n\
         6. Report completion status\n\
         \n\
         Dependencies: {dependencies}\n\
         Estimated duration: {duration}\n\
         \n\
         Record any issue you run into and make sure all verification passes.",
        name = team.name,
        phase = team.phase,
        host = ssh.host,
        remote_path = ssh.remote_project_path,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teams() -> Vec<TeamSpec> {
        vec![
            TeamSpec::new("alpha", 1).with_order(0).with_duration(2.0),
            TeamSpec::new("bravo", 1).with_order(1),
            TeamSpec::new("charlie", 2)
                .with_dependencies(["alpha", "bravo"])
                .with_step_file("docs/03-monitoring.md")
                .with_order(2),
            TeamSpec::new("delta", 3)
                .with_dependencies(["charlie"])
                .with_order(3),
        ]
    }

    fn completed(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builds_in_configuration_order_with_priority() {
        let tasks = TaskGraphBuilder::new(teams()).build(&HashSet::new()).unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "bravo", "charlie", "delta"]);
        assert_eq!(tasks[0].priority, 10);
        assert_eq!(tasks[2].priority, 7);
        assert_eq!(tasks[3].priority, 7);
    }

    #[test]
    fn completed_teams_are_skipped_but_dependencies_are_kept() {
        let tasks = TaskGraphBuilder::new(teams())
            .build(&completed(&["alpha", "bravo"]))
            .unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["charlie", "delta"]);
        assert_eq!(tasks[0].dependencies, vec!["alpha", "bravo"]);
    }

    #[test]
    fn building_is_idempotent() {
        let builder = TaskGraphBuilder::new(teams());
        let done = completed(&["alpha"]);
        assert_eq!(builder.build(&done).unwrap(), builder.build(&done).unwrap());
    }

    #[test]
    fn phase_restriction() {
        let tasks = TaskGraphBuilder::new(teams())
            .only_phase(1)
            .build(&HashSet::new())
            .unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.phase == 1));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut teams = teams();
        teams.push(TeamSpec::new("alpha", 2));
        let err = TaskGraphBuilder::new(teams)
            .build(&HashSet::new())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(msg) if msg.contains("more than once")));
    }

    #[test]
    fn invalid_team_fails_before_anything_is_built() {
        let mut teams = teams();
        teams.push(TeamSpec::new("echo", 0));
        assert!(TaskGraphBuilder::new(teams).build(&HashSet::new()).is_err());
    }

    #[test]
    fn payload_carries_description_and_prompt() {
        let ssh = SshConfig {
            host: "hv1.example.net".to_string(),
            remote_project_path: "/opt/hv".to_string(),
        };
        let tasks = TaskGraphBuilder::new(teams())
            .with_ssh(ssh)
            .build(&HashSet::new())
            .unwrap();

        let charlie = &tasks[2];
        assert!(charlie.description.starts_with("Execute charlie (Phase 2)"));
        assert!(charlie.description.contains("host: hv1.example.net"));
        assert!(charlie.description.contains("/opt/hv"));
        assert!(charlie.description.contains("docs/03-monitoring.md"));
        assert!(charlie.description.contains("Dependencies: alpha, bravo"));
        assert!(charlie.system_prompt.contains("monitoring specialist"));

        assert!(tasks[0].description.contains("Estimated duration: 2 hours"));
        assert!(tasks[0].description.contains("Dependencies: None"));
    }
}
