//! Validated team configuration.

use serde::Serialize;

use crate::error::{Result, WorkflowError};

/// Constant `K` of the priority formula. Phases are expected in `1..=10`.
pub const PRIORITY_CEILING: i64 = 11;

/// Priority of a task: `max(1, (K - phase) - |dependencies|)`.
///
/// Higher values are dispatched first among simultaneously eligible tasks.
pub fn priority(phase: u32, dependency_count: usize) -> u32 {
    let base = PRIORITY_CEILING - i64::from(phase);
    let dependency_factor = i64::try_from(dependency_count).unwrap_or(i64::MAX);
    // clamped to >= 1, and the base is at most K - 1, so the cast cannot truncate
    base.saturating_sub(dependency_factor).max(1) as u32
}

/// One team as declared in configuration.
///
/// Built once at startup; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamSpec {
    pub id: String,
    pub name: String,
    pub phase: u32,

    /// Declared prerequisites. Never filtered against the completed set.
    pub dependencies: Vec<String>,

    /// Estimated hours, reporting only.
    pub duration_estimate: Option<f64>,

    pub step_file: Option<String>,

    /// Position in configuration order; breaks priority ties.
    pub order: usize,
}

impl TeamSpec {
    /// Create a team with no dependencies.
    pub fn new(id: impl Into<String>, phase: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            phase,
            dependencies: Vec::new(),
            duration_estimate: None,
            step_file: None,
            order: 0,
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_duration(mut self, hours: f64) -> Self {
        self.duration_estimate = Some(hours);
        self
    }

    pub fn with_step_file(mut self, step_file: impl Into<String>) -> Self {
        self.step_file = Some(step_file.into());
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn priority(&self) -> u32 {
        priority(self.phase, self.dependencies.len())
    }

    /// Check the fields that scheduling relies on.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(WorkflowError::Configuration(
                "team id must not be empty".to_string(),
            ));
        }
        if self.phase < 1 {
            return Err(WorkflowError::Configuration(format!(
                "team '{}' has phase {}, phases start at 1",
                self.id, self.phase
            )));
        }
        if let Some(hours) = self.duration_estimate
            && !(hours > 0.0 && hours.is_finite())
        {
            return Err(WorkflowError::Configuration(format!(
                "team '{}' has non-positive duration_estimate {hours}",
                self.id
            )));
        }
        if self.dependencies.iter().any(|d| d.trim().is_empty()) {
            return Err(WorkflowError::Configuration(format!(
                "team '{}' lists an empty dependency id",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::phase_one_no_deps(1, 0, 10)]
    #[case::phase_three_no_deps(3, 0, 8)]
    #[case::phase_two_two_deps(2, 2, 7)]
    #[case::phase_six_one_dep(6, 1, 4)]
    #[case::clamped_at_one(10, 5, 1)]
    #[case::phase_beyond_ceiling(14, 0, 1)]
    fn priority_formula(#[case] phase: u32, #[case] deps: usize, #[case] expected: u32) {
        assert_eq!(priority(phase, deps), expected);
    }

    #[test]
    fn earlier_phase_outranks_later_phase() {
        let a = TeamSpec::new("a", 1);
        let c = TeamSpec::new("c", 3);
        assert!(a.priority() > c.priority());
    }

    #[test]
    fn name_defaults_to_id() {
        let team = TeamSpec::new("echo_storage", 4);
        assert_eq!(team.name, "echo_storage");
    }

    #[rstest]
    #[case::zero_phase(TeamSpec::new("a", 0))]
    #[case::empty_id(TeamSpec::new("  ", 1))]
    #[case::negative_duration(TeamSpec::new("a", 1).with_duration(-2.0))]
    #[case::empty_dependency(TeamSpec::new("a", 1).with_dependencies([""]))]
    fn invalid_teams_are_rejected(#[case] team: TeamSpec) {
        assert!(matches!(
            team.validate(),
            Err(WorkflowError::Configuration(_))
        ));
    }

    #[test]
    fn valid_team_passes() {
        let team = TeamSpec::new("delta", 2)
            .with_dependencies(["alpha", "bravo"])
            .with_duration(3.5);
        assert!(team.validate().is_ok());
    }
}
