//! YAML configuration.
//!
//! Every section except `teams` has defaults. Teams are validated into
//! `TeamSpec`s once, at load time; a malformed team fails the whole load
//! before anything is scheduled.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::domain::TeamSpec;
use crate::error::{Result, WorkflowError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub version: String,
    pub base_path: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "cadre-buildout".to_string(),
            version: "0.1.0".to_string(),
            base_path: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Write the run state to `state_file`. When off, state lives in memory only.
    pub persistence: bool,
    /// Keep prior snapshots in `history`.
    pub backup_state: bool,
    pub restore_on_startup: bool,
    pub state_file: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            persistence: true,
            backup_state: true,
            restore_on_startup: true,
            state_file: PathBuf::from("state/workflow_state.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    pub rollback_on_failure: bool,
    pub abort_on_failure: bool,
    /// Dispatches per task, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_delay_secs: u64,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            rollback_on_failure: true,
            abort_on_failure: false,
            max_attempts: 1,
            retry_delay_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// In-flight task limit. Unlimited when absent.
    pub max_parallel: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub console_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            console_output: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub host: String,
    pub remote_project_path: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            remote_project_path: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Shell command template run once per task attempt.
    pub command: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    project: ProjectConfig,
    #[serde(default)]
    state: StateConfig,
    #[serde(default)]
    error_handling: ErrorHandlingConfig,
    #[serde(default)]
    execution: ExecutionConfig,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    ssh: SshConfig,
    #[serde(default)]
    backend: BackendConfig,
    #[serde(default)]
    teams: Option<Mapping>,
}

#[derive(Debug, Deserialize)]
struct RawTeam {
    name: Option<String>,
    phase: Option<i64>,
    #[serde(default)]
    dependencies: Vec<Value>,
    duration_estimate: Option<f64>,
    step_file: Option<String>,
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub project: ProjectConfig,
    pub state: StateConfig,
    pub error_handling: ErrorHandlingConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
    pub ssh: SshConfig,
    pub backend: BackendConfig,
    /// Teams in configuration order.
    pub teams: Vec<TeamSpec>,
}

impl Config {
    /// Defaults for every section plus the given teams.
    pub fn with_teams(teams: Vec<TeamSpec>) -> Self {
        let teams = teams
            .into_iter()
            .enumerate()
            .map(|(order, team)| team.with_order(order))
            .collect();
        Self {
            project: ProjectConfig::default(),
            state: StateConfig::default(),
            error_handling: ErrorHandlingConfig::default(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
            ssh: SshConfig::default(),
            backend: BackendConfig::default(),
            teams,
        }
    }

    /// Load and validate a configuration file.
    ///
    /// A relative `project.base_path` is resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Configuration(format!(
                "cannot read configuration {}: {e}",
                path.display()
            ))
        })?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_yaml_str(&text, &dir)
    }

    /// Parse and validate configuration text. `config_dir` anchors a relative
    /// `project.base_path`.
    pub fn from_yaml_str(text: &str, config_dir: &Path) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(text)?;

        let mut project = raw.project;
        if project.base_path.is_relative() {
            project.base_path = config_dir.join(&project.base_path);
        }

        let teams = parse_teams(raw.teams)?;

        let config = Self {
            project,
            state: raw.state,
            error_handling: raw.error_handling,
            execution: raw.execution,
            logging: raw.logging,
            ssh: raw.ssh,
            backend: raw.backend,
            teams,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.error_handling.max_attempts == 0 {
            return Err(WorkflowError::Configuration(
                "error_handling.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.execution.max_parallel == Some(0) {
            return Err(WorkflowError::Configuration(
                "execution.max_parallel must be at least 1".to_string(),
            ));
        }
        for team in &self.teams {
            team.validate()?;
        }
        Ok(())
    }

    pub fn team(&self, id: &str) -> Option<&TeamSpec> {
        self.teams.iter().find(|t| t.id == id)
    }

    /// Distinct phases, ascending.
    pub fn phases(&self) -> BTreeSet<u32> {
        self.teams.iter().map(|t| t.phase).collect()
    }

    pub fn state_file_path(&self) -> PathBuf {
        self.resolve(&self.state.state_file)
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.logging.file.as_deref().map(|p| self.resolve(p))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            self.project.base_path.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

fn parse_teams(teams: Option<Mapping>) -> Result<Vec<TeamSpec>> {
    let teams = match teams {
        Some(teams) if !teams.is_empty() => teams,
        _ => {
            return Err(WorkflowError::Configuration(
                "no teams configured".to_string(),
            ));
        }
    };

    teams
        .into_iter()
        .enumerate()
        .map(|(order, (key, value))| {
            let id = key.as_str().map(str::to_string).ok_or_else(|| {
                WorkflowError::Configuration(format!("team key {key:?} is not a string"))
            })?;
            parse_team(id, value, order)
        })
        .collect()
}

fn parse_team(id: String, value: Value, order: usize) -> Result<TeamSpec> {
    let raw: RawTeam = serde_yaml::from_value(value)
        .map_err(|e| WorkflowError::Configuration(format!("team '{id}': {e}")))?;

    let phase = raw.phase.ok_or_else(|| {
        WorkflowError::Configuration(format!("team '{id}' is missing required field 'phase'"))
    })?;
    let phase = u32::try_from(phase)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| {
            WorkflowError::Configuration(format!(
                "team '{id}' has phase {phase}, phases start at 1"
            ))
        })?;

    let dependencies = raw
        .dependencies
        .into_iter()
        .map(|dep| match dep {
            Value::String(s) => Ok(s),
            other => Err(WorkflowError::Configuration(format!(
                "team '{id}' has a non-string dependency {other:?}"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut team = TeamSpec::new(id, phase)
        .with_dependencies(dependencies)
        .with_order(order);
    if let Some(name) = raw.name {
        team = team.with_name(name);
    }
    if let Some(hours) = raw.duration_estimate {
        team = team.with_duration(hours);
    }
    if let Some(step_file) = raw.step_file {
        team = team.with_step_file(step_file);
    }
    team.validate()?;
    Ok(team)
}
