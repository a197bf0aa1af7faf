use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to the operator.
///
/// Task failures are recorded in the run state rather than raised; they only
/// become a `TaskExecution` error when a finished run is turned into a result.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "dependency cycle or unsatisfiable dependency, stuck tasks: {}",
        stuck.join(", ")
    )]
    DependencyCycle { stuck: Vec<String> },

    #[error("team '{team}' failed: {detail}")]
    TaskExecution { team: String, detail: String },

    #[error("unknown team: {0}")]
    UnknownTeam(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("a scheduling session is active, {0} is not allowed until it finishes")]
    SessionActive(&'static str),

    #[error("full reset was not confirmed")]
    ResetDeclined,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Failures of a state backend.
///
/// The state store logs these and carries on; they never reach the caller of
/// `save` or `clear`.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode state file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove state file {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_cycle_lists_stuck_tasks() {
        let err = WorkflowError::DependencyCycle {
            stuck: vec!["alpha".to_string(), "bravo".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle or unsatisfiable dependency, stuck tasks: alpha, bravo"
        );
    }

    #[test]
    fn task_execution_names_team_and_detail() {
        let err = WorkflowError::TaskExecution {
            team: "delta".to_string(),
            detail: "exit status 2".to_string(),
        };
        assert_eq!(err.to_string(), "team 'delta' failed: exit status 2");
    }
}
