//! CommandExecutor - runs each task attempt as a shell command
//!
//! The command template comes from `backend.command`. Placeholders:
//! `{team}`, `{name}`, `{phase}`, `{step_file}`, `{host}`, `{remote_path}`.
//! Exit status 0 is success; the detail is the tail of the command's output.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::domain::{Outcome, TaskDescriptor};
use crate::ports::TaskExecutor;

/// Lines of output kept in an outcome's detail.
const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    template: String,
    host: String,
    remote_path: String,
    working_dir: Option<PathBuf>,
}

impl CommandExecutor {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            host: String::new(),
            remote_path: String::new(),
            working_dir: None,
        }
    }

    /// Executor for `backend.command`, or `None` when no command is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let template = config.backend.command.as_deref()?;
        Some(
            Self::new(template)
                .with_ssh(&config.ssh.host, &config.ssh.remote_project_path)
                .with_working_dir(config.project.base_path.clone()),
        )
    }

    pub fn with_ssh(mut self, host: impl Into<String>, remote_path: impl Into<String>) -> Self {
        self.host = host.into();
        self.remote_path = remote_path.into();
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// The command line for `task`, placeholders substituted.
    pub fn render(&self, task: &TaskDescriptor) -> String {
        self.template
            .replace("{team}", &task.id)
            .replace("{name}", &task.name)
            .replace("{phase}", &task.phase.to_string())
            .replace("{step_file}", task.step_file.as_deref().unwrap_or(""))
            .replace("{host}", &self.host)
            .replace("{remote_path}", &self.remote_path)
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    async fn execute(&self, task: &TaskDescriptor) -> Outcome {
        let command_line = self.render(task);
        debug!(team = %task.id, command = %command_line, "running backend command");

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&command_line)
            .env("CADRE_TEAM", &task.id)
            .env("CADRE_PHASE", task.phase.to_string())
            .kill_on_drop(true);
        if let Some(step_file) = &task.step_file {
            command.env("CADRE_STEP_FILE", step_file);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = match command.output().await {
            Ok(output) => output,
            Err(e) => return Outcome::failure(format!("failed to run backend command: {e}")),
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let tail = output_tail(&text, OUTPUT_TAIL_LINES);

        if output.status.success() {
            Outcome::success(tail)
        } else if tail.is_empty() {
            Outcome::failure(format!("backend command exited with {}", output.status))
        } else {
            Outcome::failure(format!("backend command exited with {}: {tail}", output.status))
        }
    }
}

fn output_tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim().lines().collect();
    let skip = all.len().saturating_sub(lines);
    all[skip..].join("\n")
}
