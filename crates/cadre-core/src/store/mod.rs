//! Checkpointed run state.
//!
//! `StateStore` owns the current run state document and a bounded history
//! of prior snapshots. Every save merges into the current document and hands
//! the whole `{current, history}` file to the backend. Backend failures are
//! logged and swallowed: losing a write must never take a running session
//! down with it.

pub mod document;

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::RunId;
use crate::ports::{Clock, StateBackend};

pub use self::document::{Document, HISTORY_CAPACITY, Progress, StateFile, keys};
use self::document::{list_value, phase_value, string_list, string_value};

/// Behaviour switches taken from the `state` and `project` config sections.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    pub persistence: bool,
    pub backup_state: bool,
    pub restore_on_startup: bool,
    /// Stamped on every save.
    pub version: String,
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            persistence: config.state.persistence,
            backup_state: config.state.backup_state,
            restore_on_startup: config.state.restore_on_startup,
            version: config.project.version.clone(),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            persistence: true,
            backup_state: true,
            restore_on_startup: true,
            version: "0.1.0".to_string(),
        }
    }
}

pub struct StateStore {
    backend: Box<dyn StateBackend>,
    clock: Arc<dyn Clock>,
    options: StoreOptions,
    current: Document,
    history: VecDeque<Document>,
    run_id: Option<RunId>,
}

impl StateStore {
    /// Create a store with an empty document. Nothing is read.
    pub fn new(
        backend: Box<dyn StateBackend>,
        clock: Arc<dyn Clock>,
        options: StoreOptions,
    ) -> Self {
        Self {
            backend,
            clock,
            options,
            current: Document::new(),
            history: VecDeque::new(),
            run_id: None,
        }
    }

    /// Create a store and load the persisted file when
    /// `restore_on_startup` is set.
    pub fn open(
        backend: Box<dyn StateBackend>,
        clock: Arc<dyn Clock>,
        options: StoreOptions,
    ) -> Self {
        let restore = options.restore_on_startup;
        let mut store = Self::new(backend, clock, options);
        if restore {
            store.load();
        }
        store
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Session id stamped on subsequent saves.
    pub fn set_run_id(&mut self, run_id: Option<RunId>) {
        self.run_id = run_id;
    }

    /// Re-read the persisted file before acting on earlier progress.
    ///
    /// With persistence off nothing was ever written, so the in-memory state
    /// is the only copy and is kept.
    pub fn reload(&mut self) {
        if self.options.persistence {
            self.load();
        } else {
            debug!("persistence disabled, keeping in-memory run state");
        }
    }

    /// Replace the in-memory state with the persisted file.
    ///
    /// A missing or unreadable file leaves an empty document and history.
    pub fn load(&mut self) {
        match self.backend.read() {
            Ok(Some(file)) => {
                self.current = file.current;
                let skip = file.history.len().saturating_sub(HISTORY_CAPACITY);
                self.history = file.history.into_iter().skip(skip).collect();
                debug!(
                    location = %self.backend.describe(),
                    history = self.history.len(),
                    "run state loaded"
                );
            }
            Ok(None) => {
                self.current.clear();
                self.history.clear();
            }
            Err(e) => {
                warn!(error = %e, "failed to load run state, starting empty");
                self.current.clear();
                self.history.clear();
            }
        }
    }

    /// Shallow-merge `partial` into the current document and persist.
    ///
    /// The pre-merge document goes to history when persistence and backups
    /// are on. Keys not in `partial` are kept, so the latest
    /// `checkpoint_name` stays on the current document.
    pub fn save(&mut self, partial: Document) {
        let previous = self.current.clone();

        self.current.extend(partial);
        self.current.insert(
            keys::TIMESTAMP.to_string(),
            Value::String(self.clock.now().to_rfc3339()),
        );
        self.current.insert(
            keys::VERSION.to_string(),
            Value::String(self.options.version.clone()),
        );
        if let Some(run_id) = self.run_id {
            self.current
                .insert(keys::RUN_ID.to_string(), Value::String(run_id.to_string()));
        }

        if !self.options.persistence {
            return;
        }

        if self.options.backup_state && !previous.is_empty() {
            self.history.push_back(previous);
            while self.history.len() > HISTORY_CAPACITY {
                self.history.pop_front();
            }
        }
        self.write();
    }

    fn write(&self) {
        let file = StateFile {
            current: self.current.clone(),
            history: self.history.iter().cloned().collect(),
        };
        if let Err(e) = self.backend.write(&file) {
            warn!(
                location = %self.backend.describe(),
                error = %e,
                "failed to persist run state"
            );
        }
    }

    pub fn get(&self, key: &str, default: Value) -> Value {
        self.current.get(key).cloned().unwrap_or(default)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        let mut partial = Document::new();
        partial.insert(key.to_string(), value);
        self.save(partial);
    }

    /// Save `data` labelled as checkpoint `name`.
    pub fn checkpoint(&mut self, name: &str, mut data: Document) {
        data.insert(
            keys::CHECKPOINT_NAME.to_string(),
            Value::String(name.to_string()),
        );
        self.save(data);
    }

    /// Find checkpoint `name` in history and the current document.
    ///
    /// Later saves carry the label forward, so the snapshot returned is the
    /// first one of the most recent labelled run: the state the checkpoint
    /// was written with, or the oldest survivor once history has evicted it.
    /// The match becomes the current document.
    pub fn restore_checkpoint(&mut self, name: &str) -> Option<Document> {
        let snapshots: Vec<&Document> = self
            .history
            .iter()
            .chain(std::iter::once(&self.current))
            .collect();
        let labelled =
            |doc: &Document| string_value(doc, keys::CHECKPOINT_NAME).as_deref() == Some(name);

        let start = (0..snapshots.len())
            .rev()
            .find(|&i| labelled(snapshots[i]) && (i == 0 || !labelled(snapshots[i - 1])))?;
        let snapshot = snapshots[start].clone();
        self.current = snapshot.clone();
        Some(snapshot)
    }

    /// Checkpoint names: current document first, then history order.
    pub fn list_checkpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for snapshot in std::iter::once(&self.current).chain(self.history.iter()) {
            if let Some(name) = string_value(snapshot, keys::CHECKPOINT_NAME)
                && !names.contains(&name)
            {
                names.push(name);
            }
        }
        names
    }

    /// Reset document and history, and delete the persisted file.
    pub fn clear(&mut self) {
        self.current.clear();
        self.history.clear();
        if let Err(e) = self.backend.remove() {
            warn!(
                location = %self.backend.describe(),
                error = %e,
                "failed to delete run state"
            );
        }
    }

    /// Record `team` as completed. Clears any earlier failure of the same
    /// team in the same save.
    pub fn mark_team_complete(&mut self, team: &str) {
        self.mark_teams_complete(std::iter::once(team));
    }

    /// Record several teams as completed in one save.
    pub fn mark_teams_complete<'a, I>(&mut self, teams: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut completed = self.completed_teams();
        let mut failed = self.failed_teams();
        let mut errors = self.team_errors_map();
        let mut changed_failures = false;
        let mut changed = false;

        for team in teams {
            if !completed.iter().any(|t| t == team) {
                completed.push(team.to_string());
                changed = true;
            }
            if let Some(pos) = failed.iter().position(|t| t == team) {
                failed.remove(pos);
                changed_failures = true;
            }
            if errors.remove(team).is_some() {
                changed_failures = true;
            }
        }

        if !changed && !changed_failures {
            return;
        }

        let mut partial = Document::new();
        partial.insert(keys::COMPLETED_TEAMS.to_string(), list_value(completed));
        if changed_failures {
            partial.insert(keys::FAILED_TEAMS.to_string(), list_value(failed));
            partial.insert(keys::TEAM_ERRORS.to_string(), Value::Object(errors));
        }
        self.save(partial);
    }

    /// Record `team` as failed with `error`. Ignored with a warning when the
    /// team is already completed.
    pub fn mark_team_failed(&mut self, team: &str, error: &str) {
        if self.is_team_completed(team) {
            warn!(team = %team, "ignoring failure of a completed team");
            return;
        }

        let mut failed = self.failed_teams();
        if !failed.iter().any(|t| t == team) {
            failed.push(team.to_string());
        }
        let mut errors = self.team_errors_map();
        errors.insert(team.to_string(), Value::String(error.to_string()));

        let mut partial = Document::new();
        partial.insert(keys::FAILED_TEAMS.to_string(), list_value(failed));
        partial.insert(keys::TEAM_ERRORS.to_string(), Value::Object(errors));
        partial.insert(
            keys::LAST_ERROR.to_string(),
            Value::String(error.to_string()),
        );
        partial.insert(keys::FAILED_TEAM.to_string(), Value::String(team.to_string()));
        self.save(partial);
    }

    pub fn completed_teams(&self) -> Vec<String> {
        string_list(&self.current, keys::COMPLETED_TEAMS)
    }

    pub fn failed_teams(&self) -> Vec<String> {
        string_list(&self.current, keys::FAILED_TEAMS)
    }

    pub fn team_error(&self, team: &str) -> Option<String> {
        self.current
            .get(keys::TEAM_ERRORS)
            .and_then(Value::as_object)
            .and_then(|errors| errors.get(team))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn team_errors_map(&self) -> Document {
        self.current
            .get(keys::TEAM_ERRORS)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_team_completed(&self, team: &str) -> bool {
        self.completed_teams().iter().any(|t| t == team)
    }

    pub fn is_team_failed(&self, team: &str) -> bool {
        self.failed_teams().iter().any(|t| t == team)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed_teams: self.completed_teams(),
            failed_teams: self.failed_teams(),
            current_phase: phase_value(&self.current, keys::CURRENT_PHASE),
            last_update: string_value(&self.current, keys::TIMESTAMP),
        }
    }

    /// The `n` most recent history snapshots, oldest first.
    pub fn history(&self, n: usize) -> Vec<Document> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn current(&self) -> &Document {
        &self.current
    }

    pub fn last_state(&self) -> Option<&Document> {
        (!self.current.is_empty()).then_some(&self.current)
    }

    /// The current document, when restoring on startup is enabled and there
    /// is something to restore.
    pub fn restore_state(&self) -> Option<&Document> {
        if self.options.restore_on_startup {
            self.last_state()
        } else {
            None
        }
    }
}
