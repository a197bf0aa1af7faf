//! Status views: the live session monitor and the status report.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::domain::SessionState;
use crate::store::StateStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
    pub running: usize,
    pub failed: usize,
    pub blocked: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    pub state: SessionState,
    pub counts: TaskCounts,
    pub running: Vec<String>,
}

#[derive(Debug)]
struct MonitorState {
    state: SessionState,
    total: usize,
    completed: usize,
    failed: usize,
    blocked: usize,
    running: BTreeSet<String>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            state: SessionState::NotStarted,
            total: 0,
            completed: 0,
            failed: 0,
            blocked: 0,
            running: BTreeSet::new(),
        }
    }
}

/// Live view of the current (or last) scheduling session.
///
/// Advisory only: the scheduler writes it, nothing reads it back to make a
/// scheduling decision.
#[derive(Debug, Clone, Default)]
pub struct SessionMonitor {
    inner: Arc<RwLock<MonitorState>>,
}

impl SessionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut MonitorState)) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }

    pub(crate) fn start(&self, total: usize) {
        self.update(|s| {
            *s = MonitorState {
                state: SessionState::InProgress,
                total,
                ..MonitorState::default()
            }
        });
    }

    pub(crate) fn dispatched(&self, team: &str) {
        self.update(|s| {
            s.running.insert(team.to_string());
        });
    }

    pub(crate) fn completed(&self, team: &str) {
        self.update(|s| {
            s.running.remove(team);
            s.completed += 1;
        });
    }

    pub(crate) fn failed(&self, team: &str) {
        self.update(|s| {
            s.running.remove(team);
            s.failed += 1;
        });
    }

    pub(crate) fn blocked(&self) {
        self.update(|s| s.blocked += 1);
    }

    pub(crate) fn finish(&self, state: SessionState) {
        self.update(|s| {
            s.state = state;
            s.running.clear();
        });
    }

    /// Teams currently dispatched to the backend.
    pub fn running(&self) -> Vec<String> {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        state.running.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let s = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let running = s.running.len();
        let settled = s.completed + s.failed + s.blocked + running;
        MonitorSnapshot {
            state: s.state,
            counts: TaskCounts {
                total: s.total,
                completed: s.completed,
                running,
                failed: s.failed,
                blocked: s.blocked,
                pending: s.total.saturating_sub(settled),
            },
            running: s.running.iter().cloned().collect(),
        }
    }

    /// `completed / total * 100` for the session; 0 before anything started.
    pub fn progress_percentage(&self) -> f64 {
        let s = self.inner.read().unwrap_or_else(|e| e.into_inner());
        percentage(s.completed, s.total)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Status of the whole build-out: configured teams against the run state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub counts: TaskCounts,
    pub percent_complete: f64,
    pub current_phase: Option<u32>,
    pub last_update: Option<String>,
    pub running: Vec<String>,
    /// Failed teams with their last error.
    pub failures: Vec<(String, String)>,
}

impl StatusReport {
    /// Counts cover configured teams only; ids left in the run state by an
    /// older configuration are ignored.
    pub fn collect(config: &Config, store: &StateStore, running: Vec<String>) -> Self {
        let progress = store.progress();
        let configured = |id: &str| config.team(id).is_some();

        let completed = progress
            .completed_teams
            .iter()
            .filter(|id| configured(id.as_str()))
            .count();
        let failures: Vec<(String, String)> = progress
            .failed_teams
            .iter()
            .filter(|id| configured(id.as_str()))
            .map(|id| (id.clone(), store.team_error(id).unwrap_or_default()))
            .collect();
        let running: Vec<String> = running
            .into_iter()
            .filter(|id| configured(id.as_str()))
            .collect();

        let total = config.teams.len();
        let pending = total.saturating_sub(completed + failures.len() + running.len());
        Self {
            counts: TaskCounts {
                total,
                completed,
                running: running.len(),
                failed: failures.len(),
                blocked: 0,
                pending,
            },
            percent_complete: percentage(completed, total),
            current_phase: progress.current_phase,
            last_update: progress.last_update,
            running,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TeamSpec;
    use crate::impls::MemoryBackend;
    use crate::ports::SystemClock;
    use crate::store::StoreOptions;

    #[test]
    fn monitor_tracks_session_counts() {
        let monitor = SessionMonitor::new();
        assert_eq!(monitor.progress_percentage(), 0.0);

        monitor.start(4);
        monitor.dispatched("alpha");
        monitor.dispatched("bravo");
        monitor.completed("alpha");
        monitor.failed("bravo");
        monitor.blocked();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.state, SessionState::InProgress);
        assert_eq!(snapshot.counts.completed, 1);
        assert_eq!(snapshot.counts.failed, 1);
        assert_eq!(snapshot.counts.blocked, 1);
        assert_eq!(snapshot.counts.pending, 1);
        assert!(snapshot.running.is_empty());
        assert_eq!(monitor.progress_percentage(), 25.0);

        monitor.finish(SessionState::Done);
        assert_eq!(monitor.snapshot().state, SessionState::Done);
    }

    #[test]
    fn status_report_counts_configured_teams() {
        let config = Config::with_teams(vec![
            TeamSpec::new("alpha", 1),
            TeamSpec::new("bravo", 1),
            TeamSpec::new("charlie", 2),
            TeamSpec::new("delta", 3),
        ]);
        let mut store = StateStore::new(
            Box::new(MemoryBackend::new()),
            Arc::new(SystemClock),
            StoreOptions::default(),
        );
        store.mark_team_complete("alpha");
        store.mark_team_complete("retired_team");
        store.mark_team_failed("bravo", "exit 1");

        let report = StatusReport::collect(&config, &store, vec!["charlie".to_string()]);
        assert_eq!(report.counts.total, 4);
        assert_eq!(report.counts.completed, 1);
        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.counts.running, 1);
        assert_eq!(report.counts.pending, 1);
        assert_eq!(report.percent_complete, 25.0);
        assert_eq!(
            report.failures,
            vec![("bravo".to_string(), "exit 1".to_string())]
        );
    }
}
