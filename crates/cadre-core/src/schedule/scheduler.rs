//! Scheduler: dispatches eligible tasks to the execution backend and commits
//! their outcomes.
//!
//! One session:
//! 1. Reject the task set up front if any task can never become eligible.
//! 2. Dispatch every eligible task (priority, then configuration order), up
//!    to `execution.max_parallel` in flight.
//! 3. Commit each outcome as it arrives: success is persisted as completed;
//!    failure goes to the failure controller, which retries or gives up.
//! 4. Dependents of a task given up on are blocked for the session.
//!
//! The state store lock is held only while a transition is committed, never
//! while a backend call is awaited.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use super::{DependencyGraph, TaskRecord};
use crate::app::{SchedulerContext, SessionGuard};
use crate::domain::{
    Decision, Outcome, RunId, SessionState, TaskDescriptor, TaskState, WorkflowEvent,
};
use crate::error::{Result, WorkflowError};
use crate::ports::TaskExecutor;
use crate::store::document::list_value;
use crate::store::{Document, keys};

/// What a finished session did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: RunId,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Completed this session, in completion order.
    pub completed: Vec<String>,
    /// Given up on this session, with the last error.
    pub failed: Vec<(String, String)>,
    /// Not run because a prerequisite failed.
    pub blocked: Vec<String>,
    /// Never dispatched because the session aborted.
    pub not_started: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Done && self.failed.is_empty() && self.blocked.is_empty()
    }

    /// `Err(TaskExecution)` naming the first failed task when anything failed.
    pub fn into_result(self) -> Result<Self> {
        match self.failed.first() {
            None => Ok(self),
            Some((team, detail)) => {
                let detail = if self.failed.len() > 1 {
                    format!("{detail} (and {} more failed)", self.failed.len() - 1)
                } else {
                    detail.clone()
                };
                Err(WorkflowError::TaskExecution {
                    team: team.clone(),
                    detail,
                })
            }
        }
    }
}

/// Runs one scheduling session over a task set.
pub struct Scheduler<'a> {
    ctx: &'a SchedulerContext,
}

struct Session {
    graph: DependencyGraph,
    records: HashMap<String, TaskRecord>,
    /// Ids in configuration order.
    order: Vec<String>,
    completed: HashSet<String>,
    phase_open: BTreeMap<u32, usize>,
    in_flight: HashMap<Id, String>,
    join_set: JoinSet<(String, Outcome)>,
    report: RunReport,
    aborted: bool,
    started: Instant,
}

impl<'a> Scheduler<'a> {
    pub fn new(ctx: &'a SchedulerContext) -> Self {
        Self { ctx }
    }

    /// Run `tasks` to completion (or abort).
    ///
    /// Tasks already completed in the run state are skipped. Returns
    /// `DependencyCycle` before dispatching anything when some task can
    /// never become eligible.
    pub async fn run(&self, tasks: Vec<TaskDescriptor>) -> Result<RunReport> {
        let guard = self.ctx.begin_session()?;
        self.run_claimed(guard, tasks).await
    }

    /// `run` for a caller that already holds the session flag, so nothing
    /// can slip in between its own preparation and the session.
    pub(crate) async fn run_claimed(
        &self,
        _guard: SessionGuard,
        tasks: Vec<TaskDescriptor>,
    ) -> Result<RunReport> {
        let completed: HashSet<String> = self
            .ctx
            .store()
            .lock()
            .await
            .completed_teams()
            .into_iter()
            .collect();
        let tasks: Vec<TaskDescriptor> = tasks
            .into_iter()
            .filter(|t| !completed.contains(&t.id))
            .collect();

        let graph = DependencyGraph::from_tasks(&tasks);
        let stuck = graph.unresolved(&completed);
        if !stuck.is_empty() {
            if let Some(cycle) = graph.detect_cycle() {
                error!(cycle = %cycle.join(" -> "), "dependency cycle");
            }
            error!(stuck = ?stuck, "tasks can never become eligible, nothing dispatched");
            return Err(WorkflowError::DependencyCycle { stuck });
        }

        let run_id = self.ctx.ids().generate_run_id();
        let mut session = Session::new(run_id, graph, tasks, completed);

        info!(run_id = %run_id, tasks = session.order.len(), "scheduling session started");
        self.ctx.emit(WorkflowEvent::SessionStarted {
            run_id,
            total: session.order.len(),
        });
        self.ctx.monitor().start(session.order.len());
        {
            let mut store = self.ctx.store().lock().await;
            store.set_run_id(Some(run_id));
            if let Some(phase) = session.lowest_open_phase() {
                store.set(keys::CURRENT_PHASE, Value::from(phase));
            }
        }

        let result = self.drive(&mut session).await;

        self.ctx.store().lock().await.set_run_id(None);
        let state = match &result {
            Ok(()) if session.aborted => SessionState::Aborted,
            Ok(()) => SessionState::Done,
            Err(_) => SessionState::Aborted,
        };
        self.ctx.monitor().finish(state);
        result?;

        session.report.state = state;
        session.report.duration = session.started.elapsed();
        session.report.not_started = session.ids_in(TaskState::Pending);
        self.ctx.emit(WorkflowEvent::SessionFinished {
            run_id,
            state,
            completed: session.report.completed.len(),
            failed: session.report.failed.len(),
        });
        info!(
            run_id = %run_id,
            state = ?state,
            completed = session.report.completed.len(),
            failed = session.report.failed.len(),
            blocked = session.report.blocked.len(),
            "scheduling session finished"
        );
        Ok(session.report)
    }

    async fn drive(&self, session: &mut Session) -> Result<()> {
        let max_parallel = self
            .ctx
            .config()
            .execution
            .max_parallel
            .unwrap_or(usize::MAX);

        loop {
            if !session.aborted {
                self.dispatch_eligible(session, max_parallel);
            }

            if session.join_set.is_empty() {
                let pending = session.ids_in(TaskState::Pending);
                if pending.is_empty() || session.aborted {
                    return Ok(());
                }
                error!(stuck = ?pending, "no task eligible and none running");
                return Err(WorkflowError::DependencyCycle { stuck: pending });
            }

            let Some(joined) = session.join_set.join_next_with_id().await else {
                continue;
            };
            let (team, outcome) = match joined {
                Ok((id, (team, outcome))) => {
                    session.in_flight.remove(&id);
                    (team, outcome)
                }
                Err(join_error) => {
                    let Some(team) = session.in_flight.remove(&join_error.id()) else {
                        warn!(error = %join_error, "unknown backend task ended abnormally");
                        continue;
                    };
                    let detail = format!("backend task ended abnormally: {join_error}");
                    (team, Outcome::failure(detail))
                }
            };

            if outcome.is_success() {
                self.commit_success(session, &team).await;
            } else {
                self.commit_failure(session, &team, outcome).await;
            }
        }
    }

    fn dispatch_eligible(&self, session: &mut Session, max_parallel: usize) {
        let mut eligible: Vec<&TaskDescriptor> = session
            .records
            .values()
            .filter(|r| r.state.is_pending() && r.descriptor.is_eligible(&session.completed))
            .map(|r| &r.descriptor)
            .collect();
        eligible.sort_by(|a, b| a.dispatch_cmp(b));
        let batch: Vec<String> = eligible.into_iter().map(|t| t.id.clone()).collect();

        for team in batch {
            if session.join_set.len() >= max_parallel {
                break;
            }
            let Some(record) = session.records.get_mut(&team) else {
                continue;
            };
            record.mark_eligible();
            record.start_attempt();
            let descriptor = record.descriptor.clone();
            let attempt = record.attempts;

            debug!(team = %team, priority = descriptor.priority, attempt, "dispatching task");
            self.ctx.emit(WorkflowEvent::TaskDispatched {
                team: team.clone(),
                phase: descriptor.phase,
                attempt,
            });
            self.ctx.monitor().dispatched(&team);
            session.spawn(self.ctx.executor(), descriptor, Duration::ZERO);
        }
    }

    async fn commit_success(&self, session: &mut Session, team: &str) {
        let Some(record) = session.records.get_mut(team) else {
            return;
        };
        record.mark_completed();
        let phase = record.descriptor.phase;
        session.completed.insert(team.to_string());
        session.report.completed.push(team.to_string());

        let phase_done = match session.phase_open.get_mut(&phase) {
            Some(open) => {
                *open = open.saturating_sub(1);
                *open == 0
            }
            None => false,
        };

        let checkpoint = {
            let mut store = self.ctx.store().lock().await;
            store.mark_team_complete(team);
            if phase_done {
                let name = format!("phase-{phase}-complete");
                let mut data = Document::new();
                data.insert(
                    keys::COMPLETED_TEAMS.to_string(),
                    list_value(store.completed_teams()),
                );
                let current = session.lowest_open_phase().unwrap_or(phase);
                data.insert(keys::CURRENT_PHASE.to_string(), Value::from(current));
                store.checkpoint(&name, data);
                Some(name)
            } else {
                None
            }
        };

        info!(team = %team, "task completed");
        self.ctx.emit(WorkflowEvent::TaskCompleted {
            team: team.to_string(),
        });
        self.ctx.monitor().completed(team);
        if let Some(name) = checkpoint {
            info!(checkpoint = %name, "phase checkpoint written");
            self.ctx.emit(WorkflowEvent::CheckpointWritten { name });
        }
    }

    async fn commit_failure(&self, session: &mut Session, team: &str, outcome: Outcome) {
        let Some(record) = session.records.get_mut(team) else {
            return;
        };
        let error = if outcome.detail.is_empty() {
            "task failed without detail".to_string()
        } else {
            outcome.detail.clone()
        };

        let reason = match self.ctx.failure().decide(record, &outcome) {
            Decision::Retry { reason, .. } if session.aborted => {
                format!("session aborted, dropping {reason}")
            }
            Decision::Retry { delay, reason } => {
                record.schedule_retry(error.clone());
                let attempt = record.attempts;
                let descriptor = record.descriptor.clone();
                warn!(
                    team = %team,
                    error = %error,
                    attempt,
                    ?delay,
                    %reason,
                    "task failed, retrying"
                );
                self.ctx.emit(WorkflowEvent::RetryScheduled {
                    team: team.to_string(),
                    attempt,
                    delay,
                });
                session.spawn(self.ctx.executor(), descriptor, delay);
                return;
            }
            Decision::Continue { reason } => reason,
            Decision::Abort { reason } => {
                session.aborted = true;
                reason
            }
        };

        record.mark_failed(error.clone());
        session.report.failed.push((team.to_string(), error.clone()));
        let rollback = {
            let mut store = self.ctx.store().lock().await;
            store.mark_team_failed(team, &error);
            self.ctx
                .failure()
                .rollback_signal(team, &store.completed_teams())
        };

        error!(team = %team, error = %error, %reason, "task failed");
        self.ctx.emit(WorkflowEvent::TaskFailed {
            team: team.to_string(),
            error,
        });
        self.ctx.monitor().failed(team);
        if let Some(event) = rollback {
            self.ctx.emit(event);
        }

        for dependent in session.graph.transitive_dependents(team) {
            let Some(record) = session.records.get_mut(&dependent) else {
                continue;
            };
            if !record.state.is_pending() {
                continue;
            }
            record.mark_blocked(format!("dependency '{team}' failed"));
            session.report.blocked.push(dependent.clone());
            warn!(team = %dependent, cause = %team, "task blocked");
            self.ctx.emit(WorkflowEvent::TaskBlocked {
                team: dependent,
                cause: team.to_string(),
            });
            self.ctx.monitor().blocked();
        }

        if session.aborted {
            warn!(
                team = %team,
                in_flight = session.join_set.len(),
                "aborting session, waiting for in-flight tasks"
            );
        }
    }
}

impl Session {
    fn new(
        run_id: RunId,
        graph: DependencyGraph,
        tasks: Vec<TaskDescriptor>,
        completed: HashSet<String>,
    ) -> Self {
        let order: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let mut phase_open: BTreeMap<u32, usize> = BTreeMap::new();
        for task in &tasks {
            *phase_open.entry(task.phase).or_default() += 1;
        }
        let records = tasks
            .into_iter()
            .map(|t| (t.id.clone(), TaskRecord::new(t)))
            .collect();

        Self {
            graph,
            records,
            order,
            completed,
            phase_open,
            in_flight: HashMap::new(),
            join_set: JoinSet::new(),
            report: RunReport {
                run_id,
                state: SessionState::InProgress,
                started_at: Utc::now(),
                duration: Duration::ZERO,
                completed: Vec::new(),
                failed: Vec::new(),
                blocked: Vec::new(),
                not_started: Vec::new(),
            },
            aborted: false,
            started: Instant::now(),
        }
    }

    fn spawn(&mut self, executor: Arc<dyn TaskExecutor>, task: TaskDescriptor, delay: Duration) {
        let team = task.id.clone();
        let handle = self.join_set.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcome = executor.execute(&task).await;
            (task.id, outcome)
        });
        self.in_flight.insert(handle.id(), team);
    }

    fn ids_in(&self, state: TaskState) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.records.get(*id).is_some_and(|r| r.state == state))
            .cloned()
            .collect()
    }

    /// Lowest phase with a task that has not finished this session.
    fn lowest_open_phase(&self) -> Option<u32> {
        self.phase_open
            .iter()
            .find(|(_, open)| **open > 0)
            .map(|(phase, _)| *phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TeamSpec;
    use crate::schedule::TaskGraphBuilder;
    use crate::store::HISTORY_CAPACITY;
    use crate::testing::{ScriptedExecutor, context, sample_teams, test_config};
    use tokio::sync::broadcast::Receiver;

    fn tasks(ctx: &SchedulerContext) -> Vec<TaskDescriptor> {
        TaskGraphBuilder::from_config(ctx.config())
            .build(&HashSet::new())
            .unwrap()
    }

    fn drain(rx: &mut Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn runs_sample_build_out_in_dependency_order() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (ctx, backend) = context(test_config(sample_teams()), executor.clone());
        let mut rx = ctx.subscribe();

        let report = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 4);
        let first_wave: HashSet<&str> = calls[..2].iter().map(String::as_str).collect();
        assert_eq!(first_wave, HashSet::from(["alpha", "bravo"]));
        assert_eq!(&calls[2..], &["charlie".to_string(), "delta".to_string()]);

        assert_eq!(report.state, SessionState::Done);
        assert!(report.is_success());
        assert_eq!(report.completed.len(), 4);

        let store = ctx.store().lock().await;
        let completed: HashSet<String> = store.completed_teams().into_iter().collect();
        assert_eq!(completed.len(), 4);
        assert!(store.failed_teams().is_empty());
        let checkpoints = store.list_checkpoints();
        for name in ["phase-1-complete", "phase-2-complete", "phase-3-complete"] {
            assert!(checkpoints.contains(&name.to_string()), "{name} missing");
        }
        assert!(store.current().get(keys::RUN_ID).is_some());
        drop(store);

        let persisted = backend.snapshot().unwrap();
        assert_eq!(
            crate::store::document::string_list(&persisted.current, keys::COMPLETED_TEAMS).len(),
            4
        );
        assert!(persisted.history.len() <= HISTORY_CAPACITY);

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(WorkflowEvent::SessionStarted { total: 4, .. })));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::SessionFinished {
                state: SessionState::Done,
                completed: 4,
                failed: 0,
                ..
            })
        ));
        assert!(!ctx.is_session_active());
    }

    #[tokio::test]
    async fn two_phase_build_out_runs_to_completion() {
        let executor = Arc::new(ScriptedExecutor::new());
        let config = test_config(vec![
            TeamSpec::new("alpha", 1),
            TeamSpec::new("bravo", 1),
            TeamSpec::new("charlie", 2).with_dependencies(["alpha", "bravo"]),
            TeamSpec::new("delta", 2).with_dependencies(["charlie"]),
        ]);
        let (ctx, _) = context(config, executor.clone());

        let report = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        let calls = executor.calls();
        let first_wave: HashSet<&str> = calls[..2].iter().map(String::as_str).collect();
        assert_eq!(first_wave, HashSet::from(["alpha", "bravo"]));
        assert_eq!(&calls[2..], &["charlie".to_string(), "delta".to_string()]);
        assert_eq!(report.state, SessionState::Done);

        let store = ctx.store().lock().await;
        let completed: HashSet<String> = store.completed_teams().into_iter().collect();
        assert_eq!(
            completed,
            HashSet::from(["alpha", "bravo", "charlie", "delta"].map(String::from))
        );
        assert!(store.failed_teams().is_empty());
        assert_eq!(
            store.list_checkpoints(),
            vec!["phase-2-complete".to_string(), "phase-1-complete".to_string()]
        );
    }

    #[tokio::test]
    async fn completed_and_failed_never_shrink_between_saves() {
        let executor = Arc::new(ScriptedExecutor::new().failing("charlie"));
        let mut teams = sample_teams();
        teams.push(TeamSpec::new("echo", 2).with_dependencies(["alpha"]));
        let (ctx, _) = context(test_config(teams), executor);

        Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        let store = ctx.store().lock().await;
        let mut snapshots = store.history(HISTORY_CAPACITY);
        snapshots.push(store.current().clone());
        assert!(snapshots.len() > 4);

        let set = |doc: &Document, key: &str| -> HashSet<String> {
            crate::store::document::string_list(doc, key)
                .into_iter()
                .collect()
        };
        for pair in snapshots.windows(2) {
            for key in [keys::COMPLETED_TEAMS, keys::FAILED_TEAMS] {
                assert!(
                    set(&pair[0], key).is_subset(&set(&pair[1], key)),
                    "{key} shrank between saves"
                );
            }
        }
        assert_eq!(set(store.current(), keys::FAILED_TEAMS).len(), 1);
    }

    #[tokio::test]
    async fn dispatch_follows_priority_then_configuration_order() {
        let executor = Arc::new(ScriptedExecutor::new());
        let mut config = test_config(vec![
            TeamSpec::new("late", 3),
            TeamSpec::new("alpha", 1),
            TeamSpec::new("bravo", 1),
            TeamSpec::new("middle", 2),
        ]);
        config.execution.max_parallel = Some(1);
        let (ctx, _) = context(config, executor.clone());

        Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        assert_eq!(executor.calls(), vec!["alpha", "bravo", "middle", "late"]);
    }

    #[tokio::test]
    async fn cycle_fails_before_anything_runs() {
        let executor = Arc::new(ScriptedExecutor::new());
        let config = test_config(vec![
            TeamSpec::new("a", 1).with_dependencies(["b"]),
            TeamSpec::new("b", 1).with_dependencies(["a"]),
            TeamSpec::new("c", 1),
        ]);
        let (ctx, _) = context(config, executor.clone());

        let err = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap_err();

        match err {
            WorkflowError::DependencyCycle { stuck } => assert_eq!(stuck, vec!["a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(executor.calls().is_empty());
        assert!(ctx.store().lock().await.completed_teams().is_empty());
        assert!(!ctx.is_session_active());
    }

    #[tokio::test]
    async fn unknown_dependency_is_unsatisfiable() {
        let executor = Arc::new(ScriptedExecutor::new());
        let config = test_config(vec![TeamSpec::new("a", 1).with_dependencies(["ghost"])]);
        let (ctx, _) = context(config, executor.clone());

        let err = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap_err();
        assert!(matches!(err, WorkflowError::DependencyCycle { stuck } if stuck == vec!["a"]));
    }

    #[tokio::test]
    async fn failure_blocks_only_its_subtree() {
        let executor = Arc::new(ScriptedExecutor::new().failing("charlie"));
        let mut teams = sample_teams();
        teams.push(TeamSpec::new("echo", 2).with_dependencies(["alpha"]));
        let (ctx, _) = context(test_config(teams), executor.clone());
        let mut rx = ctx.subscribe();

        let report = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        assert_eq!(report.state, SessionState::Done);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "charlie");
        assert_eq!(report.blocked, vec!["delta"]);
        assert!(report.completed.contains(&"echo".to_string()));
        assert!(!executor.called().contains("delta"));

        let store = ctx.store().lock().await;
        assert_eq!(store.failed_teams(), vec!["charlie".to_string()]);
        assert_eq!(
            store.team_error("charlie").as_deref(),
            Some("charlie attempt 1 failed")
        );
        assert!(!store.is_team_completed("charlie"));
        drop(store);

        let events = drain(&mut rx);
        assert!(events.contains(&WorkflowEvent::TaskBlocked {
            team: "delta".to_string(),
            cause: "charlie".to_string(),
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            WorkflowEvent::RollbackSignal { failed_team, .. } if failed_team == "charlie"
        )));

        match report.into_result() {
            Err(WorkflowError::TaskExecution { team, .. }) => assert_eq!(team, "charlie"),
            other => panic!("expected task execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn abort_waits_for_in_flight_tasks_and_dispatches_nothing_new() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .failing("alpha")
                .slow("bravo", Duration::from_millis(50)),
        );
        let mut config = test_config(vec![
            TeamSpec::new("alpha", 1),
            TeamSpec::new("bravo", 1),
            TeamSpec::new("charlie", 2).with_dependencies(["bravo"]),
        ]);
        config.error_handling.abort_on_failure = true;
        let (ctx, _) = context(config, executor.clone());

        let report = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        assert_eq!(report.state, SessionState::Aborted);
        assert_eq!(report.completed, vec!["bravo"]);
        assert_eq!(report.not_started, vec!["charlie"]);
        assert!(!executor.called().contains("charlie"));
        assert!(ctx.store().lock().await.is_team_completed("bravo"));
    }

    #[tokio::test]
    async fn no_retry_is_dispatched_after_an_abort() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .failing("alpha")
                .flaky("bravo", 1)
                .slow("bravo", Duration::from_millis(80)),
        );
        let mut config = test_config(vec![TeamSpec::new("alpha", 1), TeamSpec::new("bravo", 1)]);
        config.error_handling.abort_on_failure = true;
        config.error_handling.max_attempts = 2;
        let (ctx, _) = context(config, executor.clone());

        let report = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        assert_eq!(report.state, SessionState::Aborted);
        assert_eq!(executor.calls(), vec!["alpha", "bravo", "alpha"]);
        let failed: Vec<&str> = report.failed.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(failed, vec!["alpha", "bravo"]);
        assert!(report.completed.is_empty());
        assert!(ctx.store().lock().await.is_team_failed("bravo"));
    }

    #[tokio::test]
    async fn retries_until_success_without_recording_failure() {
        let executor = Arc::new(ScriptedExecutor::new().flaky("charlie", 1));
        let mut config = test_config(sample_teams());
        config.error_handling.max_attempts = 2;
        let (ctx, _) = context(config, executor.clone());
        let mut rx = ctx.subscribe();

        let report = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        assert!(report.is_success());
        let charlie_calls = executor.calls().iter().filter(|c| *c == "charlie").count();
        assert_eq!(charlie_calls, 2);
        assert!(ctx.store().lock().await.failed_teams().is_empty());
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            WorkflowEvent::RetryScheduled { team, attempt: 2, .. } if team == "charlie"
        )));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let executor = Arc::new(ScriptedExecutor::new().failing("alpha"));
        let mut config = test_config(vec![TeamSpec::new("alpha", 1)]);
        config.error_handling.max_attempts = 3;
        let (ctx, _) = context(config, executor.clone());

        let report = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        assert_eq!(executor.calls().len(), 3);
        assert_eq!(
            report.failed,
            vec![("alpha".to_string(), "alpha attempt 3 failed".to_string())]
        );
    }

    #[tokio::test]
    async fn max_parallel_caps_in_flight_tasks() {
        let teams: Vec<TeamSpec> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| TeamSpec::new(*id, 1))
            .collect();

        let executor = Arc::new(ScriptedExecutor::new());
        let mut config = test_config(teams.clone());
        config.execution.max_parallel = Some(2);
        let (ctx, _) = context(config, executor.clone());
        Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();
        assert_eq!(executor.peak_in_flight(), 2);

        let executor = Arc::new(ScriptedExecutor::new());
        let (ctx, _) = context(test_config(teams), executor.clone());
        Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();
        assert_eq!(executor.peak_in_flight(), 4);
    }

    #[tokio::test]
    async fn completed_tasks_are_not_run_again() {
        let executor = Arc::new(ScriptedExecutor::new());
        let (ctx, _) = context(test_config(sample_teams()), executor.clone());
        ctx.store()
            .lock()
            .await
            .mark_teams_complete(["alpha", "bravo"]);

        let report = Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        assert_eq!(executor.calls(), vec!["charlie", "delta"]);
        assert_eq!(report.completed, vec!["charlie", "delta"]);
    }

    #[tokio::test]
    async fn every_commit_is_persisted() {
        let executor = Arc::new(ScriptedExecutor::new().failing("delta"));
        let (ctx, backend) = context(test_config(sample_teams()), executor);

        Scheduler::new(&ctx).run(tasks(&ctx)).await.unwrap();

        let persisted = backend.snapshot().unwrap();
        let completed =
            crate::store::document::string_list(&persisted.current, keys::COMPLETED_TEAMS);
        let failed = crate::store::document::string_list(&persisted.current, keys::FAILED_TEAMS);
        assert_eq!(completed.len(), 3);
        assert_eq!(failed, vec!["delta"]);
        assert!(completed.iter().all(|c| !failed.contains(c)));
    }

    #[tokio::test]
    async fn a_second_session_is_rejected_while_one_runs() {
        let executor = Arc::new(ScriptedExecutor::new().slow("alpha", Duration::from_millis(50)));
        let (ctx, _) = context(test_config(vec![TeamSpec::new("alpha", 1)]), executor);
        let ctx = Arc::new(ctx);

        let first = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                let tasks = tasks(&ctx);
                Scheduler::new(&ctx).run(tasks).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = Scheduler::new(&ctx).run(tasks(&ctx)).await;
        assert!(matches!(second, Err(WorkflowError::SessionActive(_))));
        assert!(first.await.unwrap().is_ok());
    }
}
