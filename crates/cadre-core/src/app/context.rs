//! SchedulerContext - everything a scheduling session needs, threaded
//! explicitly through the orchestrator, the scheduler and the failure
//! controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast};

use super::failure::FailureController;
use crate::config::Config;
use crate::domain::WorkflowEvent;
use crate::error::{Result, WorkflowError};
use crate::observability::SessionMonitor;
use crate::ports::{IdGenerator, TaskExecutor};
use crate::store::StateStore;

/// Capacity of the event channel. Slow subscribers lag, they never block
/// the scheduler.
pub const EVENT_CAPACITY: usize = 1024;

pub struct SchedulerContext {
    config: Arc<Config>,
    store: Arc<Mutex<StateStore>>,
    executor: Arc<dyn TaskExecutor>,
    failure: FailureController,
    events: broadcast::Sender<WorkflowEvent>,
    ids: Arc<dyn IdGenerator>,
    monitor: SessionMonitor,
    session_active: Arc<AtomicBool>,
}

impl SchedulerContext {
    pub(crate) fn new(
        config: Arc<Config>,
        store: StateStore,
        executor: Arc<dyn TaskExecutor>,
        failure: FailureController,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            store: Arc::new(Mutex::new(store)),
            executor,
            failure,
            events,
            ids,
            monitor: SessionMonitor::new(),
            session_active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The run state. Hold the lock only while committing a transition.
    pub fn store(&self) -> &Arc<Mutex<StateStore>> {
        &self.store
    }

    pub fn executor(&self) -> Arc<dyn TaskExecutor> {
        Arc::clone(&self.executor)
    }

    pub fn failure(&self) -> &FailureController {
        &self.failure
    }

    pub fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Broadcast an event. Having no subscriber is fine.
    pub fn emit(&self, event: WorkflowEvent) {
        let _ = self.events.send(event);
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }

    /// Mark a session as running until the guard is dropped.
    pub fn begin_session(&self) -> Result<SessionGuard> {
        self.claim("starting another session")
    }

    /// Hold the session flag for the whole of `operation`. Rejected while a
    /// session or another recovery operation holds it.
    pub fn claim(&self, operation: &'static str) -> Result<SessionGuard> {
        self.session_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| WorkflowError::SessionActive(operation))?;
        Ok(SessionGuard {
            flag: Arc::clone(&self.session_active),
        })
    }
}

/// Clears the session flag on drop, including on early return.
#[derive(Debug)]
pub struct SessionGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
