// src/engine/scheduler.rs

//! The task scheduler.
//!
//! Owns the worker pool, the live-task map and the execution-key registry.
//! Both maps sit behind one `std::sync::Mutex` that is only ever held for
//! map updates; it is never held across an `.await`, process I/O, or while
//! taking a task's own lock. Tasks take it from inside their lock when they
//! settle (see `SchedulerInner::retire`).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::dispatch::ResultDispatcher;
use crate::engine::keys::{Admission, ExecutionKey, KeyRegistry};
use crate::engine::pool::WorkerPool;
use crate::engine::submission::Submission;
use crate::errors::{Result, RunlaneError};
use crate::exec::{ProcessBackend, ProcessRunner, RunnerConfig, TaskSpec, DEFAULT_OUTPUT_CAP};
use crate::task::handle::{CancelOutcome, TaskShared};
use crate::task::notify::{Delivery, Listeners};
use crate::task::{Completion, SubscriptionId, TaskEvent, TaskHandle, TaskId};
use crate::types::KeyPolicy;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Scheduler-wide settings. Per-task values on a [`TaskSpec`] always win
/// over the defaults here.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub workers: usize,
    /// Applied to specs without their own timeout. `None` disables it.
    pub default_timeout: Option<Duration>,
    pub output_cap: usize,
    /// Environment overrides added to every task.
    pub env: BTreeMap<String, String>,
    /// Force unbuffered UTF-8 output from children.
    pub unbuffered: bool,
    pub key_policy: KeyPolicy,
    pub runner: RunnerConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            default_timeout: Some(DEFAULT_TIMEOUT),
            output_cap: DEFAULT_OUTPUT_CAP,
            env: BTreeMap::new(),
            unbuffered: true,
            key_policy: KeyPolicy::default(),
            runner: RunnerConfig::default(),
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    live: HashMap<TaskId, Arc<TaskShared>>,
    keys: KeyRegistry<Arc<TaskShared>>,
    closed: bool,
}

pub(crate) struct SchedulerInner {
    config: SchedulerConfig,
    dispatcher: ResultDispatcher,
    listeners: Arc<Listeners>,
    next_id: AtomicU64,
    state: Mutex<SchedulerState>,
    pool: WorkerPool,
}

impl SchedulerInner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn submit(self: &Arc<Self>, spec: TaskSpec, submission: Submission) -> Result<TaskHandle> {
        spec.validate()
            .map_err(|e| RunlaneError::InvalidSpec(e.to_string()))?;

        let spec = spec.with_defaults(
            self.config.default_timeout,
            self.config.output_cap,
            &self.config.env,
            self.config.unbuffered,
        );

        let Submission {
            key,
            policy,
            context,
            on_event,
            on_complete,
        } = submission;
        let policy = policy.unwrap_or(self.config.key_policy);

        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let delivery = Delivery::new(
            self.dispatcher.clone(),
            context,
            on_event,
            self.listeners.clone(),
        );
        let task = TaskShared::new(
            id,
            spec,
            key.clone(),
            delivery,
            on_complete,
            Arc::downgrade(self),
        );

        let dispatch_now = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(RunlaneError::SchedulerClosed);
            }

            let admitted = match &key {
                None => true,
                Some(key) => match state.keys.admit(key, id, policy, task.clone()) {
                    Admission::Acquired => true,
                    Admission::Queued { position } => {
                        info!(task_id = %id, %key, position, "key busy; task queued");
                        false
                    }
                    Admission::Rejected { holder, .. } => {
                        info!(%key, %holder, command = %task.command(), "key busy; submission rejected");
                        return Err(RunlaneError::AlreadyRunning {
                            key: key.to_string(),
                            holder,
                        });
                    }
                },
            };

            state.live.insert(id, task.clone());
            admitted
        };

        debug!(task_id = %id, command = %task.command(), key = ?key.as_ref().map(|k| k.as_str()), "task submitted");

        if dispatch_now {
            if let Err(task) = self.pool.enqueue(task.clone()) {
                task.request_cancel();
                return Err(RunlaneError::SchedulerClosed);
            }
        }

        Ok(TaskHandle::new(task))
    }

    /// Drop the live entry for a settling task and pass its key on.
    ///
    /// Runs under the task's lock, before the terminal state is visible to
    /// waiters or callbacks.
    pub(crate) fn retire(&self, task: &TaskShared) {
        let id = task.id();
        let key = {
            let mut state = self.lock_state();
            state.live.remove(&id);
            task.key().map(|key| {
                state.keys.forget_waiting(key, id);
                key.clone()
            })
        };

        if let Some(key) = key {
            self.release_key(&key, id);
        }
    }

    /// Release `key` held by `id` and start the next waiter. Waiters that
    /// were cancelled while queued are skipped.
    fn release_key(&self, key: &ExecutionKey, id: TaskId) {
        let mut current = id;
        loop {
            let next = self.lock_state().keys.release(key, current);
            let Some((next_id, next)) = next else {
                return;
            };

            if next.state().is_terminal() {
                current = next_id;
                continue;
            }

            match self.pool.enqueue(next) {
                Ok(()) => {
                    debug!(%key, task_id = %next_id, released_by = %current, "key handed to next waiter");
                    return;
                }
                Err(next) => {
                    // Cancelling settles `next`, which retires it and hands
                    // the key further down the queue.
                    warn!(%key, task_id = %next_id, "worker pool closed; cancelling queued task");
                    next.request_cancel();
                    return;
                }
            }
        }
    }

    /// Refuse new work and cancel everything live. Returns how many tasks
    /// were still live.
    fn close(&self) -> usize {
        let tasks: Vec<Arc<TaskShared>> = {
            let mut state = self.lock_state();
            state.closed = true;
            state.keys.drain_waiting();
            state.live.drain().map(|(_, task)| task).collect()
        };

        for task in &tasks {
            task.request_cancel();
        }
        tasks.len()
    }
}

/// Bounded pool of workers executing [`TaskSpec`]s, with results delivered
/// through a [`ResultDispatcher`].
///
/// Must be created inside a Tokio runtime. Dropping the scheduler cancels
/// every live task.
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl TaskScheduler {
    /// Scheduler backed by the real [`ProcessRunner`].
    pub fn new(config: SchedulerConfig, dispatcher: ResultDispatcher) -> Result<Self> {
        let runner = ProcessRunner::new(config.runner);
        Self::with_backend(config, dispatcher, Arc::new(runner))
    }

    pub fn with_backend(
        config: SchedulerConfig,
        dispatcher: ResultDispatcher,
        backend: Arc<dyn ProcessBackend>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| RunlaneError::NoRuntime)?;
        if config.workers == 0 {
            return Err(RunlaneError::ConfigError(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        info!(
            workers = config.workers,
            key_policy = ?config.key_policy,
            default_timeout_ms = config.default_timeout.map(|d| d.as_millis() as u64),
            "task scheduler starting"
        );

        let inner = Arc::new(SchedulerInner {
            pool: WorkerPool::start(config.workers, &runtime, backend),
            config,
            dispatcher,
            listeners: Arc::new(Listeners::default()),
            next_id: AtomicU64::new(0),
            state: Mutex::new(SchedulerState::default()),
        });

        Ok(Self { inner })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &ResultDispatcher {
        &self.inner.dispatcher
    }

    pub fn workers(&self) -> usize {
        self.inner.pool.size()
    }

    /// Enqueue `spec`. With a key already held by a live task, the default
    /// policy rejects with [`RunlaneError::AlreadyRunning`].
    pub fn submit(&self, spec: TaskSpec, key: Option<ExecutionKey>) -> Result<TaskHandle> {
        self.submit_with(spec, Submission::new().maybe_key(key))
    }

    pub fn submit_with(&self, spec: TaskSpec, submission: Submission) -> Result<TaskHandle> {
        self.inner.submit(spec, submission)
    }

    /// Cancel from any thread at any time. Idempotent; false if the task was
    /// already terminal.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        handle.shared().request_cancel() != CancelOutcome::AlreadyTerminal
    }

    /// Cancel a live task by id. False if no such live task.
    pub fn cancel_id(&self, id: TaskId) -> bool {
        let task = self.inner.lock_state().live.get(&id).cloned();
        match task {
            Some(task) => task.request_cancel() != CancelOutcome::AlreadyTerminal,
            None => false,
        }
    }

    /// Cancel every live task. Returns how many were asked to stop.
    pub fn cancel_all(&self) -> usize {
        let tasks: Vec<_> = self.inner.lock_state().live.values().cloned().collect();
        tasks
            .iter()
            .filter(|task| task.request_cancel() != CancelOutcome::AlreadyTerminal)
            .count()
    }

    pub async fn wait(&self, handle: &TaskHandle) -> Completion {
        handle.wait().await
    }

    /// Listen to events of every task. Listeners run on the UI thread.
    pub fn subscribe(
        &self,
        listener: impl Fn(&TaskEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    /// Tasks submitted and not yet terminal.
    pub fn live_count(&self) -> usize {
        self.inner.lock_state().live.len()
    }

    pub fn key_holder(&self, key: &ExecutionKey) -> Option<TaskId> {
        self.inner.lock_state().keys.holder(key)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock_state().closed
    }

    /// Refuse new submissions, cancel all live tasks and wait for the
    /// workers to drain.
    pub async fn shutdown(&self) {
        let cancelled = self.inner.close();
        let workers = self.inner.pool.close();
        info!(cancelled, "task scheduler shutting down");

        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker ended abnormally");
            }
        }
        debug!("task scheduler stopped");
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        let cancelled = self.inner.close();
        self.inner.pool.close();
        if cancelled > 0 {
            debug!(cancelled, "scheduler dropped with live tasks; cancelled them");
        }
    }
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("workers", &self.inner.pool.size())
            .field("live", &self.live_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
