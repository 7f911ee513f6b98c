// src/task/handle.rs

//! Per-task shared record and the caller-facing [`TaskHandle`].
//!
//! Every transition, progress report and event post for a task happens
//! while holding that task's lock. Since the dispatcher queue is FIFO, this
//! is what keeps a task's notifications in order on the UI thread.
//!
//! Lock order is task lock, then scheduler state. A settling task leaves the
//! scheduler (live entry and execution key) before its terminal state is
//! published, so anything woken by the completion can reuse the key.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::engine::keys::ExecutionKey;
use crate::engine::scheduler::SchedulerInner;
use crate::exec::{LineObserver, Progress, TaskSpec};
use crate::task::event::{log_completion, TaskEvent};
use crate::task::notify::{CompletionCallback, Delivery};
use crate::task::outcome::{Completion, TaskError};
use crate::task::state::{TaskId, TaskState};

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelOutcome {
    /// The task never ran and is now `Cancelled`.
    CancelledPending,
    /// The running process has been asked to stop.
    Signalled,
    /// The task had already been asked to stop.
    AlreadyRequested,
    AlreadyTerminal,
}

struct TaskInner {
    state: TaskState,
    progress: Option<Progress>,
    completion: Option<Completion>,
    on_complete: Option<CompletionCallback>,
}

pub(crate) struct TaskShared {
    id: TaskId,
    spec: TaskSpec,
    command: String,
    key: Option<ExecutionKey>,
    created_at: SystemTime,
    created: Instant,
    cancel: CancellationToken,
    /// Raised on cancel; pending update envelopes are dropped once set.
    stale: Arc<AtomicBool>,
    inner: Mutex<TaskInner>,
    settled: Condvar,
    state_tx: watch::Sender<TaskState>,
    delivery: Delivery,
    scheduler: Weak<SchedulerInner>,
}

impl TaskShared {
    pub(crate) fn new(
        id: TaskId,
        spec: TaskSpec,
        key: Option<ExecutionKey>,
        delivery: Delivery,
        on_complete: Option<CompletionCallback>,
        scheduler: Weak<SchedulerInner>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(TaskState::Pending);
        Arc::new(Self {
            id,
            command: spec.command_line(),
            spec,
            key,
            created_at: SystemTime::now(),
            created: Instant::now(),
            cancel: CancellationToken::new(),
            stale: Arc::new(AtomicBool::new(false)),
            inner: Mutex::new(TaskInner {
                state: TaskState::Pending,
                progress: None,
                completion: None,
                on_complete,
            }),
            settled: Condvar::new(),
            state_tx,
            delivery,
            scheduler,
        })
    }

    fn lock(&self) -> MutexGuard<'_, TaskInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub(crate) fn command(&self) -> &str {
        &self.command
    }

    pub(crate) fn key(&self) -> Option<&ExecutionKey> {
        self.key.as_ref()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn state(&self) -> TaskState {
        self.lock().state
    }

    pub(crate) fn completion(&self) -> Option<Completion> {
        self.lock().completion.clone()
    }

    /// `Pending -> Running`. False if the task was cancelled first, in
    /// which case the caller must not launch anything.
    pub(crate) fn begin(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != TaskState::Pending {
            return false;
        }
        self.advance(&mut inner, TaskState::Running);
        true
    }

    /// Move to the terminal state matching `completion`. Refused (and
    /// logged) if the task is already terminal.
    pub(crate) fn finish(&self, completion: Completion) -> bool {
        let mut inner = self.lock();
        self.settle(&mut inner, completion)
    }

    pub(crate) fn request_cancel(&self) -> CancelOutcome {
        let mut inner = self.lock();
        match inner.state {
            TaskState::Pending => {
                self.stale.store(true, Ordering::SeqCst);
                self.cancel.cancel();
                self.settle(&mut inner, Completion::Cancelled(None));
                CancelOutcome::CancelledPending
            }
            TaskState::Running if self.cancel.is_cancelled() => CancelOutcome::AlreadyRequested,
            TaskState::Running => {
                self.stale.store(true, Ordering::SeqCst);
                self.cancel.cancel();
                debug!(task_id = %self.id, command = %self.command, "cancel requested for running task");
                CancelOutcome::Signalled
            }
            _ => CancelOutcome::AlreadyTerminal,
        }
    }

    pub(crate) fn report_progress(&self, progress: Progress) {
        let mut inner = self.lock();
        if inner.state != TaskState::Running {
            return;
        }
        trace!(task_id = %self.id, ?progress, "progress");
        inner.progress = Some(progress.clone());
        self.delivery
            .post_update(TaskEvent::progress(self.id, progress), &self.stale);
    }

    /// Observer feeding matched output lines into progress reports, if the
    /// spec declares a progress pattern.
    pub(crate) fn line_observer(self: &Arc<Self>) -> Option<LineObserver> {
        let pattern = self.spec.progress_pattern()?.clone();
        let task = Arc::downgrade(self);
        Some(Arc::new(move |stream, line| {
            if let (Some(progress), Some(task)) = (pattern.parse(stream, line), task.upgrade()) {
                task.report_progress(progress);
            }
        }))
    }

    fn advance(&self, inner: &mut TaskInner, to: TaskState) {
        let from = inner.state;
        inner.state = to;
        debug!(task_id = %self.id, %from, %to, "task state changed");
        self.delivery
            .post_update(TaskEvent::state_changed(self.id, from, to), &self.stale);
        self.state_tx.send_replace(to);
    }

    fn settle(&self, inner: &mut TaskInner, completion: Completion) -> bool {
        let from = inner.state;
        let to = completion.state();
        if !from.can_transition_to(to) {
            debug!(task_id = %self.id, %from, %to, "ignoring transition out of terminal state");
            return false;
        }

        inner.state = to;
        inner.completion = Some(completion.clone());
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.retire(self);
        }
        log_completion(self.id, &self.command, &completion);

        self.delivery.post_final(
            TaskEvent::state_changed(self.id, from, to),
            completion,
            inner.on_complete.take(),
        );
        self.state_tx.send_replace(to);
        self.settled.notify_all();
        true
    }
}

impl fmt::Debug for TaskShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskShared")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("key", &self.key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Caller's view of one submitted task. Cheap to clone.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub(crate) fn new(shared: Arc<TaskShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<TaskShared> {
        &self.shared
    }

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn created_at(&self) -> SystemTime {
        self.shared.created_at
    }

    pub fn age(&self) -> Duration {
        self.shared.created.elapsed()
    }

    pub fn key(&self) -> Option<&ExecutionKey> {
        self.shared.key()
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.shared.spec
    }

    pub fn command_line(&self) -> &str {
        &self.shared.command
    }

    /// Latest progress report, if any arrived while running.
    pub fn progress(&self) -> Option<Progress> {
        self.shared.lock().progress.clone()
    }

    /// Final outcome once terminal.
    pub fn completion(&self) -> Option<Completion> {
        self.shared.completion()
    }

    /// Request cancellation. A pending task is cancelled without ever
    /// launching; a running one has its process terminated. No-op on a
    /// terminal task. Returns false in that case.
    pub fn cancel(&self) -> bool {
        self.shared.request_cancel() != CancelOutcome::AlreadyTerminal
    }

    /// Resolve once the task is terminal. Never blocks the executor.
    pub async fn wait(&self) -> Completion {
        let mut rx = self.shared.state_tx.subscribe();
        if rx.wait_for(|s| s.is_terminal()).await.is_err() {
            return Completion::scheduler_fault("task state channel closed");
        }
        self.settled_completion()
    }

    /// Block the calling thread until the task is terminal.
    ///
    /// Must not be called from the UI thread or from inside an async task.
    pub fn wait_blocking(&self) -> Completion {
        let mut inner = self.shared.lock();
        loop {
            if let Some(c) = &inner.completion {
                return c.clone();
            }
            inner = self
                .shared
                .settled
                .wait(inner)
                .unwrap_or_else(|p| p.into_inner());
        }
    }

    /// Like [`wait_blocking`](Self::wait_blocking) with an upper bound.
    pub fn wait_blocking_timeout(&self, limit: Duration) -> Option<Completion> {
        let deadline = Instant::now() + limit;
        let mut inner = self.shared.lock();
        loop {
            if let Some(c) = &inner.completion {
                return Some(c.clone());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, _) = self
                .shared
                .settled
                .wait_timeout(inner, remaining)
                .unwrap_or_else(|p| p.into_inner());
            inner = guard;
        }
    }

    /// Watch state changes without going through the UI dispatcher.
    pub fn subscribe_state(&self) -> watch::Receiver<TaskState> {
        self.shared.state_tx.subscribe()
    }

    fn settled_completion(&self) -> Completion {
        self.shared.completion().unwrap_or_else(|| {
            Completion::Failed(TaskError::Scheduler(
                "terminal task has no recorded outcome".to_string(),
            ))
        })
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("command", &self.command_line())
            .finish()
    }
}
