// src/task/event.rs

//! Notifications delivered to subscribers, and the structured log shape for
//! task lifecycle events.

use tracing::{error, info, warn};

use crate::exec::Progress;
use crate::task::outcome::{Completion, TaskError};
use crate::task::state::{TaskId, TaskState};

#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub kind: TaskEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEventKind {
    StateChanged { from: TaskState, to: TaskState },
    Progress(Progress),
    /// Last event ever delivered for a task.
    Finished(Completion),
}

impl TaskEvent {
    pub fn state_changed(task_id: TaskId, from: TaskState, to: TaskState) -> Self {
        Self {
            task_id,
            kind: TaskEventKind::StateChanged { from, to },
        }
    }

    pub fn progress(task_id: TaskId, progress: Progress) -> Self {
        Self {
            task_id,
            kind: TaskEventKind::Progress(progress),
        }
    }

    pub fn finished(task_id: TaskId, completion: Completion) -> Self {
        Self {
            task_id,
            kind: TaskEventKind::Finished(completion),
        }
    }
}

/// Emit the structured completion record for a task.
///
/// Cancellation is voluntary and only ever logged at info.
pub(crate) fn log_completion(task_id: TaskId, command: &str, completion: &Completion) {
    let result = completion.result();
    let duration_ms = result.map(|r| r.elapsed.as_millis() as u64);
    let exit_code = result.and_then(|r| r.exit_code);
    let outcome = completion.state().as_str();

    match completion {
        Completion::Succeeded(_) => {
            info!(%task_id, command, duration_ms, exit_code, outcome, "task finished");
        }
        Completion::Cancelled(_) => {
            info!(%task_id, command, duration_ms, exit_code, outcome, "task cancelled");
        }
        Completion::TimedOut(_) => {
            warn!(%task_id, command, duration_ms, exit_code, outcome, "task timed out");
        }
        Completion::Failed(TaskError::Scheduler(msg)) => {
            error!(
                %task_id,
                command,
                outcome,
                error = %msg,
                "task failed with internal scheduler error"
            );
        }
        Completion::Failed(err) => {
            warn!(
                %task_id,
                command,
                duration_ms,
                exit_code,
                outcome,
                error = %err,
                "task failed"
            );
        }
    }
}
