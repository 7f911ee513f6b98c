// src/task/outcome.rs

//! Terminal outcomes and the caller-facing error taxonomy.
//!
//! [`Completion`] is what a finished task resolves to. Cancellation is a
//! first-class variant rather than an error, so catch-all error handling
//! cannot mistake a voluntary stop for a failure. Callers that prefer `?`
//! can convert with [`Completion::into_result`].

use std::time::Duration;

use thiserror::Error;

use crate::exec::{ExecError, ProcessResult, TaskSpec, Termination};
use crate::task::state::TaskState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The runner could not launch or supervise the process. No retry is
    /// attempted by the core.
    #[error("process could not be run: {0}")]
    Spawn(ExecError),

    #[error("timed out after {elapsed:?}")]
    Timeout {
        elapsed: Duration,
        result: Box<ProcessResult>,
    },

    #[error("cancelled")]
    Cancelled { result: Option<Box<ProcessResult>> },

    #[error("{}", describe_exit(*code, *signal))]
    NonZeroExit {
        code: Option<i32>,
        signal: Option<i32>,
        stderr: String,
        result: Box<ProcessResult>,
    },

    /// Internal fault unrelated to the subprocess (e.g. a panicking
    /// backend). Always logged at error level.
    #[error("internal scheduler error: {0}")]
    Scheduler(String),
}

fn describe_exit(code: Option<i32>, signal: Option<i32>) -> String {
    match (code, signal) {
        (Some(c), _) => format!("process exited with code {c}"),
        (None, Some(s)) => format!("process terminated by signal {s}"),
        (None, None) => "process exited abnormally".to_string(),
    }
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded(ProcessResult),
    /// Carries [`TaskError::Spawn`], [`TaskError::NonZeroExit`] or
    /// [`TaskError::Scheduler`].
    Failed(TaskError),
    TimedOut(ProcessResult),
    /// `None` when the task was cancelled before a process was launched.
    Cancelled(Option<ProcessResult>),
}

impl Completion {
    /// Classify a runner result against the spec's success codes.
    pub fn from_process(result: ProcessResult, spec: &TaskSpec) -> Self {
        match result.termination {
            Termination::TimedOut => Completion::TimedOut(result),
            // No pid: the token fired before the runner launched anything.
            Termination::Cancelled if result.pid.is_none() => Completion::Cancelled(None),
            Termination::Cancelled => Completion::Cancelled(Some(result)),
            Termination::Exited => match result.exit_code {
                Some(code) if spec.is_success_code(code) => Completion::Succeeded(result),
                code => Completion::Failed(TaskError::NonZeroExit {
                    code,
                    signal: result.signal,
                    stderr: result.stderr_text().into_owned(),
                    result: Box::new(result),
                }),
            },
        }
    }

    pub fn from_exec_error(err: ExecError) -> Self {
        Completion::Failed(TaskError::Spawn(err))
    }

    pub fn scheduler_fault(msg: impl Into<String>) -> Self {
        Completion::Failed(TaskError::Scheduler(msg.into()))
    }

    pub fn state(&self) -> TaskState {
        match self {
            Completion::Succeeded(_) => TaskState::Succeeded,
            Completion::Failed(_) => TaskState::Failed,
            Completion::TimedOut(_) => TaskState::TimedOut,
            Completion::Cancelled(_) => TaskState::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Succeeded(_))
    }

    /// The process result, if a process actually ran.
    pub fn result(&self) -> Option<&ProcessResult> {
        match self {
            Completion::Succeeded(r) | Completion::TimedOut(r) => Some(r),
            Completion::Cancelled(r) => r.as_ref(),
            Completion::Failed(TaskError::NonZeroExit { result, .. }) => Some(result),
            Completion::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            Completion::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<ProcessResult, TaskError> {
        match self {
            Completion::Succeeded(r) => Ok(r),
            Completion::Failed(e) => Err(e),
            Completion::TimedOut(r) => Err(TaskError::Timeout {
                elapsed: r.elapsed,
                result: Box::new(r),
            }),
            Completion::Cancelled(r) => Err(TaskError::Cancelled {
                result: r.map(Box::new),
            }),
        }
    }
}
