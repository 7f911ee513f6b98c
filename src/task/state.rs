// src/task/state.rs

//! Task identity and lifecycle state machine.
//!
//! ```text
//! Pending ──► Running ──► Succeeded | Failed | TimedOut | Cancelled
//!    │
//!    └──────► Cancelled
//! ```
//!
//! Transitions only move forward; terminal states never change again.

use std::fmt;

/// Unique, monotonically allocated task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Created, not yet picked up by a worker.
    Pending,
    /// A worker is executing the process.
    Running,
    /// Exited with a success code before any deadline or cancellation.
    Succeeded,
    /// Non-zero exit, spawn failure, or internal scheduler fault.
    Failed,
    /// The runner's deadline elapsed first.
    TimedOut,
    /// The caller cancelled before natural completion.
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::Running)
    }

    /// Whether the edge `self -> next` exists in the state machine.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::TimedOut => "timed_out",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
