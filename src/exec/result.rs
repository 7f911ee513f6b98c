// src/exec/result.rs

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

/// Why the process stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own (any exit code or signal).
    Exited,
    /// The runner's deadline elapsed and it terminated the process.
    TimedOut,
    /// The caller's cancellation signal fired and the runner terminated the
    /// process.
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited => f.write_str("exited"),
            Termination::TimedOut => f.write_str("timed out"),
            Termination::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Bytes captured from one stream, bounded by the spec's output cap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Everything the process wrote, including discarded bytes.
    pub total_bytes: u64,
    /// Set once `total_bytes` exceeded the cap.
    pub truncated: bool,
}

impl Captured {
    /// Lossy UTF-8 view of the retained bytes.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Terminal outcome of one process launch. Produced exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// Terminating signal number (unix only).
    pub signal: Option<i32>,
    pub pid: Option<u32>,
    pub stdout: Captured,
    /// Empty when output was merged into `stdout`.
    pub stderr: Captured,
    pub merged: bool,
    pub elapsed: Duration,
    pub termination: Termination,
}

impl ProcessResult {
    pub fn stdout_text(&self) -> Cow<'_, str> {
        self.stdout.text()
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        self.stderr.text()
    }

    /// True if either capture buffer hit the cap.
    pub fn truncated(&self) -> bool {
        self.stdout.truncated || self.stderr.truncated
    }
}
