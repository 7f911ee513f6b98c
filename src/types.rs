// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What to do when a submission names an execution key that another
/// non-terminal task already holds.
///
/// - `Reject`: fail the new submission with `AlreadyRunning` (default,
///   single-flight behaviour).
/// - `Queue`: park the new task as `Pending` and dispatch it once the
///   current holder reaches a terminal state. Waiters are served FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    Reject,
    Queue,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        KeyPolicy::Reject
    }
}

impl FromStr for KeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(KeyPolicy::Reject),
            "queue" => Ok(KeyPolicy::Queue),
            other => Err(format!(
                "invalid key_policy: {other} (expected \"reject\" or \"queue\")"
            )),
        }
    }
}

/// How the runner captures the child's output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// stdout and stderr go to independent buffers.
    #[default]
    Separate,
    /// Both streams are appended to the stdout buffer in arrival order;
    /// the stderr buffer stays empty.
    Merged,
}

/// One of the two output streams of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => f.write_str("stdout"),
            Stream::Stderr => f.write_str("stderr"),
        }
    }
}
