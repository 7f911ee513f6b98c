// src/exec/error.rs

use std::io;

use thiserror::Error;

/// Errors the runner returns instead of a [`ProcessResult`].
///
/// Timeouts, cancellations and non-zero exits are *not* errors at this level:
/// the process ran, so the runner reports them inside the result.
///
/// [`ProcessResult`]: crate::exec::ProcessResult
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("failed to spawn '{program}': {message}")]
    Spawn {
        program: String,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("io error: {0}")]
    Io(String),
}

impl ExecError {
    pub(crate) fn spawn(program: &str, err: &io::Error) -> Self {
        ExecError::Spawn {
            program: program.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// True if the executable could not be found at all.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExecError::Spawn {
                kind: io::ErrorKind::NotFound,
                ..
            }
        )
    }
}

impl From<io::Error> for ExecError {
    fn from(e: io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}
