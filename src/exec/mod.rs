// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running external commands, using
//! `tokio::process::Command`, and turning each launch into exactly one
//! [`ProcessResult`].
//!
//! - [`spec`] holds the immutable [`TaskSpec`].
//! - [`runner`] owns the [`ProcessRunner`] that spawns, supervises and reaps
//!   one process.
//! - [`capture`] drains stdout/stderr into capped buffers.
//! - [`terminate`] implements graceful-then-forced termination.
//! - [`progress`] turns output lines into progress notifications.
//! - [`backend`] provides the `ProcessBackend` trait the scheduler executes
//!   through, so tests can swap in a fake.

pub mod backend;
pub mod capture;
pub mod error;
pub mod progress;
pub mod result;
pub mod runner;
pub mod spec;
pub mod terminate;

pub use backend::{ExecFuture, ProcessBackend};
pub use error::ExecError;
pub use progress::{LineObserver, Progress, ProgressPattern};
pub use result::{Captured, ProcessResult, Termination};
pub use runner::{ProcessRunner, RunnerConfig};
pub use spec::{TaskSpec, DEFAULT_OUTPUT_CAP};
pub use terminate::DEFAULT_GRACE_PERIOD;
