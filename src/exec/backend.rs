// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The scheduler's workers talk to a `ProcessBackend` instead of a concrete
//! runner. Production code uses [`ProcessRunner`]; tests can provide their
//! own backend that records launches or simulates slow, failing, or
//! panicking processes without touching the OS.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::exec::error::ExecError;
use crate::exec::progress::LineObserver;
use crate::exec::result::ProcessResult;
use crate::exec::runner::ProcessRunner;
use crate::exec::spec::TaskSpec;

/// Boxed future returned by [`ProcessBackend::execute`].
pub type ExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProcessResult, ExecError>> + Send + 'a>>;

/// Trait abstracting how one task's process is executed.
pub trait ProcessBackend: Send + Sync {
    /// Execute `spec` until it exits, times out, or `cancel` fires.
    ///
    /// Implementations must honour `cancel` promptly and report timeouts and
    /// cancellations through [`ProcessResult::termination`] rather than as
    /// errors.
    fn execute(
        &self,
        spec: TaskSpec,
        cancel: CancellationToken,
        observer: Option<LineObserver>,
    ) -> ExecFuture<'_>;
}

impl ProcessBackend for ProcessRunner {
    fn execute(
        &self,
        spec: TaskSpec,
        cancel: CancellationToken,
        observer: Option<LineObserver>,
    ) -> ExecFuture<'_> {
        Box::pin(async move { self.run_observed(&spec, cancel, observer).await })
    }
}
