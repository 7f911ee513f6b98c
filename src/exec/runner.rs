// src/exec/runner.rs

//! Single-process runner.
//!
//! Launches one external command, captures its output, and races the
//! process exit against the timeout and the caller's cancellation token.
//! Whatever happens, the child is reaped before `run` returns.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::exec::capture;
use crate::exec::error::ExecError;
use crate::exec::progress::LineObserver;
use crate::exec::result::{Captured, ProcessResult, Termination};
use crate::exec::spec::TaskSpec;
use crate::exec::terminate::{terminate, DEFAULT_GRACE_PERIOD};
use crate::types::{CaptureMode, Stream};

/// How long output readers may keep draining after the child is reaped.
///
/// Readers only outlive the child when a detached grandchild inherited the
/// pipe; after this window they are aborted so the worker is released.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Wait between the graceful terminate signal and the forced kill.
    pub grace_period: Duration,
    pub drain_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Production process runner built on `tokio::process`.
#[derive(Debug, Default)]
pub struct ProcessRunner {
    config: RunnerConfig,
    spawned: AtomicU64,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            spawned: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Number of OS processes this runner has launched so far.
    pub fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Run `spec` to completion, timeout, or cancellation.
    pub async fn run(
        &self,
        spec: &TaskSpec,
        cancel: CancellationToken,
    ) -> Result<ProcessResult, ExecError> {
        self.run_observed(spec, cancel, None).await
    }

    /// Like [`run`](Self::run), also feeding every output line to `observer`.
    pub async fn run_observed(
        &self,
        spec: &TaskSpec,
        cancel: CancellationToken,
        observer: Option<LineObserver>,
    ) -> Result<ProcessResult, ExecError> {
        spec.validate()?;

        if cancel.is_cancelled() {
            debug!(command = %spec.command_line(), "cancelled before launch; not spawning");
            return Ok(not_launched(spec));
        }

        let mut cmd = build_command(spec);
        let started = Instant::now();

        let program = spec.program().unwrap_or_default();
        let mut child = cmd.spawn().map_err(|e| ExecError::spawn(program, &e))?;
        self.spawned.fetch_add(1, Ordering::SeqCst);

        let pid = child.id();
        debug!(pid, command = %spec.command_line(), "process spawned");

        let stdin_task = spawn_stdin_writer(&mut child, spec);

        let cap = spec.effective_output_cap();
        let merged = spec.capture_mode() == CaptureMode::Merged;
        let out_buf = capture::shared(cap);
        let err_buf = if merged {
            out_buf.clone()
        } else {
            capture::shared(cap)
        };

        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(capture::pump(
                stdout,
                Stream::Stdout,
                out_buf.clone(),
                observer.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(capture::pump(
                stderr,
                Stream::Stderr,
                err_buf.clone(),
                observer,
            )));
        }

        let deadline = spec.timeout_duration().map(|d| started + d);
        let grace = self.config.grace_period;

        let (status, termination) = tokio::select! {
            biased;

            status = child.wait() => (status, Termination::Exited),

            _ = cancel.cancelled() => {
                info!(pid, command = %spec.command_line(), "cancellation requested; terminating process");
                (terminate(&mut child, grace).await, Termination::Cancelled)
            }

            _ = wait_deadline(deadline) => {
                info!(
                    pid,
                    command = %spec.command_line(),
                    timeout_ms = spec.timeout_duration().map(|d| d.as_millis() as u64),
                    "deadline elapsed; terminating process"
                );
                (terminate(&mut child, grace).await, Termination::TimedOut)
            }
        };

        if let Some(task) = stdin_task {
            task.abort();
        }

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                warn!(pid, error = %e, "waiting for process failed");
                let _ = child.start_kill();
                for reader in &readers {
                    reader.abort();
                }
                return Err(ExecError::from(e));
            }
        };

        self.drain_readers(pid, &mut readers).await;

        let elapsed = started.elapsed();
        let (exit_code, signal) = decode_status(&status);

        let (stdout, stderr) = if merged {
            drop(err_buf);
            (capture::into_captured(out_buf), Captured::default())
        } else {
            (
                capture::into_captured(out_buf),
                capture::into_captured(err_buf),
            )
        };

        let result = ProcessResult {
            exit_code,
            signal,
            pid,
            stdout,
            stderr,
            merged,
            elapsed,
            termination,
        };

        debug!(
            pid,
            exit_code,
            signal,
            %termination,
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_bytes = result.stdout.total_bytes,
            stderr_bytes = result.stderr.total_bytes,
            truncated = result.truncated(),
            "process finished"
        );

        Ok(result)
    }

    async fn drain_readers(&self, pid: Option<u32>, readers: &mut [JoinHandle<()>]) {
        let drain = async {
            for reader in readers.iter_mut() {
                let _ = reader.await;
            }
        };

        if timeout(self.config.drain_timeout, drain).await.is_err() {
            warn!(
                pid,
                "output pipes still open after process exit; abandoning capture"
            );
            for reader in readers.iter() {
                reader.abort();
            }
        }
    }
}

fn build_command(spec: &TaskSpec) -> Command {
    let argv = spec.argv();
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);

    if let Some(dir) = spec.working_dir() {
        cmd.current_dir(dir);
    }
    for key in spec.env_removals() {
        cmd.env_remove(key);
    }
    cmd.envs(spec.env_overrides());

    let stdin = if spec.stdin_payload().is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };

    cmd.stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group, so termination reaches the whole tree.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    cmd
}

fn spawn_stdin_writer(child: &mut Child, spec: &TaskSpec) -> Option<JoinHandle<()>> {
    let mut pipe = child.stdin.take()?;
    let payload = spec.stdin_payload()?.to_vec();

    Some(tokio::spawn(async move {
        if let Err(e) = pipe.write_all(&payload).await {
            // The child may legitimately exit without reading its input.
            debug!(error = %e, "writing stdin payload failed");
        }
        let _ = pipe.shutdown().await;
    }))
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(unix)]
fn decode_status(status: &ExitStatus) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    (status.code(), status.signal())
}

#[cfg(not(unix))]
fn decode_status(status: &ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}

fn not_launched(spec: &TaskSpec) -> ProcessResult {
    ProcessResult {
        exit_code: None,
        signal: None,
        pid: None,
        stdout: Captured::default(),
        stderr: Captured::default(),
        merged: spec.capture_mode() == CaptureMode::Merged,
        elapsed: Duration::ZERO,
        termination: Termination::Cancelled,
    }
}
