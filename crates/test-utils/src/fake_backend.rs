use std::collections::HashMap;
use std::io;
use std::pin::pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use runlane::exec::{
    Captured, ExecError, ExecFuture, LineObserver, ProcessBackend, ProcessResult, TaskSpec,
    Termination,
};
use runlane::types::Stream;

/// What the fake does when asked to run a program.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Exit straight away with `code`, reporting `stdout` as captured output.
    Exit { code: i32, stdout: String },
    /// Report the program as not found.
    SpawnError,
    /// Panic inside the backend.
    Panic,
    /// Never exit on its own; only cancellation or the deadline end it.
    Hang,
    /// Block until [`FakeBackend::release`] hands out a permit, then exit 0.
    Gated,
    /// Exit 0 after the given delay.
    Sleep(Duration),
    /// Feed each line to the observer as stdout, then exit 0.
    Lines(Vec<String>),
}

impl FakeBehavior {
    pub fn succeed() -> Self {
        FakeBehavior::Exit {
            code: 0,
            stdout: String::new(),
        }
    }

    pub fn exit(code: i32) -> Self {
        FakeBehavior::Exit {
            code,
            stdout: String::new(),
        }
    }
}

/// A fake process backend that:
/// - records every launch (argv) instead of spawning anything
/// - behaves per program name, falling back to a default behaviour
/// - honours cancellation and the spec's timeout like the real runner
pub struct FakeBackend {
    default: FakeBehavior,
    scripted: Mutex<HashMap<String, FakeBehavior>>,
    launches: Mutex<Vec<Vec<String>>>,
    launched: Notify,
    gate: Semaphore,
    next_pid: AtomicU32,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::with_default(FakeBehavior::succeed())
    }

    pub fn with_default(default: FakeBehavior) -> Self {
        Self {
            default,
            scripted: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            launched: Notify::new(),
            gate: Semaphore::new(0),
            next_pid: AtomicU32::new(10_000),
        }
    }

    /// Use `behavior` whenever `program` is launched.
    pub fn script(&self, program: &str, behavior: FakeBehavior) {
        self.scripted
            .lock()
            .unwrap()
            .insert(program.to_string(), behavior);
    }

    /// Let `n` gated launches finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    pub fn launched(&self) -> Vec<Vec<String>> {
        self.launches.lock().unwrap().clone()
    }

    /// Resolve once at least `n` launches have been recorded.
    pub async fn wait_for_launches(&self, n: usize) {
        loop {
            let mut notified = pin!(self.launched.notified());
            notified.as_mut().enable();
            if self.launch_count() >= n {
                return;
            }
            notified.await;
        }
    }

    fn behavior_for(&self, program: &str) -> FakeBehavior {
        self.scripted
            .lock()
            .unwrap()
            .get(program)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    fn record(&self, spec: &TaskSpec) {
        self.launches.lock().unwrap().push(spec.argv().to_vec());
        self.launched.notify_waiters();
    }

    async fn behave(&self, behavior: FakeBehavior, observer: Option<&LineObserver>) -> (i32, String) {
        match behavior {
            FakeBehavior::Exit { code, stdout } => (code, stdout),
            FakeBehavior::Panic => panic!("fake backend asked to panic"),
            FakeBehavior::SpawnError | FakeBehavior::Hang => {
                std::future::pending::<()>().await;
                (0, String::new())
            }
            FakeBehavior::Gated => {
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
                (0, String::new())
            }
            FakeBehavior::Sleep(d) => {
                sleep(d).await;
                (0, String::new())
            }
            FakeBehavior::Lines(lines) => {
                for line in &lines {
                    if let Some(observer) = observer {
                        observer(Stream::Stdout, line);
                    }
                    tokio::task::yield_now().await;
                }
                (0, lines.join("\n"))
            }
        }
    }
}

fn captured(text: String) -> Captured {
    Captured {
        total_bytes: text.len() as u64,
        bytes: text.into_bytes(),
        truncated: false,
    }
}

impl ProcessBackend for FakeBackend {
    fn execute(
        &self,
        spec: TaskSpec,
        cancel: CancellationToken,
        observer: Option<LineObserver>,
    ) -> ExecFuture<'_> {
        Box::pin(async move {
            let program = spec.program().unwrap_or_default().to_string();
            let behavior = self.behavior_for(&program);

            if let FakeBehavior::SpawnError = behavior {
                return Err(ExecError::Spawn {
                    program,
                    kind: io::ErrorKind::NotFound,
                    message: "No such file or directory (fake)".to_string(),
                });
            }

            let mut result = ProcessResult {
                exit_code: None,
                signal: None,
                pid: None,
                stdout: Captured::default(),
                stderr: Captured::default(),
                merged: false,
                elapsed: Duration::ZERO,
                termination: Termination::Cancelled,
            };

            if cancel.is_cancelled() {
                return Ok(result);
            }

            self.record(&spec);
            result.pid = Some(self.next_pid.fetch_add(1, Ordering::SeqCst));
            let started = Instant::now();

            let deadline = async {
                match spec.timeout_duration() {
                    Some(d) => sleep(d).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                (code, stdout) = self.behave(behavior, observer.as_ref()) => {
                    result.exit_code = Some(code);
                    result.stdout = captured(stdout);
                    result.termination = Termination::Exited;
                }
                _ = cancel.cancelled() => {
                    result.termination = Termination::Cancelled;
                }
                _ = deadline => {
                    result.termination = Termination::TimedOut;
                }
            }

            result.elapsed = started.elapsed();
            Ok(result)
        })
    }
}
