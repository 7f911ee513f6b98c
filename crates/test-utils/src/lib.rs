pub mod builders;
pub mod fake_backend;

use std::sync::{Arc, Mutex, Once};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use runlane::dispatch::{self, ResultDispatcher, UiThread};
use runlane::task::{TaskEvent, TaskEventKind, TaskId, TaskState};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Dispatcher with its loop already running on a dedicated UI thread.
pub fn spawn_ui() -> (ResultDispatcher, UiThread) {
    let (dispatcher, ui_loop) = dispatch::channel();
    let ui = ui_loop.spawn().expect("failed to spawn UI thread");
    (dispatcher, ui)
}

/// Collects delivered events together with the thread they arrived on.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<(ThreadId, TaskEvent)>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listener suitable for `Submission::on_event`.
    pub fn listener(&self) -> impl FnMut(&TaskEvent) + Send + 'static {
        let events = self.events.clone();
        move |event| {
            events
                .lock()
                .unwrap()
                .push((thread::current().id(), event.clone()));
        }
    }

    /// Listener suitable for `TaskScheduler::subscribe`.
    pub fn shared_listener(&self) -> impl Fn(&TaskEvent) + Send + Sync + 'static {
        let events = self.events.clone();
        move |event| {
            events
                .lock()
                .unwrap()
                .push((thread::current().id(), event.clone()));
        }
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.events.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// Target states of every delivered transition for `task`, in order.
    pub fn states_of(&self, task: TaskId) -> Vec<TaskState> {
        self.events()
            .into_iter()
            .filter(|e| e.task_id == task)
            .filter_map(|e| match e.kind {
                TaskEventKind::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    pub fn finished_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e.kind, TaskEventKind::Finished(_)))
            .count()
    }

    /// Poll until `n` `Finished` events have been delivered (5s limit).
    pub async fn wait_finished(&self, n: usize) {
        with_timeout(async {
            while self.finished_count() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
    }
}
