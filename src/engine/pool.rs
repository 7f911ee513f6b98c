// src/engine/pool.rs

//! Fixed-size worker pool.
//!
//! `size` Tokio tasks share one FIFO queue. Each worker takes the next task,
//! moves it to `Running` (skipping it if it was cancelled while queued),
//! executes it through the [`ProcessBackend`] and records the outcome.
//! Workers never touch the scheduler; a settling task retires itself.

use std::any::Any;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::exec::ProcessBackend;
use crate::task::handle::TaskShared;
use crate::task::Completion;

pub(crate) type Job = Arc<TaskShared>;

type SharedReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>;

pub(crate) struct WorkerPool {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    pub(crate) fn start(
        size: usize,
        runtime: &Handle,
        backend: Arc<dyn ProcessBackend>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx: SharedReceiver = Arc::new(AsyncMutex::new(rx));

        let workers = (0..size)
            .map(|index| {
                runtime.spawn(worker_loop(index, rx.clone(), backend.clone()))
            })
            .collect();

        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            size,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Hand `job` to the next free worker. Gives the job back if the pool
    /// has been closed.
    pub(crate) fn enqueue(&self, job: Job) -> Result<(), Job> {
        let tx = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        match tx.as_ref() {
            Some(tx) => tx.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    /// Stop accepting jobs. Workers finish what is already queued and then
    /// exit; their handles are returned for joining.
    pub(crate) fn close(&self) -> Vec<JoinHandle<()>> {
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        std::mem::take(&mut *self.workers.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

async fn worker_loop(
    index: usize,
    rx: SharedReceiver,
    backend: Arc<dyn ProcessBackend>,
) {
    debug!(worker = index, "worker started");

    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(task) = job else {
            break;
        };

        if !task.begin() {
            debug!(worker = index, task_id = %task.id(), "skipping task cancelled before dispatch");
            continue;
        }

        // Settling also retires the task from the scheduler.
        let completion = execute(&backend, &task).await;
        task.finish(completion);
    }

    debug!(worker = index, "worker stopped");
}

/// Run one task on its own Tokio task so a panicking backend is contained
/// and turned into a `Scheduler` failure instead of killing the worker.
async fn execute(backend: &Arc<dyn ProcessBackend>, task: &Arc<TaskShared>) -> Completion {
    let backend = backend.clone();
    let spec = task.spec().clone();
    let cancel = task.cancel_token();
    let observer = task.line_observer();

    let run = tokio::spawn(async move { backend.execute(spec, cancel, observer).await });

    match run.await {
        Ok(Ok(result)) => Completion::from_process(result, task.spec()),
        Ok(Err(err)) => Completion::from_exec_error(err),
        Err(err) if err.is_panic() => {
            let message = panic_message(err.into_panic());
            error!(task_id = %task.id(), command = %task.command(), panic = %message, "process backend panicked");
            Completion::scheduler_fault(format!("process backend panicked: {message}"))
        }
        Err(err) => Completion::scheduler_fault(format!("execution aborted: {err}")),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
