// src/dispatch/ui_loop.rs

//! Receiving side of the UI hand-off.
//!
//! The loop binds to the first thread that drives it and refuses to deliver
//! from any other. Hosts either dedicate a thread to it ([`UiLoop::run`],
//! [`UiLoop::spawn`]) or call [`UiLoop::pump`] from their own event loop.

use std::io;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::dispatch::dispatcher::Envelope;

pub struct UiLoop {
    rx: mpsc::UnboundedReceiver<Envelope>,
    ui_thread: Arc<OnceLock<ThreadId>>,
}

impl UiLoop {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Envelope>,
        ui_thread: Arc<OnceLock<ThreadId>>,
    ) -> Self {
        Self { rx, ui_thread }
    }

    /// Bind to the current thread if unbound. Returns whether the current
    /// thread is the UI thread.
    fn bind(&self) -> bool {
        let me = thread::current().id();
        *self.ui_thread.get_or_init(|| me) == me
    }

    /// Deliver envelopes until every dispatcher has been dropped.
    ///
    /// Blocks the calling thread; must not be called from inside an async
    /// task.
    pub fn run(mut self) {
        if !self.bind() {
            warn!("UiLoop::run called off the bound UI thread; refusing to deliver");
            return;
        }
        debug!("UI loop started");
        while let Some(envelope) = self.rx.blocking_recv() {
            envelope.deliver();
        }
        debug!("UI loop finished; all dispatchers dropped");
    }

    /// Run the loop on a dedicated thread named `runlane-ui`.
    pub fn spawn(self) -> io::Result<UiThread> {
        let ui_thread = self.ui_thread.clone();
        let handle = thread::Builder::new()
            .name("runlane-ui".to_string())
            .spawn(move || self.run())?;

        let id = handle.thread().id();
        // Bind eagerly so is_ui_thread() is correct before the thread runs.
        let _ = ui_thread.set(id);
        Ok(UiThread { handle, id })
    }

    /// Deliver everything queued right now without blocking. Returns the
    /// number of callbacks that actually ran.
    pub fn pump(&mut self) -> usize {
        if !self.bind() {
            warn!("UiLoop::pump called off the bound UI thread; nothing delivered");
            return 0;
        }
        let mut delivered = 0;
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => {
                    if envelope.deliver() {
                        delivered += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        delivered
    }

    pub fn ui_thread_id(&self) -> Option<ThreadId> {
        self.ui_thread.get().copied()
    }
}

/// Handle to a loop started with [`UiLoop::spawn`].
#[derive(Debug)]
pub struct UiThread {
    handle: JoinHandle<()>,
    id: ThreadId,
}

impl UiThread {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Wait for the loop to finish. It finishes once every
    /// [`ResultDispatcher`](crate::dispatch::ResultDispatcher) clone is gone.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}
