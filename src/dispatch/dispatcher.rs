// src/dispatch/dispatcher.rs

//! Posting side of the UI hand-off.
//!
//! Any thread may post. Nothing posted is ever run inline; everything goes
//! through one FIFO queue that the [`UiLoop`](crate::dispatch::UiLoop)
//! drains on the UI thread, so two posts from the same thread are delivered
//! in the order they were made.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::dispatch::context::UiContext;
use crate::dispatch::ui_loop::UiLoop;

pub type UiCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Intermediate notification; may be suppressed once stale.
    Update,
    /// Final notification for a task; never suppressed.
    Final,
}

/// A callback plus the conditions under which it should still run.
pub struct Envelope {
    callback: UiCallback,
    kind: EnvelopeKind,
    context: Option<UiContext>,
    suppressed_by: Option<Arc<AtomicBool>>,
}

impl Envelope {
    pub fn new(callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            kind: EnvelopeKind::Final,
            context: None,
            suppressed_by: None,
        }
    }

    /// An intermediate notification; see [`suppressed_by`](Self::suppressed_by).
    pub fn update(callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind: EnvelopeKind::Update,
            ..Self::new(callback)
        }
    }

    pub fn with_context(mut self, context: Option<UiContext>) -> Self {
        self.context = context;
        self
    }

    /// Drop this envelope at delivery time if `flag` has been raised by then.
    /// Only applies to [`EnvelopeKind::Update`] envelopes.
    pub fn suppressed_by(mut self, flag: Arc<AtomicBool>) -> Self {
        self.suppressed_by = Some(flag);
        self
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    fn should_deliver(&self) -> bool {
        if let Some(ctx) = &self.context {
            if !ctx.is_open() {
                return false;
            }
        }
        match (self.kind, &self.suppressed_by) {
            (EnvelopeKind::Update, Some(flag)) => !flag.load(Ordering::SeqCst),
            _ => true,
        }
    }

    /// Run the callback on the current thread unless it has gone stale.
    /// A panicking callback is logged and does not take the loop down.
    pub(crate) fn deliver(self) -> bool {
        if !self.should_deliver() {
            trace!(kind = ?self.kind, "dropping stale UI envelope");
            return false;
        }

        let callback = self.callback;
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            error!("UI callback panicked; continuing with the next envelope");
        }
        true
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("kind", &self.kind)
            .field("has_context", &self.context.is_some())
            .finish_non_exhaustive()
    }
}

/// Cloneable handle for posting work to the UI thread.
#[derive(Clone)]
pub struct ResultDispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
    ui_thread: Arc<OnceLock<ThreadId>>,
}

/// Create a connected dispatcher and the loop that drains it.
pub fn channel() -> (ResultDispatcher, UiLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ui_thread = Arc::new(OnceLock::new());
    (
        ResultDispatcher {
            tx,
            ui_thread: ui_thread.clone(),
        },
        UiLoop::new(rx, ui_thread),
    )
}

impl ResultDispatcher {
    /// Queue `callback` for the UI thread. Never runs it inline, even when
    /// called from the UI thread itself. False if the UI loop is gone.
    pub fn post_to_ui_thread(&self, callback: impl FnOnce() + Send + 'static) -> bool {
        self.post(Envelope::new(callback))
    }

    pub fn post(&self, envelope: Envelope) -> bool {
        if self.tx.send(envelope).is_err() {
            debug!("UI loop is gone; dropping envelope");
            return false;
        }
        true
    }

    /// Whether the calling thread is the one the UI loop is bound to.
    pub fn is_ui_thread(&self) -> bool {
        self.ui_thread
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    pub fn ui_thread_id(&self) -> Option<ThreadId> {
        self.ui_thread.get().copied()
    }

    /// True once the [`UiLoop`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for ResultDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultDispatcher")
            .field("ui_thread", &self.ui_thread.get())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
