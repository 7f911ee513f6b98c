// src/dispatch/context.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness token for the UI object a task reports to.
///
/// Clones share the same flag. Once closed, envelopes tagged with this
/// context are dropped at delivery time instead of being run.
#[derive(Debug, Clone, Default)]
pub struct UiContext {
    closed: Arc<AtomicBool>,
}

impl UiContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}
