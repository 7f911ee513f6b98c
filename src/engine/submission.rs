// src/engine/submission.rs

use std::fmt;

use crate::dispatch::UiContext;
use crate::engine::keys::ExecutionKey;
use crate::task::{Completion, EventListener, TaskEvent};
use crate::task::notify::CompletionCallback;
use crate::types::KeyPolicy;

/// Per-submission options for [`TaskScheduler::submit_with`].
///
/// [`TaskScheduler::submit_with`]: crate::engine::TaskScheduler::submit_with
#[derive(Default)]
pub struct Submission {
    pub(crate) key: Option<ExecutionKey>,
    pub(crate) policy: Option<KeyPolicy>,
    pub(crate) context: Option<UiContext>,
    pub(crate) on_event: Option<EventListener>,
    pub(crate) on_complete: Option<CompletionCallback>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<ExecutionKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn maybe_key(mut self, key: Option<ExecutionKey>) -> Self {
        self.key = key;
        self
    }

    /// Override the scheduler's default key policy for this submission.
    pub fn policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Bind notifications to a UI context; they are dropped once it closes.
    pub fn context(mut self, context: UiContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Listener for this task's events, run on the UI thread.
    pub fn on_event(mut self, listener: impl FnMut(&TaskEvent) + Send + 'static) -> Self {
        self.on_event = Some(Box::new(listener));
        self
    }

    /// Run once on the UI thread with the final outcome.
    pub fn on_complete(mut self, callback: impl FnOnce(&Completion) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .field("context", &self.context)
            .field("on_event", &self.on_event.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
