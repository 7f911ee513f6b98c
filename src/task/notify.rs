// src/task/notify.rs

//! Routing task events to listeners through the UI dispatcher.
//!
//! Listener code only ever runs inside a dispatched envelope, so it always
//! executes on the UI thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::dispatch::{Envelope, ResultDispatcher, UiContext};
use crate::task::event::{TaskEvent, TaskEventKind};
use crate::task::outcome::Completion;

/// Per-task listener, registered at submission.
pub type EventListener = Box<dyn FnMut(&TaskEvent) + Send + 'static>;

/// Runs once with the final outcome, on the UI thread.
pub type CompletionCallback = Box<dyn FnOnce(&Completion) + Send + 'static>;

/// Scheduler-wide listener, sees events for every task.
pub type SharedListener = Arc<dyn Fn(&TaskEvent) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct Listeners {
    entries: RwLock<Vec<(SubscriptionId, SharedListener)>>,
    next: AtomicU64,
}

impl Listeners {
    pub(crate) fn subscribe(&self, listener: SharedListener) -> SubscriptionId {
        let id = SubscriptionId(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|(sid, _)| *sid != id);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<SharedListener> {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }
}

/// Where one task's events go.
pub(crate) struct Delivery {
    dispatcher: ResultDispatcher,
    context: Option<UiContext>,
    listener: Option<Arc<Mutex<EventListener>>>,
    global: Arc<Listeners>,
}

impl Delivery {
    pub(crate) fn new(
        dispatcher: ResultDispatcher,
        context: Option<UiContext>,
        listener: Option<EventListener>,
        global: Arc<Listeners>,
    ) -> Self {
        Self {
            dispatcher,
            context,
            listener: listener.map(|l| Arc::new(Mutex::new(l))),
            global,
        }
    }

    /// Post an intermediate event. It is dropped at delivery time if
    /// `stale` has been raised by then.
    pub(crate) fn post_update(&self, event: TaskEvent, stale: &Arc<AtomicBool>) {
        let listener = self.listener.clone();
        let global = self.global.clone();
        let envelope = Envelope::update(move || fan_out(&event, listener.as_deref(), &global))
            .with_context(self.context.clone())
            .suppressed_by(stale.clone());
        self.dispatcher.post(envelope);
    }

    /// Post the terminal transition, the `Finished` event and the
    /// completion callback as one envelope so nothing can interleave.
    pub(crate) fn post_final(
        &self,
        transition: TaskEvent,
        completion: Completion,
        on_complete: Option<CompletionCallback>,
    ) {
        let listener = self.listener.clone();
        let global = self.global.clone();
        let finished = TaskEvent::finished(transition.task_id, completion);
        let envelope = Envelope::new(move || {
            fan_out(&transition, listener.as_deref(), &global);
            fan_out(&finished, listener.as_deref(), &global);
            if let (Some(cb), TaskEventKind::Finished(c)) = (on_complete, &finished.kind) {
                cb(c);
            }
        })
        .with_context(self.context.clone());
        self.dispatcher.post(envelope);
    }
}

fn fan_out(event: &TaskEvent, listener: Option<&Mutex<EventListener>>, global: &Listeners) {
    if let Some(listener) = listener {
        let mut listener = listener.lock().unwrap_or_else(|p| p.into_inner());
        (*listener)(event);
    }
    for listener in global.snapshot() {
        listener(event);
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("context", &self.context)
            .field("has_listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}
