// src/engine/keys.rs

//! Execution-key bookkeeping.
//!
//! This is the pure part of the scheduler: a synchronous map from key to the
//! task currently holding it, plus a FIFO of waiters for the opt-in queue
//! policy. It owns no channels and performs no IO, so the scheduler can keep
//! its lock around these calls short.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::task::TaskId;
use crate::types::KeyPolicy;

/// Caller-supplied identifier serializing overlapping requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionKey(Arc<str>);

impl ExecutionKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ExecutionKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[derive(Debug)]
pub enum Admission<T> {
    /// The key was free; the caller now holds it.
    Acquired,
    /// Parked behind the current holder. `position` is 1-based.
    Queued { position: usize },
    /// Refused; the item is handed back untouched.
    Rejected { holder: TaskId, item: T },
}

#[derive(Debug)]
struct Slot<T> {
    holder: TaskId,
    waiting: VecDeque<(TaskId, T)>,
}

#[derive(Debug)]
pub struct KeyRegistry<T> {
    slots: HashMap<ExecutionKey, Slot<T>>,
}

impl<T> Default for KeyRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> KeyRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Try to take `key` for task `id`.
    pub fn admit(
        &mut self,
        key: &ExecutionKey,
        id: TaskId,
        policy: KeyPolicy,
        item: T,
    ) -> Admission<T> {
        let Some(slot) = self.slots.get_mut(key) else {
            self.slots.insert(
                key.clone(),
                Slot {
                    holder: id,
                    waiting: VecDeque::new(),
                },
            );
            return Admission::Acquired;
        };

        match policy {
            KeyPolicy::Reject => Admission::Rejected {
                holder: slot.holder,
                item,
            },
            KeyPolicy::Queue => {
                slot.waiting.push_back((id, item));
                let position = slot.waiting.len();
                debug!(%key, task_id = %id, holder = %slot.holder, position, "queued behind key holder");
                Admission::Queued { position }
            }
        }
    }

    /// Release `key` if `id` holds it. The next waiter, if any, becomes the
    /// holder and is returned; otherwise the key is freed.
    ///
    /// Releasing a key held by someone else is a no-op.
    pub fn release(&mut self, key: &ExecutionKey, id: TaskId) -> Option<(TaskId, T)> {
        let slot = self.slots.get_mut(key)?;
        if slot.holder != id {
            return None;
        }

        match slot.waiting.pop_front() {
            Some((next, item)) => {
                slot.holder = next;
                Some((next, item))
            }
            None => {
                self.slots.remove(key);
                None
            }
        }
    }

    /// Remove a task that is still waiting for `key`.
    pub fn forget_waiting(&mut self, key: &ExecutionKey, id: TaskId) -> Option<T> {
        let slot = self.slots.get_mut(key)?;
        let pos = slot.waiting.iter().position(|(waiting, _)| *waiting == id)?;
        slot.waiting.remove(pos).map(|(_, item)| item)
    }

    pub fn holder(&self, key: &ExecutionKey) -> Option<TaskId> {
        self.slots.get(key).map(|s| s.holder)
    }

    pub fn waiting(&self, key: &ExecutionKey) -> usize {
        self.slots.get(key).map_or(0, |s| s.waiting.len())
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Remove everything, returning the waiters in key-then-FIFO order.
    pub fn drain_waiting(&mut self) -> Vec<(TaskId, T)> {
        self.slots
            .drain()
            .flat_map(|(_, slot)| slot.waiting)
            .collect()
    }
}
