// src/task/mod.rs

pub mod event;
pub mod handle;
pub mod notify;
pub mod outcome;
pub mod state;

pub use event::{TaskEvent, TaskEventKind};
pub use handle::TaskHandle;
pub use notify::{CompletionCallback, EventListener, SharedListener, SubscriptionId};
pub use outcome::{Completion, TaskError};
pub use state::{TaskId, TaskState};
