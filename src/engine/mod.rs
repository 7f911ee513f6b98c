// src/engine/mod.rs

//! Scheduling engine.
//!
//! - [`keys`] is the pure execution-key registry (no Tokio, no IO).
//! - [`pool`] runs the fixed-size worker pool.
//! - [`scheduler`] is the [`TaskScheduler`] tying them to task records and
//!   the UI dispatcher.

pub mod keys;
mod pool;
pub mod scheduler;
pub mod submission;

pub use keys::{Admission, ExecutionKey, KeyRegistry};
pub use scheduler::{SchedulerConfig, TaskScheduler, DEFAULT_TIMEOUT, DEFAULT_WORKERS};
pub use submission::Submission;
