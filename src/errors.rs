// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::task::TaskId;

#[derive(Error, Debug)]
pub enum RunlaneError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid task spec: {0}")]
    InvalidSpec(String),

    #[error("Execution key '{key}' is already held by task {holder}")]
    AlreadyRunning { key: String, holder: TaskId },

    #[error("Scheduler is shut down; submission rejected")]
    SchedulerClosed,

    #[error("No Tokio runtime available to start the worker pool")]
    NoRuntime,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunlaneError>;
