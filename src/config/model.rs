// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{ExecutionKey, SchedulerConfig};
use crate::exec::{RunnerConfig, TaskSpec};
use crate::types::KeyPolicy;

/// Configuration file as read from TOML, before validation.
///
/// ```toml
/// [engine]
/// workers = 4
/// default_timeout = "30s"
/// key_policy = "reject"
///
/// [env]
/// LANG = "C.UTF-8"
///
/// [task.build]
/// cmd = ["cargo", "build"]
/// key = "build"
/// progress = '(?P<percent>\d+)%'
/// ```
///
/// All sections are optional at this level; [`ConfigFile`] is the checked
/// form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// Environment overrides applied to every task.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Keys are task names (`[task.<name>]`).
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// `"none"` disables the default timeout.
    #[serde(default = "default_timeout")]
    pub default_timeout: String,

    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Per-stream capture limit in bytes.
    #[serde(default = "default_output_cap")]
    pub output_cap: usize,

    #[serde(default)]
    pub key_policy: KeyPolicy,

    #[serde(default = "default_unbuffered")]
    pub unbuffered: bool,
}

fn default_workers() -> usize {
    crate::engine::DEFAULT_WORKERS
}

fn default_timeout() -> String {
    "30s".to_string()
}

fn default_grace_period() -> String {
    "2s".to_string()
}

fn default_output_cap() -> usize {
    crate::exec::DEFAULT_OUTPUT_CAP
}

fn default_unbuffered() -> bool {
    true
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            default_timeout: default_timeout(),
            grace_period: default_grace_period(),
            output_cap: default_output_cap(),
            key_policy: KeyPolicy::default(),
            unbuffered: default_unbuffered(),
        }
    }
}

/// `[task.<name>]` section. Exactly one of `cmd` and `shell` must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Program and arguments, run without a shell.
    #[serde(default)]
    pub cmd: Option<Vec<String>>,

    /// Script run through the platform shell.
    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Overrides `[engine].default_timeout`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Execution key; tasks sharing a key never overlap.
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub stdin: Option<String>,

    #[serde(default)]
    pub merge_output: bool,

    /// Defaults to `[0]`.
    #[serde(default)]
    pub success_codes: Option<Vec<i32>>,

    /// Regex with optional `percent`, `fraction` and `text` groups.
    #[serde(default)]
    pub progress: Option<String>,
}

/// Validated `[engine]` settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub workers: usize,
    pub default_timeout: Option<Duration>,
    pub grace_period: Duration,
    pub output_cap: usize,
    pub key_policy: KeyPolicy,
    pub unbuffered: bool,
}

/// A configured task, ready to submit.
#[derive(Debug, Clone)]
pub struct TaskEntry {
    pub spec: TaskSpec,
    pub key: Option<ExecutionKey>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSettings,
    pub env: BTreeMap<String, String>,
    pub tasks: BTreeMap<String, TaskEntry>,
}

impl ConfigFile {
    /// Scheduler settings derived from `[engine]` and `[env]`.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.engine.workers,
            default_timeout: self.engine.default_timeout,
            output_cap: self.engine.output_cap,
            env: self.env.clone(),
            unbuffered: self.engine.unbuffered,
            key_policy: self.engine.key_policy,
            runner: RunnerConfig {
                grace_period: self.engine.grace_period,
                ..RunnerConfig::default()
            },
        }
    }

    pub fn task(&self, name: &str) -> Option<&TaskEntry> {
        self.tasks.get(name)
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }
}
