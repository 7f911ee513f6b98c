#![allow(dead_code)]

use std::collections::BTreeMap;

use runlane::config::{ConfigFile, EngineSection, RawConfigFile, TaskConfig};
use runlane::errors::Result;
use runlane::types::KeyPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection::default(),
                env: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.engine.workers = workers;
        self
    }

    pub fn default_timeout(mut self, timeout: &str) -> Self {
        self.config.engine.default_timeout = timeout.to_string();
        self
    }

    pub fn grace_period(mut self, grace: &str) -> Self {
        self.config.engine.grace_period = grace.to_string();
        self
    }

    pub fn output_cap(mut self, cap: usize) -> Self {
        self.config.engine.output_cap = cap;
        self
    }

    pub fn key_policy(mut self, policy: KeyPolicy) -> Self {
        self.config.engine.key_policy = policy;
        self
    }

    pub fn global_env(mut self, key: &str, value: &str) -> Self {
        self.config.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// Task running `argv` directly.
    pub fn cmd(argv: &[&str]) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(argv.iter().map(|s| s.to_string()).collect()),
                ..TaskConfig::default()
            },
        }
    }

    /// Task running `script` through the shell.
    pub fn shell(script: &str) -> Self {
        Self {
            task: TaskConfig {
                shell: Some(script.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn also_shell(mut self, script: &str) -> Self {
        self.task.shell = Some(script.to_string());
        self
    }

    pub fn cwd(mut self, dir: &str) -> Self {
        self.task.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.task.key = Some(key.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn stdin(mut self, payload: &str) -> Self {
        self.task.stdin = Some(payload.to_string());
        self
    }

    pub fn merge_output(mut self) -> Self {
        self.task.merge_output = true;
        self
    }

    pub fn success_codes(mut self, codes: &[i32]) -> Self {
        self.task.success_codes = Some(codes.to_vec());
        self
    }

    pub fn progress(mut self, pattern: &str) -> Self {
        self.task.progress = Some(pattern.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
