// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::duration::{parse_duration, parse_optional_duration};
use crate::config::model::{
    ConfigFile, EngineSection, EngineSettings, RawConfigFile, TaskConfig, TaskEntry,
};
use crate::engine::ExecutionKey;
use crate::errors::{Result, RunlaneError};
use crate::exec::{ProgressPattern, TaskSpec};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RunlaneError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        let engine = validate_engine(&raw.engine)?;

        let tasks = raw
            .task
            .iter()
            .map(|(name, task)| Ok((name.clone(), validate_task(name, task)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(ConfigFile {
            engine,
            env: raw.env,
            tasks,
        })
    }
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(RunlaneError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine(engine: &EngineSection) -> Result<EngineSettings> {
    if engine.workers == 0 {
        return Err(RunlaneError::ConfigError(
            "[engine].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if engine.output_cap == 0 {
        return Err(RunlaneError::ConfigError(
            "[engine].output_cap must be >= 1 (got 0)".to_string(),
        ));
    }

    let default_timeout = parse_optional_duration(&engine.default_timeout)
        .map_err(|e| RunlaneError::ConfigError(format!("[engine].default_timeout: {e}")))?;
    let grace_period = parse_duration(&engine.grace_period)
        .map_err(|e| RunlaneError::ConfigError(format!("[engine].grace_period: {e}")))?;

    Ok(EngineSettings {
        workers: engine.workers,
        default_timeout,
        grace_period,
        output_cap: engine.output_cap,
        key_policy: engine.key_policy,
        unbuffered: engine.unbuffered,
    })
}

fn validate_task(name: &str, task: &TaskConfig) -> Result<TaskEntry> {
    let err = |msg: String| RunlaneError::ConfigError(format!("task '{name}': {msg}"));

    let mut spec = match (&task.cmd, &task.shell) {
        (Some(_), Some(_)) => {
            return Err(err("set either `cmd` or `shell`, not both".to_string()));
        }
        (None, None) => return Err(err("one of `cmd` or `shell` is required".to_string())),
        (Some(cmd), None) => {
            if cmd.first().is_none_or(|p| p.trim().is_empty()) {
                return Err(err("`cmd` must name a program".to_string()));
            }
            TaskSpec::new(cmd.iter().cloned())
        }
        (None, Some(script)) => {
            if script.trim().is_empty() {
                return Err(err("`shell` script is empty".to_string()));
            }
            TaskSpec::shell(script.clone())
        }
    };

    if let Some(cwd) = &task.cwd {
        spec = spec.cwd(cwd.clone());
    }
    for (k, v) in &task.env {
        spec = spec.env(k.clone(), v.clone());
    }
    if let Some(timeout) = &task.timeout {
        // "none" here means "no timeout at all", overriding the engine default.
        match parse_optional_duration(timeout).map_err(|e| err(format!("timeout: {e}")))? {
            Some(d) => spec = spec.timeout(d),
            None => spec = spec.no_timeout(),
        }
    }
    if let Some(stdin) = &task.stdin {
        spec = spec.stdin(stdin.clone().into_bytes());
    }
    if task.merge_output {
        spec = spec.merged_output();
    }
    if let Some(codes) = &task.success_codes {
        if codes.is_empty() {
            return Err(err("`success_codes` must not be empty".to_string()));
        }
        spec = spec.success_codes(codes.iter().copied());
    }
    if let Some(pattern) = &task.progress {
        let pattern = ProgressPattern::new(pattern)
            .map_err(|e| err(format!("invalid progress regex: {e}")))?;
        spec = spec.progress(pattern);
    }

    let key = match &task.key {
        Some(k) if k.trim().is_empty() => return Err(err("`key` must not be empty".to_string())),
        Some(k) => Some(ExecutionKey::new(k)),
        None => None,
    };

    Ok(TaskEntry { spec, key })
}
