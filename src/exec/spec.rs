// src/exec/spec.rs

//! Immutable description of one external process invocation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exec::error::ExecError;
use crate::exec::progress::ProgressPattern;
use crate::types::CaptureMode;

/// Default per-stream output cap (1 MiB).
pub const DEFAULT_OUTPUT_CAP: usize = 1024 * 1024;

/// Environment variables that ask common toolchains for unbuffered, UTF-8
/// output. Applied per invocation by [`TaskSpec::unbuffered_utf8`].
pub const UNBUFFERED_UTF8_ENV: &[(&str, &str)] = &[
    ("PYTHONUNBUFFERED", "1"),
    ("PYTHONIOENCODING", "utf-8"),
    ("LC_ALL", "C.UTF-8"),
    ("LANG", "C.UTF-8"),
];

/// Everything the runner needs to launch and supervise one process.
///
/// Built by the caller with the builder methods below and never mutated once
/// submitted. `argv[0]` is the program; the rest are passed verbatim (no
/// shell interpretation unless [`TaskSpec::shell`] is used).
#[derive(Debug, Clone)]
pub struct TaskSpec {
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    env_remove: Vec<String>,
    /// `None`: use the scheduler default. `Some(None)`: no limit.
    timeout: Option<Option<Duration>>,
    stdin: Option<Vec<u8>>,
    capture: CaptureMode,
    output_cap: Option<usize>,
    success_codes: Vec<i32>,
    progress: Option<ProgressPattern>,
}

impl TaskSpec {
    /// Build a spec from a full argv (`argv[0]` is the program).
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            env: BTreeMap::new(),
            env_remove: Vec::new(),
            timeout: None,
            stdin: None,
            capture: CaptureMode::Separate,
            output_cap: None,
            success_codes: vec![0],
            progress: None,
        }
    }

    /// Spec for a single program with no arguments yet.
    pub fn command(program: impl Into<String>) -> Self {
        Self::new([program.into()])
    }

    /// Run `script` through the platform shell (`sh -c` / `cmd /C`).
    pub fn shell(script: impl Into<String>) -> Self {
        let script = script.into();
        if cfg!(windows) {
            Self::new(["cmd".to_string(), "/C".to_string(), script])
        } else {
            Self::new(["sh".to_string(), "-c".to_string(), script])
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable for this invocation only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Remove an inherited environment variable for this invocation only.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Force unbuffered UTF-8 output for the usual suspects. Variables the
    /// caller already set explicitly are left alone.
    pub fn unbuffered_utf8(mut self) -> Self {
        for (k, v) in UNBUFFERED_UTF8_ENV {
            self.env
                .entry((*k).to_string())
                .or_insert_with(|| (*v).to_string());
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(Some(timeout));
        self
    }

    /// Run without any deadline, even if the scheduler has a default one.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = Some(None);
        self
    }

    pub fn stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn merged_output(mut self) -> Self {
        self.capture = CaptureMode::Merged;
        self
    }

    pub fn capture(mut self, mode: CaptureMode) -> Self {
        self.capture = mode;
        self
    }

    /// Maximum number of bytes kept per capture buffer.
    pub fn output_cap(mut self, bytes: usize) -> Self {
        self.output_cap = Some(bytes);
        self
    }

    /// Exit codes treated as success. Defaults to `[0]`.
    pub fn success_codes<I: IntoIterator<Item = i32>>(mut self, codes: I) -> Self {
        self.success_codes = codes.into_iter().collect();
        self
    }

    pub fn progress(mut self, pattern: ProgressPattern) -> Self {
        self.progress = Some(pattern);
        self
    }

    /// Fill in scheduler defaults for fields the caller left unset.
    ///
    /// Explicit values on the spec always win.
    pub(crate) fn with_defaults(
        mut self,
        timeout: Option<Duration>,
        output_cap: usize,
        env: &BTreeMap<String, String>,
        unbuffered: bool,
    ) -> Self {
        if self.timeout.is_none() {
            self.timeout = Some(timeout);
        }
        if self.output_cap.is_none() {
            self.output_cap = Some(output_cap);
        }
        for (k, v) in env {
            self.env.entry(k.clone()).or_insert_with(|| v.clone());
        }
        if unbuffered {
            self = self.unbuffered_utf8();
        }
        self
    }

    /// Reject specs that can never be launched.
    pub fn validate(&self) -> Result<(), ExecError> {
        match self.argv.first() {
            None => Err(ExecError::InvalidSpec("argument list is empty".to_string())),
            Some(p) if p.trim().is_empty() => {
                Err(ExecError::InvalidSpec("program name is empty".to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn env_overrides(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn env_removals(&self) -> &[String] {
        &self.env_remove
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.flatten()
    }

    pub fn stdin_payload(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.capture
    }

    pub fn effective_output_cap(&self) -> usize {
        self.output_cap.unwrap_or(DEFAULT_OUTPUT_CAP)
    }

    pub fn is_success_code(&self, code: i32) -> bool {
        self.success_codes.contains(&code)
    }

    pub fn progress_pattern(&self) -> Option<&ProgressPattern> {
        self.progress.as_ref()
    }

    /// Human-readable command line for logs.
    pub fn command_line(&self) -> String {
        self.argv
            .iter()
            .map(|a| {
                if a.is_empty() || a.contains(char::is_whitespace) {
                    format!("{a:?}")
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
