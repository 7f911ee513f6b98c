// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod task;
pub mod types;

use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{default_config_path, load_and_validate, ConfigFile};
use crate::engine::{Submission, TaskScheduler};
use crate::errors::RunlaneError;
use crate::task::{Completion, TaskEvent, TaskEventKind, TaskHandle};

/// What happened to each selected task in one `run`.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub succeeded: Vec<String>,
    /// Task name and a short description of why it did not succeed.
    pub unsuccessful: Vec<(String, String)>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.unsuccessful.is_empty()
    }
}

/// High-level entry point used by `main.rs`.
///
/// Loads the config, starts the UI thread and the scheduler, submits the
/// selected tasks and waits for all of them. Ctrl-C cancels everything
/// still live.
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;
    let selected = select_tasks(&cfg, &args.tasks)?;

    if args.dry_run {
        print_dry_run(&cfg, &config_path, &selected);
        return Ok(RunSummary::default());
    }

    let mut sched_cfg = cfg.scheduler_config();
    if let Some(workers) = args.workers {
        sched_cfg.workers = workers;
    }

    let (dispatcher, ui_loop) = dispatch::channel();
    let ui = ui_loop.spawn()?;
    let scheduler = TaskScheduler::new(sched_cfg, dispatcher)?;

    let mut summary = RunSummary::default();
    let mut handles: Vec<(String, TaskHandle)> = Vec::with_capacity(selected.len());

    for name in selected {
        let Some(entry) = cfg.task(&name) else {
            continue;
        };
        let label = name.clone();
        let submission = Submission::new()
            .maybe_key(entry.key.clone())
            .on_event(move |event| print_event(&label, event));

        match scheduler.submit_with(entry.spec.clone(), submission) {
            Ok(handle) => {
                info!(task = %name, task_id = %handle.id(), "submitted");
                handles.push((name, handle));
            }
            Err(err @ RunlaneError::AlreadyRunning { .. }) => {
                warn!(task = %name, error = %err, "not submitted");
                summary.unsuccessful.push((name, err.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
    }

    let outcomes = {
        let waiting = async {
            let mut out = Vec::with_capacity(handles.len());
            for (name, handle) in &handles {
                out.push((name.clone(), handle.wait().await));
            }
            out
        };
        tokio::pin!(waiting);

        tokio::select! {
            done = &mut waiting => done,
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                let cancelled = scheduler.cancel_all();
                info!(cancelled, "Ctrl+C received; cancelling live tasks");
                waiting.await
            }
        }
    };

    for (name, completion) in outcomes {
        match completion {
            Completion::Succeeded(_) => summary.succeeded.push(name),
            other => {
                let reason = match other.error() {
                    Some(err) => err.to_string(),
                    None => other.state().to_string(),
                };
                summary.unsuccessful.push((name, reason));
            }
        }
    }

    scheduler.shutdown().await;
    // The UI loop ends once every dispatcher clone is gone; task records and
    // the scheduler each hold one.
    drop(handles);
    drop(scheduler);

    tokio::task::spawn_blocking(move || ui.join())
        .await?
        .map_err(|_| anyhow!("UI thread panicked"))?;

    debug!(?summary, "run complete");
    Ok(summary)
}

/// Resolve `--task` selections; all tasks when none were given.
fn select_tasks(cfg: &ConfigFile, requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(cfg.task_names().map(str::to_string).collect());
    }

    requested
        .iter()
        .map(|name| match cfg.task(name) {
            Some(_) => Ok(name.clone()),
            None => Err(RunlaneError::ConfigError(format!("unknown task '{name}'")).into()),
        })
        .collect()
}

/// Runs on the UI thread.
fn print_event(name: &str, event: &TaskEvent) {
    match &event.kind {
        TaskEventKind::StateChanged { to, .. } if !to.is_terminal() => {
            println!("[{name}] {to}");
        }
        TaskEventKind::StateChanged { .. } => {}
        TaskEventKind::Progress(progress) => match (progress.fraction, &progress.text) {
            (Some(f), Some(text)) => println!("[{name}] {:>3.0}% {text}", f * 100.0),
            (Some(f), None) => println!("[{name}] {:>3.0}%", f * 100.0),
            (None, Some(text)) => println!("[{name}] {text}"),
            (None, None) => {}
        },
        TaskEventKind::Finished(completion) => {
            if let Some(result) = completion.result() {
                for line in result.stdout_text().lines() {
                    println!("[{name}] {line}");
                }
                for line in result.stderr_text().lines() {
                    eprintln!("[{name}] {line}");
                }
                if result.truncated() {
                    println!("[{name}] (output truncated)");
                }
            }
            match completion.error() {
                Some(err) => println!("[{name}] {}: {err}", completion.state()),
                None => println!("[{name}] {}", completion.state()),
            }
        }
    }
}

fn print_dry_run(cfg: &ConfigFile, path: &Path, selected: &[String]) {
    println!("runlane dry-run ({})", path.display());
    println!("  engine.workers = {}", cfg.engine.workers);
    println!(
        "  engine.default_timeout = {}",
        cfg.engine
            .default_timeout
            .map_or_else(|| "none".to_string(), |d| format!("{d:?}"))
    );
    println!("  engine.grace_period = {:?}", cfg.engine.grace_period);
    println!("  engine.output_cap = {}", cfg.engine.output_cap);
    println!("  engine.key_policy = {:?}", cfg.engine.key_policy);
    println!();

    println!("tasks ({}):", selected.len());
    for name in selected {
        let Some(entry) = cfg.task(name) else {
            continue;
        };
        println!("  - {name}");
        println!("      cmd: {}", entry.spec.command_line());
        if let Some(key) = &entry.key {
            println!("      key: {key}");
        }
        if let Some(timeout) = entry.spec.timeout_duration() {
            println!("      timeout: {timeout:?}");
        }
        if let Some(dir) = entry.spec.working_dir() {
            println!("      cwd: {}", dir.display());
        }
        if let Some(pattern) = entry.spec.progress_pattern() {
            println!("      progress: {}", pattern.as_str());
        }
    }

    debug!("dry-run complete (no execution)");
}
