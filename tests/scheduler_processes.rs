#![cfg(unix)]

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use runlane::dispatch::UiThread;
use runlane::engine::{ExecutionKey, SchedulerConfig, TaskScheduler};
use runlane::errors::RunlaneError;
use runlane::exec::{ProcessRunner, RunnerConfig, TaskSpec};
use runlane::task::{Completion, TaskError, TaskState};
use runlane_test_utils::{init_tracing, spawn_ui, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn start(workers: usize) -> (TaskScheduler, Arc<ProcessRunner>, UiThread) {
    init_tracing();
    let runner = Arc::new(ProcessRunner::new(RunnerConfig {
        grace_period: Duration::from_millis(500),
        ..RunnerConfig::default()
    }));
    let (dispatcher, ui) = spawn_ui();
    let config = SchedulerConfig {
        workers,
        ..SchedulerConfig::default()
    };
    let scheduler = TaskScheduler::with_backend(config, dispatcher, runner.clone())
        .expect("scheduler starts");
    (scheduler, runner, ui)
}

/// True once `pid` no longer runs. An orphaned grandchild may linger as a
/// zombie until init reaps it, which counts as gone.
fn process_gone(pid: u32) -> bool {
    if unsafe { libc::kill(pid as libc::pid_t, 0) } != 0 {
        return true;
    }
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .map(|stat| {
            stat.rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quick_shell_task_succeeds() -> TestResult {
    let (scheduler, _runner, _ui) = start(2);

    let handle = scheduler.submit(
        TaskSpec::shell("sleep 0.1; echo done; echo warn >&2").timeout(Duration::from_secs(5)),
        None,
    )?;
    let result = with_timeout(handle.wait()).await.into_result()?;

    assert_eq!(result.exit_code, Some(0));
    assert!(result.stdout_text().contains("done"));
    assert!(!result.stdout_text().contains("warn"));
    assert_eq!(result.stderr_text().trim(), "warn");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn long_sleep_times_out_and_leaves_no_process() -> TestResult {
    let (scheduler, _runner, _ui) = start(2);

    let started = Instant::now();
    let handle = scheduler.submit(
        TaskSpec::new(["sleep", "5"]).timeout(Duration::from_millis(200)),
        None,
    )?;
    let completion = with_timeout(handle.wait()).await;
    let elapsed = started.elapsed();

    assert_eq!(completion.state(), TaskState::TimedOut);
    assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");

    let pid = completion.result().and_then(|r| r.pid).expect("process ran");
    // Reaped: not even a zombie is left for this pid.
    let alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
    assert!(!alive, "pid {pid} still exists");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_while_pending_never_spawns() -> TestResult {
    let (scheduler, runner, _ui) = start(1);

    let blocker = scheduler.submit(TaskSpec::new(["sleep", "0.3"]), None)?;
    let pending = scheduler.submit(TaskSpec::shell("echo should-not-run"), None)?;

    assert!(pending.cancel());
    assert!(!pending.cancel());
    assert_eq!(pending.state(), TaskState::Cancelled);

    assert!(with_timeout(blocker.wait()).await.is_success());
    assert_eq!(with_timeout(pending.wait()).await, Completion::Cancelled(None));
    assert_eq!(runner.spawn_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_binary_fails_without_timeout() -> TestResult {
    let (scheduler, runner, _ui) = start(1);

    let started = Instant::now();
    let handle = scheduler.submit(
        TaskSpec::command("nonexistent-binary-xyz").timeout(Duration::from_secs(30)),
        None,
    )?;
    let completion = with_timeout(handle.wait()).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    match completion.error() {
        Some(TaskError::Spawn(err)) => assert!(err.is_not_found()),
        other => panic!("expected spawn error, got {other:?}"),
    }
    assert_eq!(runner.spawn_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_key_is_single_flight() -> TestResult {
    let (scheduler, _runner, _ui) = start(4);
    let key = ExecutionKey::from("render:target");

    let first = scheduler.submit(TaskSpec::new(["sleep", "0.2"]), Some(key.clone()))?;
    let err = scheduler
        .submit(TaskSpec::new(["sleep", "0.2"]), Some(key.clone()))
        .unwrap_err();
    assert!(matches!(err, RunlaneError::AlreadyRunning { holder, .. } if holder == first.id()));

    assert!(with_timeout(first.wait()).await.is_success());
    assert_eq!(scheduler.key_holder(&key), None);

    let again = scheduler.submit(TaskSpec::command("true"), Some(key))?;
    assert!(with_timeout(again.wait()).await.is_success());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn huge_output_is_truncated_and_completes() -> TestResult {
    let (scheduler, _runner, _ui) = start(1);

    let handle = scheduler.submit(
        TaskSpec::shell("head -c 409600 /dev/zero")
            .output_cap(4096)
            .timeout(Duration::from_secs(5)),
        None,
    )?;
    let result = with_timeout(handle.wait()).await.into_result()?;

    assert!(result.stdout.truncated);
    assert_eq!(result.stdout.bytes.len(), 4096);
    assert_eq!(result.stdout.total_bytes, 409_600);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_running_process_terminates_its_group() -> TestResult {
    let (scheduler, _runner, _ui) = start(1);
    let dir = tempfile::tempdir()?;
    let pid_file = dir.path().join("grandchild.pid");

    let script = format!("sleep 5 & echo $! > '{}'; wait", pid_file.display());
    let handle = scheduler.submit(TaskSpec::shell(script).no_timeout(), None)?;
    let grandchild = with_timeout(async {
        loop {
            if let Some(pid) = std::fs::read_to_string(&pid_file)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok())
            {
                break pid;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(!process_gone(grandchild));

    let started = Instant::now();
    assert!(scheduler.cancel(&handle));
    let completion = with_timeout(handle.wait()).await;

    assert_eq!(completion.state(), TaskState::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));
    with_timeout(async {
        while !process_gone(grandchild) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closed_pipes_do_not_hide_a_timeout() -> TestResult {
    let (scheduler, _runner, _ui) = start(1);

    let started = Instant::now();
    let handle = scheduler.submit(
        TaskSpec::shell("exec >&- 2>&-; exec sleep 5").timeout(Duration::from_millis(200)),
        None,
    )?;
    let completion = with_timeout(handle.wait()).await;

    assert_eq!(completion.state(), TaskState::TimedOut);
    assert!(started.elapsed() < Duration::from_millis(1500));
    let pid = completion.result().and_then(|r| r.pid).expect("process ran");
    assert!(process_gone(pid), "pid {pid} still exists");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_zero_exit_reports_code_and_stderr() -> TestResult {
    let (scheduler, _runner, _ui) = start(1);

    let handle = scheduler.submit(TaskSpec::shell("echo broken >&2; exit 4"), None)?;
    let err = with_timeout(handle.wait()).await.into_result().unwrap_err();

    match &err {
        TaskError::NonZeroExit { code, stderr, .. } => {
            assert_eq!(*code, Some(4));
            assert_eq!(stderr.trim(), "broken");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "process exited with code 4");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduler_env_reaches_the_child() -> TestResult {
    init_tracing();
    let (dispatcher, _ui) = spawn_ui();
    let mut config = SchedulerConfig::default();
    config
        .env
        .insert("RUNLANE_SCOPE".to_string(), "global".to_string());
    let scheduler = TaskScheduler::new(config, dispatcher)?;

    let inherited = scheduler.submit(TaskSpec::shell("echo $RUNLANE_SCOPE"), None)?;
    let overridden = scheduler.submit(
        TaskSpec::shell("echo $RUNLANE_SCOPE").env("RUNLANE_SCOPE", "task"),
        None,
    )?;

    let inherited = with_timeout(inherited.wait()).await.into_result()?;
    let overridden = with_timeout(overridden.wait()).await.into_result()?;
    assert_eq!(inherited.stdout_text().trim(), "global");
    assert_eq!(overridden.stdout_text().trim(), "task");
    Ok(())
}
