use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tokio::time::sleep;

use runlane::dispatch::{ResultDispatcher, UiContext, UiThread};
use runlane::engine::{ExecutionKey, SchedulerConfig, Submission, TaskScheduler};
use runlane::errors::RunlaneError;
use runlane::exec::{ProgressPattern, TaskSpec};
use runlane::task::{Completion, TaskError, TaskEventKind, TaskState};
use runlane::types::KeyPolicy;
use runlane_test_utils::fake_backend::{FakeBackend, FakeBehavior};
use runlane_test_utils::{init_tracing, spawn_ui, with_timeout, EventRecorder};

type TestResult = Result<(), Box<dyn Error>>;

fn start(backend: &Arc<FakeBackend>, config: SchedulerConfig) -> (TaskScheduler, UiThread) {
    init_tracing();
    let (dispatcher, ui) = spawn_ui();
    let scheduler = TaskScheduler::with_backend(config, dispatcher, backend.clone())
        .expect("scheduler starts inside a runtime");
    (scheduler, ui)
}

fn workers(n: usize) -> SchedulerConfig {
    SchedulerConfig {
        workers: n,
        ..SchedulerConfig::default()
    }
}

fn job(name: &str) -> TaskSpec {
    TaskSpec::command(name)
}

/// Resolve once everything posted so far has been delivered.
async fn flush_ui(dispatcher: &ResultDispatcher) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    dispatcher.post_to_ui_thread(move || {
        let _ = tx.send(());
    });
    with_timeout(rx).await.expect("UI loop alive");
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    with_timeout(async {
        while !cond() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

#[tokio::test]
async fn events_arrive_in_order_on_the_ui_thread() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    let (scheduler, ui) = start(&backend, workers(2));
    let recorder = EventRecorder::new();

    let handle = scheduler.submit_with(job("echo"), Submission::new().on_event(recorder.listener()))?;
    let completion = with_timeout(handle.wait()).await;
    recorder.wait_finished(1).await;

    assert!(completion.is_success());
    assert_eq!(
        recorder.states_of(handle.id()),
        vec![TaskState::Running, TaskState::Succeeded]
    );

    let events = recorder.events();
    assert!(matches!(
        events.first().map(|e| &e.kind),
        Some(TaskEventKind::StateChanged { from: TaskState::Pending, to: TaskState::Running })
    ));
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(TaskEventKind::Finished(Completion::Succeeded(_)))
    ));
    assert!(recorder.threads().iter().all(|t| *t == ui.id()));
    Ok(())
}

#[tokio::test]
async fn on_complete_runs_once_on_the_ui_thread() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    backend.script("fail", FakeBehavior::exit(3));
    let (scheduler, ui) = start(&backend, workers(1));

    let (tx, rx) = mpsc::channel();
    let handle = scheduler.submit_with(
        job("fail"),
        Submission::new().on_complete(move |completion| {
            let _ = tx.send((std::thread::current().id(), completion.clone()));
        }),
    )?;

    with_timeout(handle.wait()).await;
    let (thread, completion) =
        tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5))).await??;

    assert_eq!(thread, ui.id());
    match completion {
        Completion::Failed(TaskError::NonZeroExit { code, .. }) => assert_eq!(code, Some(3)),
        other => panic!("unexpected completion: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn concurrency_is_bounded_by_worker_count() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Gated));
    let (scheduler, _ui) = start(&backend, workers(2));

    let handles = (0..5)
        .map(|i| scheduler.submit(job(&format!("job{i}")), None))
        .collect::<Result<Vec<_>, _>>()?;

    with_timeout(backend.wait_for_launches(2)).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.launch_count(), 2);
    assert_eq!(scheduler.live_count(), 5);

    backend.release(5);
    for handle in &handles {
        assert!(with_timeout(handle.wait()).await.is_success());
    }
    assert_eq!(backend.launch_count(), 5);
    eventually(|| scheduler.live_count() == 0).await;
    Ok(())
}

#[tokio::test]
async fn duplicate_key_is_rejected_then_accepted_after_release() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Gated));
    let (scheduler, _ui) = start(&backend, workers(4));
    let key = ExecutionKey::from("refresh");
    let rejected_events = EventRecorder::new();

    let first = scheduler.submit(job("sync"), Some(key.clone()))?;
    assert_eq!(scheduler.key_holder(&key), Some(first.id()));

    let err = scheduler
        .submit_with(
            job("sync"),
            Submission::new()
                .key(key.clone())
                .on_event(rejected_events.listener()),
        )
        .unwrap_err();
    match err {
        RunlaneError::AlreadyRunning { key: k, holder } => {
            assert_eq!(k, "refresh");
            assert_eq!(holder, first.id());
        }
        other => panic!("unexpected error: {other:?}"),
    }

    backend.release(1);
    assert!(with_timeout(first.wait()).await.is_success());
    assert_eq!(scheduler.key_holder(&key), None);
    assert_eq!(scheduler.live_count(), 0);

    let second = scheduler.submit(job("sync"), Some(key.clone()))?;
    backend.release(1);
    assert!(with_timeout(second.wait()).await.is_success());

    flush_ui(scheduler.dispatcher()).await;
    assert!(rejected_events.events().is_empty());
    assert_eq!(backend.launch_count(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn key_is_free_as_soon_as_wait_returns() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    let (scheduler, _ui) = start(&backend, workers(4));
    let key = ExecutionKey::from("k");

    for round in 0..200 {
        let handle = scheduler.submit(job("true"), Some(key.clone()))?;
        let completion = with_timeout(handle.wait()).await;
        assert!(completion.is_success(), "round {round}: {completion:?}");
        assert_eq!(scheduler.key_holder(&key), None, "round {round}");
        assert_eq!(scheduler.live_count(), 0, "round {round}");
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn on_complete_can_resubmit_the_same_key() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    let (dispatcher, _ui) = spawn_ui();
    init_tracing();
    let scheduler = Arc::new(TaskScheduler::with_backend(
        workers(2),
        dispatcher,
        backend.clone(),
    )?);
    let key = ExecutionKey::from("chain");
    let (tx, rx) = tokio::sync::oneshot::channel();

    let resubmitter = scheduler.clone();
    let chained_key = key.clone();
    let first = scheduler.submit_with(
        job("first"),
        Submission::new().key(key.clone()).on_complete(move |_| {
            let next = resubmitter
                .submit(job("second"), Some(chained_key))
                .map_err(|e| e.to_string());
            let _ = tx.send(next);
        }),
    )?;

    assert!(with_timeout(first.wait()).await.is_success());
    let second = with_timeout(rx).await?.map_err(|e| format!("resubmit from on_complete: {e}"))?;
    assert!(with_timeout(second.wait()).await.is_success());
    assert_eq!(scheduler.key_holder(&key), None);
    assert_eq!(backend.launch_count(), 2);
    Ok(())
}

#[tokio::test]
async fn different_keys_run_concurrently() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Gated));
    let (scheduler, _ui) = start(&backend, workers(4));

    let a = scheduler.submit(job("a"), Some("alpha".into()))?;
    let b = scheduler.submit(job("b"), Some("beta".into()))?;

    with_timeout(backend.wait_for_launches(2)).await;
    backend.release(2);
    assert!(with_timeout(a.wait()).await.is_success());
    assert!(with_timeout(b.wait()).await.is_success());
    Ok(())
}

#[tokio::test]
async fn queue_policy_runs_waiters_in_submission_order() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Gated));
    let config = SchedulerConfig {
        key_policy: KeyPolicy::Queue,
        ..workers(4)
    };
    let (scheduler, _ui) = start(&backend, config);
    let key = ExecutionKey::from("deploy");

    let handles = ["one", "two", "three"]
        .into_iter()
        .map(|name| scheduler.submit(TaskSpec::new(["deploy", name]), Some(key.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    with_timeout(backend.wait_for_launches(1)).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.launch_count(), 1);
    assert_eq!(handles[1].state(), TaskState::Pending);
    assert_eq!(handles[2].state(), TaskState::Pending);

    backend.release(3);
    for handle in &handles {
        assert!(with_timeout(handle.wait()).await.is_success());
    }

    let order: Vec<String> = backend.launched().into_iter().map(|argv| argv[1].clone()).collect();
    assert_eq!(order, vec!["one", "two", "three"]);
    eventually(|| scheduler.key_holder(&key).is_none()).await;
    Ok(())
}

#[tokio::test]
async fn cancelled_waiter_is_skipped() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Gated));
    let (scheduler, _ui) = start(&backend, workers(4));
    let key = ExecutionKey::from("deploy");

    let submit = |name: &str| {
        scheduler.submit_with(
            TaskSpec::new(["deploy", name]),
            Submission::new().key(key.clone()).policy(KeyPolicy::Queue),
        )
    };
    let first = submit("one")?;
    let second = submit("two")?;
    let third = submit("three")?;

    with_timeout(backend.wait_for_launches(1)).await;
    assert!(second.cancel());
    assert_eq!(second.completion(), Some(Completion::Cancelled(None)));

    backend.release(2);
    assert!(with_timeout(first.wait()).await.is_success());
    assert!(with_timeout(third.wait()).await.is_success());

    let order: Vec<String> = backend.launched().into_iter().map(|argv| argv[1].clone()).collect();
    assert_eq!(order, vec!["one", "three"]);
    Ok(())
}

#[tokio::test]
async fn cancelling_a_pending_task_never_launches_it() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Gated));
    let (scheduler, _ui) = start(&backend, workers(1));
    let recorder = EventRecorder::new();

    let busy = scheduler.submit(job("busy"), None)?;
    with_timeout(backend.wait_for_launches(1)).await;

    let waiting = scheduler.submit_with(job("waiting"), Submission::new().on_event(recorder.listener()))?;
    assert_eq!(waiting.state(), TaskState::Pending);

    assert!(scheduler.cancel(&waiting));
    assert_eq!(waiting.state(), TaskState::Cancelled);
    // Cancelling twice is harmless.
    assert!(!scheduler.cancel(&waiting));
    assert!(!waiting.cancel());

    backend.release(1);
    assert!(with_timeout(busy.wait()).await.is_success());
    assert_eq!(with_timeout(waiting.wait()).await, Completion::Cancelled(None));

    recorder.wait_finished(1).await;
    assert_eq!(recorder.states_of(waiting.id()), vec![TaskState::Cancelled]);

    eventually(|| scheduler.live_count() == 0).await;
    sleep(Duration::from_millis(20)).await;
    assert_eq!(backend.launch_count(), 1);
    Ok(())
}

#[tokio::test]
async fn cancelling_a_running_task_stops_it() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Hang));
    let (scheduler, _ui) = start(&backend, workers(1));

    let handle = scheduler.submit(job("hang").no_timeout(), None)?;
    with_timeout(backend.wait_for_launches(1)).await;
    assert_eq!(handle.state(), TaskState::Running);

    assert!(handle.cancel());
    let completion = with_timeout(handle.wait()).await;

    assert_eq!(completion.state(), TaskState::Cancelled);
    assert!(completion.result().is_some(), "a process did run");
    assert!(!handle.cancel());
    Ok(())
}

#[tokio::test]
async fn cancel_after_natural_exit_keeps_the_outcome() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    let (scheduler, _ui) = start(&backend, workers(1));

    let handle = scheduler.submit(job("quick"), None)?;
    assert!(with_timeout(handle.wait()).await.is_success());

    assert!(!scheduler.cancel(&handle));
    assert!(handle.completion().is_some_and(|c| c.is_success()));
    Ok(())
}

#[tokio::test]
async fn cancel_by_id_and_cancel_all() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Hang));
    let (scheduler, _ui) = start(&backend, workers(2));

    let a = scheduler.submit(job("a").no_timeout(), None)?;
    let b = scheduler.submit(job("b").no_timeout(), None)?;
    let c = scheduler.submit(job("c").no_timeout(), None)?;
    with_timeout(backend.wait_for_launches(2)).await;

    assert!(scheduler.cancel_id(a.id()));
    assert_eq!(with_timeout(a.wait()).await.state(), TaskState::Cancelled);
    eventually(|| scheduler.live_count() == 2).await;

    assert_eq!(scheduler.cancel_all(), 2);
    assert_eq!(with_timeout(b.wait()).await.state(), TaskState::Cancelled);
    assert_eq!(with_timeout(c.wait()).await.state(), TaskState::Cancelled);
    assert!(!scheduler.cancel_id(a.id()));
    Ok(())
}

#[tokio::test]
async fn cancel_drops_pending_progress_but_not_the_final_event() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Hang));
    let (scheduler, _ui) = start(&backend, workers(1));
    let recorder = EventRecorder::new();
    let completed = Arc::new(AtomicBool::new(false));
    let done = completed.clone();

    let handle = scheduler.submit_with(
        job("hang").no_timeout(),
        Submission::new()
            .on_event(recorder.listener())
            .on_complete(move |_| done.store(true, Ordering::SeqCst)),
    )?;
    with_timeout(backend.wait_for_launches(1)).await;
    handle.cancel();

    with_timeout(handle.wait()).await;
    recorder.wait_finished(1).await;

    assert!(completed.load(Ordering::SeqCst));
    assert_eq!(recorder.states_of(handle.id()).last(), Some(&TaskState::Cancelled));
    assert_eq!(recorder.finished_count(), 1);
    Ok(())
}

#[tokio::test]
async fn spawn_failure_becomes_failed_task() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    backend.script("missing-tool", FakeBehavior::SpawnError);
    let (scheduler, _ui) = start(&backend, workers(1));

    let handle = scheduler.submit(job("missing-tool"), None)?;
    let completion = with_timeout(handle.wait()).await;

    match completion.error() {
        Some(TaskError::Spawn(err)) => assert!(err.is_not_found()),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(backend.launch_count(), 0);
    Ok(())
}

#[tokio::test]
async fn panicking_backend_fails_the_task_but_not_the_pool() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    backend.script("explode", FakeBehavior::Panic);
    let (scheduler, _ui) = start(&backend, workers(1));

    let bad = scheduler.submit(job("explode"), None)?;
    match with_timeout(bad.wait()).await {
        Completion::Failed(TaskError::Scheduler(msg)) => assert!(msg.contains("panicked"), "{msg}"),
        other => panic!("unexpected completion: {other:?}"),
    }

    let good = scheduler.submit(job("fine"), None)?;
    assert!(with_timeout(good.wait()).await.is_success());
    Ok(())
}

#[tokio::test]
async fn spec_timeout_marks_task_timed_out() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Hang));
    let (scheduler, _ui) = start(&backend, workers(1));

    let handle = scheduler.submit(job("hang").timeout(Duration::from_millis(100)), None)?;
    let completion = with_timeout(handle.wait()).await;

    assert_eq!(completion.state(), TaskState::TimedOut);
    assert!(completion.error().is_none());
    assert!(matches!(
        completion.into_result(),
        Err(TaskError::Timeout { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn scheduler_default_timeout_fills_unset_specs() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Hang));
    let config = SchedulerConfig {
        default_timeout: Some(Duration::from_millis(100)),
        ..workers(2)
    };
    let (scheduler, _ui) = start(&backend, config);

    let defaulted = scheduler.submit(job("hang"), None)?;
    let explicit = scheduler.submit(job("hang").timeout(Duration::from_secs(60)), None)?;
    let unlimited = scheduler.submit(job("hang").no_timeout(), None)?;

    assert_eq!(defaulted.spec().timeout_duration(), Some(Duration::from_millis(100)));
    assert_eq!(explicit.spec().timeout_duration(), Some(Duration::from_secs(60)));
    assert_eq!(unlimited.spec().timeout_duration(), None);

    assert_eq!(with_timeout(defaulted.wait()).await.state(), TaskState::TimedOut);
    scheduler.cancel_all();
    Ok(())
}

#[tokio::test]
async fn progress_lines_become_progress_events() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Lines(vec![
        "10% fetching".to_string(),
        "noise".to_string(),
        "50% building".to_string(),
    ])));
    let (scheduler, _ui) = start(&backend, workers(1));
    let recorder = EventRecorder::new();

    let spec = job("build").progress(ProgressPattern::new(r"(?P<percent>\d+)% (?P<text>.*)")?);
    let handle = scheduler.submit_with(spec, Submission::new().on_event(recorder.listener()))?;

    assert!(with_timeout(handle.wait()).await.is_success());
    recorder.wait_finished(1).await;

    let fractions: Vec<Option<f64>> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            TaskEventKind::Progress(p) => Some(p.fraction),
            _ => None,
        })
        .collect();
    assert_eq!(fractions, vec![Some(0.1), Some(0.5)]);
    assert_eq!(
        handle.progress().and_then(|p| p.text),
        Some("building".to_string())
    );

    // Progress sits between Running and the terminal transition.
    let kinds: Vec<&'static str> = recorder
        .events()
        .iter()
        .map(|e| match e.kind {
            TaskEventKind::StateChanged { .. } => "state",
            TaskEventKind::Progress(_) => "progress",
            TaskEventKind::Finished(_) => "finished",
        })
        .collect();
    assert_eq!(kinds, vec!["state", "progress", "progress", "state", "finished"]);
    Ok(())
}

#[tokio::test]
async fn global_subscribers_see_every_task_until_unsubscribed() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    let (scheduler, _ui) = start(&backend, workers(2));
    let global = EventRecorder::new();
    let local = EventRecorder::new();

    let sub = scheduler.subscribe(global.shared_listener());
    let first = scheduler.submit(job("one"), None)?;
    with_timeout(first.wait()).await;
    global.wait_finished(1).await;

    assert!(scheduler.unsubscribe(sub));
    assert!(!scheduler.unsubscribe(sub));

    let second = scheduler.submit_with(job("two"), Submission::new().on_event(local.listener()))?;
    with_timeout(second.wait()).await;
    local.wait_finished(1).await;

    assert!(global.events().iter().all(|e| e.task_id == first.id()));
    assert_eq!(global.finished_count(), 1);
    Ok(())
}

#[tokio::test]
async fn closed_context_receives_nothing() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    let (scheduler, _ui) = start(&backend, workers(1));
    let recorder = EventRecorder::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let context = UiContext::new();
    context.close();

    let handle = scheduler.submit_with(
        job("echo"),
        Submission::new()
            .context(context)
            .on_event(recorder.listener())
            .on_complete(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    )?;

    // The task itself still runs to completion.
    assert!(with_timeout(handle.wait()).await.is_success());
    flush_ui(scheduler.dispatcher()).await;

    assert!(recorder.events().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn wait_blocking_works_from_a_plain_thread() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Sleep(Duration::from_millis(50))));
    let (scheduler, _ui) = start(&backend, workers(1));

    let handle = scheduler.submit(job("slow"), None)?;
    let blocking = handle.clone();
    let completion = tokio::task::spawn_blocking(move || blocking.wait_blocking()).await?;
    assert!(completion.is_success());

    let again = handle.clone();
    let bounded =
        tokio::task::spawn_blocking(move || again.wait_blocking_timeout(Duration::from_millis(10)))
            .await?;
    assert!(bounded.is_some_and(|c| c.is_success()));
    Ok(())
}

#[tokio::test]
async fn wait_blocking_timeout_gives_up() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Hang));
    let (scheduler, _ui) = start(&backend, workers(1));

    let handle = scheduler.submit(job("hang").no_timeout(), None)?;
    let probe = handle.clone();
    let result =
        tokio::task::spawn_blocking(move || probe.wait_blocking_timeout(Duration::from_millis(50)))
            .await?;

    assert!(result.is_none());
    handle.cancel();
    Ok(())
}

#[tokio::test]
async fn state_watch_reports_terminal_state() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    let (scheduler, _ui) = start(&backend, workers(1));

    let handle = scheduler.submit(job("echo"), None)?;
    let mut states = handle.subscribe_state();
    let reached = with_timeout(states.wait_for(|s| s.is_terminal())).await?;

    assert_eq!(*reached, TaskState::Succeeded);
    Ok(())
}

#[tokio::test]
async fn invalid_spec_is_rejected_at_submit() {
    let backend = Arc::new(FakeBackend::new());
    let (scheduler, _ui) = start(&backend, workers(1));

    let err = scheduler
        .submit(TaskSpec::new(Vec::<String>::new()), None)
        .unwrap_err();

    assert!(matches!(err, RunlaneError::InvalidSpec(_)));
    assert_eq!(scheduler.live_count(), 0);
}

#[tokio::test]
async fn shutdown_cancels_live_tasks_and_refuses_new_ones() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Hang));
    let (scheduler, _ui) = start(&backend, workers(1));

    let running = scheduler.submit(job("hang").no_timeout(), None)?;
    let queued = scheduler.submit(job("hang").no_timeout(), None)?;
    with_timeout(backend.wait_for_launches(1)).await;

    with_timeout(scheduler.shutdown()).await;

    assert!(scheduler.is_closed());
    assert_eq!(running.completion().map(|c| c.state()), Some(TaskState::Cancelled));
    assert_eq!(queued.completion(), Some(Completion::Cancelled(None)));
    assert_eq!(backend.launch_count(), 1);
    assert!(matches!(
        scheduler.submit(job("late"), None),
        Err(RunlaneError::SchedulerClosed)
    ));
    Ok(())
}

#[tokio::test]
async fn dropping_the_scheduler_cancels_running_tasks() -> TestResult {
    let backend = Arc::new(FakeBackend::with_default(FakeBehavior::Hang));
    let (scheduler, _ui) = start(&backend, workers(1));

    let handle = scheduler.submit(job("hang").no_timeout(), None)?;
    with_timeout(backend.wait_for_launches(1)).await;

    drop(scheduler);

    assert_eq!(with_timeout(handle.wait()).await.state(), TaskState::Cancelled);
    Ok(())
}

#[test]
fn creating_a_scheduler_outside_a_runtime_fails() {
    let (dispatcher, _ui) = runlane::dispatch::channel();
    let result = TaskScheduler::new(SchedulerConfig::default(), dispatcher);

    assert!(matches!(result, Err(RunlaneError::NoRuntime)));
}

#[tokio::test]
async fn zero_workers_is_a_config_error() {
    let (dispatcher, _ui) = runlane::dispatch::channel();
    let result = TaskScheduler::new(workers(0), dispatcher);

    assert!(matches!(result, Err(RunlaneError::ConfigError(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_waits_and_state_watch_follow_the_task() -> TestResult {
    let backend = Arc::new(FakeBackend::new());
    backend.script("slow", FakeBehavior::Sleep(Duration::from_millis(100)));
    let (scheduler, _ui) = start(&backend, workers(1));

    let handle = scheduler.submit(job("slow"), None)?;
    let mut states = handle.subscribe_state();

    let early = handle.clone();
    let timed_out =
        tokio::task::spawn_blocking(move || early.wait_blocking_timeout(Duration::from_millis(5)))
            .await?;
    assert!(timed_out.is_none());

    let blocking = handle.clone();
    let completion = with_timeout(tokio::task::spawn_blocking(move || blocking.wait_blocking())).await?;
    assert!(completion.is_success());

    with_timeout(states.wait_for(|s| s.is_terminal())).await?;
    assert_eq!(*states.borrow(), TaskState::Succeeded);
    assert_eq!(
        handle.wait_blocking_timeout(Duration::ZERO),
        Some(completion)
    );
    Ok(())
}
