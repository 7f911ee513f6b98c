use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use runlane::engine::{Admission, ExecutionKey, KeyRegistry, SchedulerConfig, Submission, TaskScheduler};
use runlane::exec::TaskSpec;
use runlane::task::{TaskEventKind, TaskId, TaskState};
use runlane::types::KeyPolicy;
use runlane_test_utils::fake_backend::{FakeBackend, FakeBehavior};
use runlane_test_utils::{init_tracing, spawn_ui, EventRecorder};

fn rank(state: TaskState) -> u8 {
    match state {
        TaskState::Pending => 0,
        TaskState::Running => 1,
        _ => 2,
    }
}

/// Per task: behaviour selector, whether to cancel it, delay in ms.
type Plan = Vec<(u8, bool, u64)>;

struct Observed {
    states: Vec<(TaskId, Vec<TaskState>, usize, bool)>,
    final_states: Vec<TaskState>,
    ran: usize,
    launches: usize,
}

fn run_plan(plan: &Plan, workers: usize) -> Observed {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let backend = Arc::new(FakeBackend::new());
        backend.script("bad", FakeBehavior::exit(1));
        backend.script("slow", FakeBehavior::Sleep(Duration::from_millis(15)));

        let (dispatcher, _ui) = spawn_ui();
        let config = SchedulerConfig {
            workers,
            ..SchedulerConfig::default()
        };
        let scheduler =
            TaskScheduler::with_backend(config, dispatcher, backend.clone()).expect("scheduler");
        let recorder = EventRecorder::new();

        let mut handles = Vec::with_capacity(plan.len());
        for (behavior, _, _) in plan {
            let program = match behavior {
                0 => "ok",
                1 => "bad",
                _ => "slow",
            };
            let handle = scheduler
                .submit_with(
                    TaskSpec::command(program),
                    Submission::new().on_event(recorder.listener()),
                )
                .expect("submit");
            handles.push(handle);
        }

        for (handle, (_, cancel, delay)) in handles.iter().zip(plan) {
            if *cancel {
                tokio::time::sleep(Duration::from_millis(*delay)).await;
                handle.cancel();
            }
        }

        let mut final_states = Vec::new();
        let mut ran = 0;
        for handle in &handles {
            let completion = handle.wait().await;
            if completion.result().is_some() {
                ran += 1;
            }
            final_states.push(completion.state());
        }
        recorder.wait_finished(handles.len()).await;

        let events = recorder.events();
        let states = handles
            .iter()
            .map(|h| {
                let mine: Vec<_> = events.iter().filter(|e| e.task_id == h.id()).collect();
                let finished = mine
                    .iter()
                    .filter(|e| matches!(e.kind, TaskEventKind::Finished(_)))
                    .count();
                let finished_last = mine
                    .last()
                    .is_some_and(|e| matches!(e.kind, TaskEventKind::Finished(_)));
                (h.id(), recorder.states_of(h.id()), finished, finished_last)
            })
            .collect();

        scheduler.shutdown().await;

        Observed {
            states,
            final_states,
            ran,
            launches: backend.launch_count(),
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn cancel_and_completion_interleavings_stay_monotonic(
        plan in proptest::collection::vec((0u8..3, any::<bool>(), 0u64..20), 1..8),
        workers in 1usize..3,
    ) {
        let observed = run_plan(&plan, workers);

        for ((id, states, finished, finished_last), final_state) in
            observed.states.iter().zip(&observed.final_states)
        {
            prop_assert_eq!(*finished, 1, "task {} finished {} times", id, finished);
            prop_assert!(*finished_last, "task {}: Finished was not the last event", id);

            let mut prev = TaskState::Pending;
            for next in states {
                prop_assert!(rank(*next) > rank(prev), "task {}: {:?}", id, states);
                prev = *next;
            }
            prop_assert_eq!(states.last(), Some(final_state));
        }

        // Cancellation never causes a launch; every launch produced a result.
        prop_assert_eq!(observed.launches, observed.ran);
    }

    #[test]
    fn key_registry_matches_fifo_model(
        ops in proptest::collection::vec((0usize..3, any::<bool>()), 1..60),
    ) {
        let keys = ["a", "b", "c"].map(ExecutionKey::from);
        let mut registry: KeyRegistry<u64> = KeyRegistry::new();
        let mut model: HashMap<usize, (u64, VecDeque<u64>)> = HashMap::new();
        let mut next_id = 0u64;

        for (k, admit) in ops {
            let key = &keys[k];
            if admit {
                next_id += 1;
                match registry.admit(key, TaskId::new(next_id), KeyPolicy::Queue, next_id) {
                    Admission::Acquired => {
                        prop_assert!(!model.contains_key(&k));
                        model.insert(k, (next_id, VecDeque::new()));
                    }
                    Admission::Queued { position } => {
                        let entry = model.get_mut(&k).expect("held key");
                        entry.1.push_back(next_id);
                        prop_assert_eq!(position, entry.1.len());
                    }
                    Admission::Rejected { .. } => prop_assert!(false, "queue policy never rejects"),
                }
            } else if let Some((holder, mut waiting)) = model.remove(&k) {
                let promoted = registry.release(key, TaskId::new(holder));
                match waiting.pop_front() {
                    Some(next) => {
                        prop_assert_eq!(promoted, Some((TaskId::new(next), next)));
                        model.insert(k, (next, waiting));
                    }
                    None => prop_assert_eq!(promoted, None),
                }
            } else {
                prop_assert_eq!(registry.release(key, TaskId::new(0)), None);
            }

            for (i, key) in keys.iter().enumerate() {
                prop_assert_eq!(
                    registry.holder(key),
                    model.get(&i).map(|(h, _)| TaskId::new(*h))
                );
                prop_assert_eq!(registry.waiting(key), model.get(&i).map_or(0, |(_, w)| w.len()));
            }
        }
    }
}
