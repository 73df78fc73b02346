use ivi_simulator::*;

mod common;

fn app(name: &str, cost: u64, footprint: u64) -> TaskDef {
    TaskDef {
        name: name.into(),
        cpu_cost: cost,
        mem_footprint: footprint,
        mode: PlatformMode::Multitask,
        ..TaskDef::default()
    }
}

/// Memory pressure backgrounds the foreground app and evicts it before the
/// new launch is dispatched; the Evict event precedes the Dispatch of the
/// newcomer.
#[test]
fn test_eviction_makes_room_for_launch() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Multitask)
        .cpus(1)
        .memory(10)
        .launch_latency(0, 0)
        .submit(app("a", 20, 6))
        .submit_at(2, app("b", 3, 6))
        .duration(10)
        .build();

    let result = Simulation::new(scenario).run();
    result.recorder.dump();

    let a = TaskId(1);
    let b = TaskId(2);

    // a ran, was backgrounded (Preempt without a preemptor), then evicted.
    let preempt = result.recorder.first_for(a, EventClass::Preempt).unwrap();
    assert_eq!(preempt.kind, EventKind::Preempt { by: None });
    let evict = result.recorder.first_for(a, EventClass::Evict).unwrap();
    assert_eq!(evict.kind, EventKind::Evict { freed: 6 });
    assert!(preempt.seq < evict.seq, "backgrounding precedes eviction");

    let dispatch_b = result.recorder.first_for(b, EventClass::Dispatch).unwrap();
    assert!(
        evict.seq < dispatch_b.seq,
        "eviction must precede the newcomer's dispatch"
    );
    assert_eq!(result.task_state(a), Some(TaskState::Evicted));
    assert_eq!(result.task_state(b), Some(TaskState::Completed));
}

/// Launching pays the configured cold-start latency before dispatch.
#[test]
fn test_launch_latency_cold_start() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Multitask)
        .cpus(1)
        .launch_latency(3, 0)
        .submit(app("cold", 2, 4))
        .duration(10)
        .build();

    let result = Simulation::new(scenario).run();
    result.recorder.dump();

    let dispatch = result
        .recorder
        .first_for(TaskId(1), EventClass::Dispatch)
        .unwrap();
    assert_eq!(dispatch.at, 3, "cold start delays readiness by 3 ticks");
    assert_eq!(
        dispatch.kind,
        EventKind::Dispatch {
            cpu: CpuId(0),
            wait: Some(3)
        },
        "response time includes the launch latency"
    );
}

/// Ready tasks share the CPU round-robin under the fairness quantum.
#[test]
fn test_round_robin_quantum() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Multitask)
        .cpus(1)
        .quantum(2)
        .launch_latency(0, 0)
        .submit(app("a", 4, 2))
        .submit(app("b", 4, 2))
        .duration(20)
        .build();

    let result = Simulation::new(scenario).run();
    result.recorder.dump();

    let a = TaskId(1);
    let b = TaskId(2);

    // a runs its quantum, rotates to b, and so on until both complete.
    let dispatches: Vec<(TaskId, u64)> = result
        .recorder
        .query()
        .of_class(EventClass::Dispatch)
        .iter()
        .map(|e| (e.task, e.at))
        .collect();
    assert_eq!(dispatches, vec![(a, 0), (b, 2), (a, 4), (b, 6)]);

    assert_eq!(result.recorder.task_class_count(a, EventClass::Preempt), 1);
    assert_eq!(result.recorder.task_class_count(b, EventClass::Preempt), 1);
    let done_a = result.recorder.first_for(a, EventClass::Complete).unwrap();
    let done_b = result.recorder.first_for(b, EventClass::Complete).unwrap();
    assert_eq!(done_a.at, 6);
    assert_eq!(done_b.at, 8);
}

/// A lone task's quantum renews silently instead of churning preemptions.
#[test]
fn test_lone_task_keeps_cpu() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Multitask)
        .cpus(1)
        .quantum(2)
        .launch_latency(0, 0)
        .submit(app("solo", 7, 2))
        .duration(10)
        .build();

    let result = Simulation::new(scenario).run();

    assert_eq!(result.recorder.class_count(EventClass::Preempt), 0);
    assert_eq!(
        result.recorder.task_class_count(TaskId(1), EventClass::Dispatch),
        1
    );
}

/// Completed apps stay cached in memory and are reclaimed first, without
/// disturbing their terminal state.
#[test]
fn test_completed_apps_are_cached_then_reclaimed() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Multitask)
        .cpus(1)
        .memory(10)
        .launch_latency(0, 0)
        .submit(app("done", 1, 6))
        .submit_at(3, app("next", 2, 6))
        .duration(10)
        .build();

    let result = Simulation::new(scenario).run();
    result.recorder.dump();

    let done = TaskId(1);
    let evict = result.recorder.first_for(done, EventClass::Evict).unwrap();
    assert_eq!(evict.at, 3, "cache reclaim happens at the next launch");
    assert_eq!(
        result.task_state(done),
        Some(TaskState::Completed),
        "reclaiming a cached app does not rewrite its terminal state"
    );
}

/// When nothing is evictable the submission fails with ResourceExhausted,
/// and nothing is evicted as a side effect.
#[test]
fn test_no_evictable_candidate() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Multitask)
        .cpus(1)
        .memory(10)
        .launch_latency(5, 0)
        .duration(10)
        .build();
    let mut sim = Simulation::new(scenario);

    // Still launching: resident but pinned until it becomes ready.
    sim.submit(app("launching", 2, 5)).unwrap();
    sim.run_until(1);

    let err = sim.submit(app("wedged", 2, 6)).unwrap_err();
    assert_eq!(
        err,
        SubmitError::ResourceExhausted {
            needed: 6,
            available: 5
        }
    );
    assert_eq!(sim.task_state(TaskId(2)), Some(TaskState::AdmissionRejected));
    assert_eq!(sim.task_state(TaskId(1)), Some(TaskState::Pending));
}

/// A footprint beyond the whole memory budget is an over-budget rejection.
#[test]
fn test_footprint_beyond_capacity() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Multitask)
        .cpus(1)
        .memory(10)
        .duration(5)
        .build();
    let mut sim = Simulation::new(scenario);

    let err = sim.submit(app("huge", 1, 11)).unwrap_err();
    assert_eq!(
        err,
        SubmitError::AdmissionRejected {
            needed: 11,
            available: 10
        }
    );
}

/// Launch jitter is drawn from the scenario seed: identical seeds replay
/// identically.
#[test]
fn test_launch_jitter_determinism() {
    common::setup_test();
    let make = |seed| {
        Scenario::builder()
            .mode(PlatformMode::Multitask)
            .cpus(2)
            .launch_latency(2, 4)
            .seed(seed)
            .submit(app("a", 3, 2))
            .submit(app("b", 3, 2))
            .submit_at(4, app("c", 3, 2))
            .duration(30)
            .build()
    };

    let first = Simulation::new(make(7)).run();
    let second = Simulation::new(make(7)).run();
    assert_eq!(first.recorder.events(), second.recorder.events());

    // Jitter stays within [base, base + jitter].
    for event in first.recorder.query().of_class(EventClass::Dispatch) {
        if let EventKind::Dispatch { wait: Some(w), .. } = event.kind {
            assert!((2..=6).contains(&w), "wait {w} outside jitter bounds");
        }
    }
}
