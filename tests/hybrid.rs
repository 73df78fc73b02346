use ivi_simulator::*;

mod common;

/// Both classes run on their own CPU partition under one clock, and
/// same-tick events order RT before multitask in the merged stream.
#[test]
fn test_partitions_and_merged_ordering() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Hybrid)
        .cpus(2)
        .launch_latency(0, 0)
        .submit(TaskDef {
            name: "control".into(),
            priority: Priority(12),
            cpu_cost: 3,
            mode: PlatformMode::Rt,
            ..TaskDef::default()
        })
        .submit(TaskDef {
            name: "media".into(),
            priority: Priority(3),
            cpu_cost: 3,
            mode: PlatformMode::Multitask,
            ..TaskDef::default()
        })
        .duration(10)
        .build();

    let result = Simulation::new(scenario).run();
    result.recorder.dump();

    let control = TaskId(1);
    let media = TaskId(2);

    let d_rt = result.recorder.first_for(control, EventClass::Dispatch).unwrap();
    let d_mt = result.recorder.first_for(media, EventClass::Dispatch).unwrap();
    assert_eq!(d_rt.at, 0);
    assert_eq!(d_mt.at, 0);
    assert_eq!(d_rt.kind, EventKind::Dispatch { cpu: CpuId(0), wait: Some(0) });
    assert_eq!(d_mt.kind, EventKind::Dispatch { cpu: CpuId(1), wait: Some(0) });
    assert!(
        d_rt.seq < d_mt.seq,
        "same-tick ties order RT events before multitask events"
    );

    // Completions at the same tick obey the same ordering.
    let c_rt = result.recorder.first_for(control, EventClass::Complete).unwrap();
    let c_mt = result.recorder.first_for(media, EventClass::Complete).unwrap();
    assert_eq!(c_rt.at, c_mt.at);
    assert!(c_rt.seq < c_mt.seq);
}

/// Tasks submitted with mode Hybrid auto-route by priority.
#[test]
fn test_auto_route_by_priority() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Hybrid)
        .cpus(2)
        .rt_threshold(Priority(10))
        .launch_latency(2, 0)
        .submit(TaskDef {
            name: "urgent".into(),
            priority: Priority(11),
            cpu_cost: 2,
            ..TaskDef::default()
        })
        .submit(TaskDef {
            name: "casual".into(),
            priority: Priority(2),
            cpu_cost: 2,
            ..TaskDef::default()
        })
        .duration(10)
        .build();

    let result = Simulation::new(scenario).run();
    result.recorder.dump();

    // The urgent task lands on the RT partition: no launch latency.
    let urgent = result.recorder.first_for(TaskId(1), EventClass::Dispatch).unwrap();
    assert_eq!(urgent.at, 0);
    assert_eq!(urgent.kind, EventKind::Dispatch { cpu: CpuId(0), wait: Some(0) });

    // The casual task pays the multitask cold start on the other partition.
    let casual = result.recorder.first_for(TaskId(2), EventClass::Dispatch).unwrap();
    assert_eq!(casual.at, 2);
    assert_eq!(casual.kind, EventKind::Dispatch { cpu: CpuId(1), wait: Some(2) });
}

/// The shared memory budget is arbitrated across partitions: an RT
/// admission may reclaim a cached multitask resident.
#[test]
fn test_cross_partition_memory_arbitration() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Hybrid)
        .cpus(2)
        .memory(10)
        .launch_latency(0, 0)
        .submit(TaskDef {
            name: "app".into(),
            priority: Priority(1),
            cpu_cost: 2,
            mem_footprint: 8,
            mode: PlatformMode::Multitask,
            ..TaskDef::default()
        })
        .submit_at(4, TaskDef {
            name: "alarm".into(),
            priority: Priority(12),
            cpu_cost: 1,
            mem_footprint: 6,
            mode: PlatformMode::Rt,
            ..TaskDef::default()
        })
        .duration(10)
        .build();

    let result = Simulation::new(scenario).run();
    result.recorder.dump();

    let app = TaskId(1);
    let alarm = TaskId(2);

    // The app completed at t=2 and stayed cached; the RT admission at t=4
    // reclaims it under the uniform eviction policy.
    let evict = result.recorder.first_for(app, EventClass::Evict).unwrap();
    assert_eq!(evict.at, 4);
    assert_eq!(evict.kind, EventKind::Evict { freed: 8 });
    assert_eq!(result.task_state(app), Some(TaskState::Completed));

    let dispatch = result.recorder.first_for(alarm, EventClass::Dispatch).unwrap();
    assert_eq!(dispatch.at, 4);
    assert!(evict.seq < dispatch.seq);
    assert_eq!(result.task_state(alarm), Some(TaskState::Completed));
}

/// An RT submission that cannot reclaim enough memory fails locally; the
/// simulation carries on.
#[test]
fn test_rt_memory_rejection_is_local() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Hybrid)
        .cpus(2)
        .memory(10)
        .launch_latency(0, 0)
        .duration(10)
        .build();
    let mut sim = Simulation::new(scenario);

    // Long-running multitask app holds memory and is never evictable
    // while on CPU.
    let app = sim
        .submit(TaskDef {
            name: "app".into(),
            priority: Priority(1),
            cpu_cost: 20,
            mem_footprint: 8,
            mode: PlatformMode::Multitask,
            ..TaskDef::default()
        })
        .unwrap();
    sim.run_until(2);

    let err = sim
        .submit(TaskDef {
            name: "alarm".into(),
            priority: Priority(12),
            cpu_cost: 1,
            mem_footprint: 6,
            mode: PlatformMode::Rt,
            ..TaskDef::default()
        })
        .unwrap_err();
    assert_eq!(
        err,
        SubmitError::ResourceExhausted {
            needed: 6,
            available: 2
        }
    );

    // The running app is untouched and the platform keeps scheduling.
    sim.run_until(10);
    assert!(matches!(
        sim.task_state(app),
        Some(TaskState::Running { .. })
    ));
}

/// A pinned partition split caps each class at its own CPU units.
#[test]
fn test_partition_caps_parallelism() {
    common::setup_test();
    let scenario = Scenario::builder()
        .mode(PlatformMode::Hybrid)
        .cpus(3)
        .rt_partition(1)
        .launch_latency(0, 0)
        .submit(TaskDef {
            name: "rt-a".into(),
            priority: Priority(12),
            cpu_cost: 4,
            mode: PlatformMode::Rt,
            ..TaskDef::default()
        })
        .submit(TaskDef {
            name: "rt-b".into(),
            priority: Priority(12),
            cpu_cost: 4,
            mode: PlatformMode::Rt,
            ..TaskDef::default()
        })
        .submit(TaskDef {
            name: "mt-a".into(),
            priority: Priority(1),
            cpu_cost: 4,
            mode: PlatformMode::Multitask,
            ..TaskDef::default()
        })
        .submit(TaskDef {
            name: "mt-b".into(),
            priority: Priority(1),
            cpu_cost: 4,
            mode: PlatformMode::Multitask,
            ..TaskDef::default()
        })
        .duration(20)
        .build();

    let result = Simulation::new(scenario).run();
    result.recorder.dump();

    // RT has one unit: rt-b must wait for rt-a to finish.
    let d_rt_b = result.recorder.first_for(TaskId(2), EventClass::Dispatch).unwrap();
    assert_eq!(d_rt_b.at, 4, "second RT task waits for the single RT unit");

    // Multitask has two units: both apps start immediately.
    let d_mt_a = result.recorder.first_for(TaskId(3), EventClass::Dispatch).unwrap();
    let d_mt_b = result.recorder.first_for(TaskId(4), EventClass::Dispatch).unwrap();
    assert_eq!(d_mt_a.at, 0);
    assert_eq!(d_mt_b.at, 0);
    assert_eq!(d_mt_a.kind, EventKind::Dispatch { cpu: CpuId(1), wait: Some(0) });
    assert_eq!(d_mt_b.kind, EventKind::Dispatch { cpu: CpuId(2), wait: Some(0) });
}
