//! Android-like soft-real-time multitasking class.
//!
//! Cooperative lifecycle: launches pay a cold-start latency before the task
//! becomes ready, memory admission backgrounds and evicts least-recently
//! used residents, and ready tasks are served round-robin under a fairness
//! quantum. There is no priority preemption.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info};

use crate::class::{finalize_evictions, SchedClass, TaskTable};
use crate::errors::SubmitError;
use crate::memory::MemoryPool;
use crate::recorder::{EventKind, EventRecorder};
use crate::scenario::LaunchConfig;
use crate::task::{ClassKind, SimTask, TaskState};
use crate::types::{CpuId, MemUnits, TaskId, Tick};

/// Construction-time configuration for the multitask class.
#[derive(Debug, Clone)]
pub struct MultitaskConfig {
    /// CPU units in this partition.
    pub cpu_units: u32,
    /// Id of the partition's first CPU unit (non-zero under Hybrid).
    pub cpu_base: u32,
    /// Ticks a task may run before it must yield to other ready tasks.
    pub quantum: Tick,
    /// Cold-start latency distribution.
    pub launch: LaunchConfig,
}

/// The Android-like cooperative multitasking manager.
pub struct MultitaskManager {
    cfg: MultitaskConfig,
    memory: Arc<MemoryPool>,
    /// Tasks paying their cold-start latency.
    launching: VecDeque<TaskId>,
    /// Round-robin ready queue.
    ready: VecDeque<TaskId>,
    /// One slot per CPU unit in the partition.
    running: Vec<Option<TaskId>>,
    /// Deterministic source for launch-latency jitter.
    rng: SmallRng,
}

impl MultitaskManager {
    pub fn new(cfg: MultitaskConfig, memory: Arc<MemoryPool>, seed: u64) -> Self {
        let slots = cfg.cpu_units as usize;
        MultitaskManager {
            cfg,
            memory,
            launching: VecDeque::new(),
            ready: VecDeque::new(),
            running: vec![None; slots],
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Sample a cold-start latency: base plus uniform jitter.
    fn launch_latency(&mut self) -> Tick {
        let base = self.cfg.launch.base;
        match self.cfg.launch.jitter {
            0 => base,
            jitter => base + self.rng.next_u64() % (jitter + 1),
        }
    }

    /// Background least-recently-active running tasks until the reclaimable
    /// set can cover `footprint`. A launch sends the foreground task to the
    /// background; only backgrounded tasks are eviction candidates.
    fn make_room(
        &mut self,
        footprint: MemUnits,
        tasks: &mut TaskTable,
        now: Tick,
        recorder: &EventRecorder,
    ) {
        while self.memory.available() + self.memory.reclaimable() < footprint {
            let victim_slot = self
                .running
                .iter()
                .enumerate()
                .filter_map(|(idx, slot)| {
                    slot.map(|id| {
                        let last = tasks.get(&id).expect("running task in table").last_active;
                        (idx, last, id)
                    })
                })
                .min_by_key(|&(idx, last, _)| (last, idx));
            let Some((idx, _, id)) = victim_slot else {
                break;
            };
            let task = tasks.get_mut(&id).expect("running task in table");
            task.set_state(TaskState::Preempted);
            self.running[idx] = None;
            self.ready.push_back(id);
            self.memory.set_evictable(id, true);
            recorder.record(now, id, EventKind::Preempt { by: None });
            debug!(task = id.0, "multitask: backgrounded for memory");
        }
    }

    fn retire(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder) {
        for slot in self.running.iter_mut() {
            let Some(id) = *slot else { continue };
            let task = tasks.get_mut(&id).expect("running task in table");
            task.remaining -= 1;
            task.quantum_left = task.quantum_left.saturating_sub(1);
            task.last_active = now;
            self.memory.touch(id, now);
            if task.remaining == 0 {
                task.set_state(TaskState::Completed);
                // Completed tasks stay resident as a warm cache and are the
                // first eviction candidates.
                self.memory.set_evictable(id, true);
                recorder.record(
                    now,
                    id,
                    EventKind::Complete {
                        turnaround: now - task.submitted_at,
                    },
                );
                debug!(task = id.0, "multitask: completed");
                *slot = None;
            }
        }
    }

    fn sweep_deadlines(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder) {
        for task in tasks.values_mut() {
            if task.class != ClassKind::Multitask || !task.is_waiting() {
                continue;
            }
            if task.deadline > 0 && task.deadline <= now {
                task.set_state(TaskState::Missed);
                self.memory.release(task.id);
                recorder.record(
                    now,
                    task.id,
                    EventKind::DeadlineMiss {
                        deadline: task.deadline,
                    },
                );
                info!(
                    task = task.id.0,
                    deadline = task.deadline,
                    "multitask: deadline missed"
                );
            }
        }
    }

    /// Rotate out running tasks whose quantum expired while others wait.
    fn rotate(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder) {
        let waiting = self
            .ready
            .iter()
            .filter(|id| tasks.get(id).is_some_and(|t| t.is_waiting()))
            .count();
        let mut rotatable = waiting;
        for slot in self.running.iter_mut() {
            let Some(id) = *slot else { continue };
            let task = tasks.get_mut(&id).expect("running task in table");
            if task.quantum_left > 0 {
                continue;
            }
            if rotatable == 0 {
                // Nobody else wants the CPU; renew the quantum silently.
                task.quantum_left = self.cfg.quantum;
                continue;
            }
            rotatable -= 1;
            task.set_state(TaskState::Preempted);
            self.memory.set_evictable(id, true);
            *slot = None;
            self.ready.push_back(id);
            recorder.record(now, id, EventKind::Preempt { by: None });
            debug!(task = id.0, "multitask: quantum expired");
        }
    }

    /// Pop ready entries until one refers to a task still waiting.
    fn pop_waiting(&mut self, tasks: &TaskTable) -> Option<TaskId> {
        while let Some(id) = self.ready.pop_front() {
            if tasks.get(&id).is_some_and(|t| t.is_waiting()) {
                return Some(id);
            }
        }
        None
    }
}

impl SchedClass for MultitaskManager {
    fn name(&self) -> &'static str {
        "multitask"
    }

    fn submit(
        &mut self,
        task: &mut SimTask,
        tasks: &mut TaskTable,
        now: Tick,
        recorder: &EventRecorder,
    ) -> Result<(), SubmitError> {
        task.class = ClassKind::Multitask;

        if task.mem_footprint <= self.memory.capacity() {
            self.make_room(task.mem_footprint, tasks, now, recorder);
        }
        match self.memory.charge(task.id, task.mem_footprint, now) {
            Ok(evicted) => finalize_evictions(&evicted, tasks, now, recorder),
            Err(err) => {
                let (needed, available) = match err {
                    SubmitError::AdmissionRejected { needed, available }
                    | SubmitError::ResourceExhausted { needed, available } => (needed, available),
                    SubmitError::InvalidOrdering { .. } => unreachable!("pool never orders"),
                };
                task.set_state(TaskState::AdmissionRejected);
                recorder.record(
                    now,
                    task.id,
                    EventKind::AdmissionRejected { needed, available },
                );
                info!(task = task.id.0, needed, available, "multitask: rejected");
                return Err(err);
            }
        }

        let latency = self.launch_latency();
        task.launch_ready_at = Some(now + latency);
        self.launching.push_back(task.id);
        debug!(
            task = task.id.0,
            ready_at = now + latency,
            "multitask: launching"
        );
        Ok(())
    }

    fn resolve(&mut self, tasks: &mut TaskTable, now: Tick, _recorder: &EventRecorder) {
        // Cold starts that finished their launch latency become ready.
        let mut still_launching = VecDeque::with_capacity(self.launching.len());
        while let Some(id) = self.launching.pop_front() {
            let Some(task) = tasks.get_mut(&id) else {
                continue;
            };
            if task.state != TaskState::Pending {
                continue; // withdrawn or rejected meanwhile
            }
            match task.launch_ready_at {
                Some(ready_at) if ready_at <= now => {
                    task.set_state(TaskState::Ready);
                    self.memory.set_evictable(id, true);
                    self.ready.push_back(id);
                    debug!(task = id.0, "multitask: launch complete");
                }
                _ => still_launching.push_back(id),
            }
        }
        self.launching = still_launching;
    }

    fn dispatch(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder) {
        self.retire(tasks, now, recorder);
        self.sweep_deadlines(tasks, now, recorder);
        self.rotate(tasks, now, recorder);

        for slot_idx in 0..self.running.len() {
            if self.running[slot_idx].is_some() {
                continue;
            }
            let Some(id) = self.pop_waiting(tasks) else {
                break;
            };
            let cpu = CpuId(self.cfg.cpu_base + slot_idx as u32);
            let task = tasks.get_mut(&id).expect("dispatched task in table");
            task.set_state(TaskState::Running { cpu });
            task.quantum_left = self.cfg.quantum;
            task.last_active = now;
            let wait = if task.first_dispatch.is_none() {
                task.first_dispatch = Some(now);
                Some(now - task.submitted_at)
            } else {
                None
            };
            self.memory.set_evictable(id, false);
            self.memory.touch(id, now);
            self.running[slot_idx] = Some(id);
            recorder.record(now, id, EventKind::Dispatch { cpu, wait });
            debug!(task = id.0, cpu = cpu.0, "multitask: dispatched");
        }
    }

    fn cpu_sample(&self) -> (u64, u64) {
        let busy = self.running.iter().filter(|s| s.is_some()).count() as u64;
        (busy, self.cfg.cpu_units as u64)
    }

    fn mem_sample(&self) -> (MemUnits, MemUnits) {
        (self.memory.allocated(), self.memory.capacity())
    }
}
