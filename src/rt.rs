//! QNX-like hard-real-time scheduling class.
//!
//! Priority-preemptive dispatch with deterministic tie-breaking, deadline
//! enforcement, and budget-based admission. A running task is preempted the
//! instant a strictly higher-priority task becomes ready, bounding
//! preemption latency to one tick.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;

use tracing::{debug, info};

use crate::budget::ResourceBudget;
use crate::class::{finalize_evictions, SchedClass, TaskTable};
use crate::errors::SubmitError;
use crate::memory::MemoryPool;
use crate::recorder::{EventKind, EventRecorder};
use crate::task::{ClassKind, SimTask, TaskState};
use crate::types::{CpuId, MemUnits, Priority, TaskId, Tick};

/// How equal-priority ready tasks are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// First enqueued runs first. Preempted tasks keep their original
    /// position, so they resume ahead of equal-priority later arrivals
    /// (FIFO within a priority level).
    #[default]
    SubmissionOrder,
    /// Preempted tasks re-enqueue behind equal-priority peers (round-robin
    /// within a priority level).
    RequeueOnPreempt,
}

/// Construction-time configuration for the RT class.
#[derive(Debug, Clone)]
pub struct RtConfig {
    /// CPU units in this partition.
    pub cpu_units: u32,
    /// Id of the partition's first CPU unit (non-zero under Hybrid).
    pub cpu_base: u32,
    /// Admission window in ticks. The CPU budget is
    /// `cpu_units * admission_window` ticks of committed work.
    pub admission_window: Tick,
    pub tie_break: TieBreak,
}

/// Entry in the ready set: max-heap on priority, then earliest key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadyKey {
    priority: Priority,
    seq: u64,
    task: TaskId,
}

impl Ord for ReadyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| other.task.cmp(&self.task))
    }
}

impl PartialOrd for ReadyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The QNX-like priority-preemptive scheduler.
pub struct RtScheduler {
    cfg: RtConfig,
    memory: Arc<MemoryPool>,
    cpu_budget: ResourceBudget,
    /// Committed admission budget per live task, released lazily once the
    /// task turns terminal (covers cross-partition eviction and withdrawal
    /// without a callback from the other class).
    committed: BTreeMap<TaskId, u64>,
    ready: BinaryHeap<ReadyKey>,
    /// One slot per CPU unit in the partition.
    running: Vec<Option<TaskId>>,
    next_seq: u64,
}

impl RtScheduler {
    pub fn new(cfg: RtConfig, memory: Arc<MemoryPool>) -> Self {
        let capacity = cfg.cpu_units as u64 * cfg.admission_window;
        let slots = cfg.cpu_units as usize;
        RtScheduler {
            cfg,
            memory,
            cpu_budget: ResourceBudget::new(capacity),
            committed: BTreeMap::new(),
            ready: BinaryHeap::new(),
            running: vec![None; slots],
            next_seq: 0,
        }
    }

    /// Ticks of admission budget a task commits: its cost, scaled up for
    /// periodic tasks by how many activations fit one admission window.
    fn commitment(&self, task: &SimTask) -> u64 {
        if task.period > 0 {
            let activations = self.cfg.admission_window.div_ceil(task.period).max(1);
            task.cpu_cost * activations
        } else {
            task.cpu_cost
        }
    }

    fn enqueue(&mut self, task: &mut SimTask) {
        if task.enqueue_seq == 0 {
            self.next_seq += 1;
            task.enqueue_seq = self.next_seq;
        }
        self.ready.push(ReadyKey {
            priority: task.priority,
            seq: task.enqueue_seq,
            task: task.id,
        });
    }

    /// Pop ready entries until one refers to a task still waiting.
    /// Stale entries (missed, evicted, withdrawn) are discarded lazily.
    fn pop_waiting(&mut self, tasks: &TaskTable) -> Option<ReadyKey> {
        while let Some(key) = self.ready.pop() {
            if tasks.get(&key.task).is_some_and(|t| t.is_waiting()) {
                return Some(key);
            }
        }
        None
    }

    /// Retire one tick of work for every running task; complete the ones
    /// that are done.
    fn retire(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder) {
        for slot in self.running.iter_mut() {
            let Some(id) = *slot else { continue };
            let task = tasks.get_mut(&id).expect("running task in table");
            task.remaining -= 1;
            task.last_active = now;
            self.memory.touch(id, now);
            if task.remaining == 0 {
                task.set_state(TaskState::Completed);
                // A hard-RT task frees its memory on completion; nothing
                // lingers in a cache.
                self.memory.release(id);
                recorder.record(
                    now,
                    id,
                    EventKind::Complete {
                        turnaround: now - task.submitted_at,
                    },
                );
                debug!(task = id.0, "rt: completed");
                *slot = None;
            }
        }
    }

    /// Transition waiting tasks with elapsed deadlines to Missed.
    fn sweep_deadlines(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder) {
        for task in tasks.values_mut() {
            if task.class != ClassKind::Rt || !task.is_waiting() {
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
                info!(task = task.id.0, deadline = task.deadline, "rt: deadline missed");
            }
        }
    }

    /// Slot index of the lowest-priority running task, if any.
    fn weakest_running(&self, tasks: &TaskTable) -> Option<(usize, Priority)> {
        self.running
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                slot.map(|id| (idx, tasks.get(&id).expect("running task in table").priority))
            })
            .min_by_key(|&(idx, priority)| (priority, usize::MAX - idx))
    }

    fn place(
        &mut self,
        key: ReadyKey,
        slot_idx: usize,
        tasks: &mut TaskTable,
        now: Tick,
        recorder: &EventRecorder,
    ) {
        let cpu = CpuId(self.cfg.cpu_base + slot_idx as u32);
        let task = tasks.get_mut(&key.task).expect("dispatched task in table");
        task.set_state(TaskState::Running { cpu });
        task.last_active = now;
        let wait = if task.first_dispatch.is_none() {
            task.first_dispatch = Some(now);
            Some(now - task.submitted_at)
        } else {
            None
        };
        self.memory.set_evictable(key.task, false);
        self.memory.touch(key.task, now);
        self.running[slot_idx] = Some(key.task);
        recorder.record(now, key.task, EventKind::Dispatch { cpu, wait });
        debug!(task = key.task.0, cpu = cpu.0, "rt: dispatched");
    }
}

impl SchedClass for RtScheduler {
    fn name(&self) -> &'static str {
        "rt"
    }

    fn submit(
        &mut self,
        task: &mut SimTask,
        tasks: &mut TaskTable,
        now: Tick,
        recorder: &EventRecorder,
    ) -> Result<(), SubmitError> {
        task.class = ClassKind::Rt;

        let needed = self.commitment(task);
        if !self.cpu_budget.try_charge(needed) {
            let available = self.cpu_budget.available();
            task.set_state(TaskState::AdmissionRejected);
            recorder.record(
                now,
                task.id,
                EventKind::AdmissionRejected { needed, available },
            );
            info!(task = task.id.0, needed, available, "rt: admission rejected");
            return Err(SubmitError::AdmissionRejected { needed, available });
        }

        // The RT class has no eviction authority of its own, but under
        // Hybrid the shared pool may reclaim from the multitask partition.
        match self.memory.charge(task.id, task.mem_footprint, now) {
            Ok(evicted) => finalize_evictions(&evicted, tasks, now, recorder),
            Err(err) => {
                self.cpu_budget.release(needed);
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
                info!(task = task.id.0, needed, available, "rt: memory rejected");
                return Err(err);
            }
        }

        self.committed.insert(task.id, needed);
        task.set_state(TaskState::Ready);
        self.memory.set_evictable(task.id, true);
        self.enqueue(task);
        debug!(
            task = task.id.0,
            prio = task.priority.0,
            cost = task.cpu_cost,
            "rt: admitted"
        );
        Ok(())
    }

    fn resolve(&mut self, tasks: &mut TaskTable, _now: Tick, _recorder: &EventRecorder) {
        // Reclaim admission budget committed to tasks that turned terminal
        // since the last tick (completion, miss, eviction, withdrawal).
        let done: Vec<(TaskId, u64)> = self
            .committed
            .iter()
            .filter(|(id, _)| tasks.get(id).is_none_or(|t| t.state.is_terminal()))
            .map(|(id, amount)| (*id, *amount))
            .collect();
        for (id, amount) in done {
            self.cpu_budget.release(amount);
            self.committed.remove(&id);
        }
    }

    fn dispatch(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder) {
        self.retire(tasks, now, recorder);
        self.sweep_deadlines(tasks, now, recorder);

        // Fill free slots and preempt weaker running tasks while a strictly
        // higher-priority task is waiting.
        while let Some(best) = self.pop_waiting(tasks) {
            if let Some(free) = self.running.iter().position(Option::is_none) {
                self.place(best, free, tasks, now, recorder);
                continue;
            }
            let Some((victim_idx, victim_prio)) = self.weakest_running(tasks) else {
                self.ready.push(best);
                break;
            };
            if best.priority <= victim_prio {
                self.ready.push(best);
                break;
            }
            let victim_id = self.running[victim_idx].expect("victim slot occupied");
            let victim = tasks.get_mut(&victim_id).expect("victim in table");
            victim.set_state(TaskState::Preempted);
            self.memory.set_evictable(victim_id, true);
            self.running[victim_idx] = None;
            recorder.record(
                now,
                victim_id,
                EventKind::Preempt {
                    by: Some(best.task),
                },
            );
            debug!(task = victim_id.0, by = best.task.0, "rt: preempted");
            if self.cfg.tie_break == TieBreak::RequeueOnPreempt {
                self.next_seq += 1;
                victim.enqueue_seq = self.next_seq;
            }
            let key = ReadyKey {
                priority: victim.priority,
                seq: victim.enqueue_seq,
                task: victim_id,
            };
            self.ready.push(key);
            self.place(best, victim_idx, tasks, now, recorder);
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
