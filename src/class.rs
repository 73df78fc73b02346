//! The scheduling-class capability seam.
//!
//! Strategy-dependent dispatch is a tagged variant over this trait: the RT
//! scheduler and the multitask manager implement it directly, and the
//! hybrid coordinator implements it by composing one of each. The engine
//! owns the task table and threads it explicitly through every phase call;
//! classes keep only their queues and budgets.

use std::collections::BTreeMap;

use tracing::debug;

use crate::errors::SubmitError;
use crate::memory::Evicted;
use crate::recorder::{EventKind, EventRecorder};
use crate::task::{SimTask, TaskState};
use crate::types::{MemUnits, TaskId, Tick};

/// All tasks ever submitted, keyed by id. BTreeMap keeps sweeps in id
/// order, which keeps event emission deterministic.
pub type TaskTable = BTreeMap<TaskId, SimTask>;

/// Per-tick phase interface of a scheduling class.
///
/// The engine drives the fixed phase order: submissions during admission,
/// then `resolve` (eviction/launch-latency/budget reclamation), then
/// `dispatch` (work retirement, deadline sweep, preemption decisions).
/// Events are recorded inline as decisions are made.
pub trait SchedClass {
    fn name(&self) -> &'static str;

    /// Admit a freshly created task, or reject it. On rejection the task is
    /// left in a terminal state with its rejection event recorded.
    fn submit(
        &mut self,
        task: &mut SimTask,
        tasks: &mut TaskTable,
        now: Tick,
        recorder: &EventRecorder,
    ) -> Result<(), SubmitError>;

    /// Resolve launch latencies, eviction bookkeeping, and budget
    /// reclamation due at this tick.
    fn resolve(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder);

    /// Retire running work, enforce deadlines, then make this tick's
    /// dispatch and preemption decisions.
    fn dispatch(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder);

    /// (allocated, capacity) CPU units after this tick's dispatch.
    fn cpu_sample(&self) -> (u64, u64);

    /// (allocated, capacity) memory units.
    fn mem_sample(&self) -> (MemUnits, MemUnits);
}

/// Record evictions returned by a memory charge and finalize the victims.
///
/// Already-terminal victims (cached completed tasks) keep their state; the
/// eviction is a memory-reclaim record only. Everything else transitions
/// to `Evicted`. Victims can never be running: the pool only selects
/// residents their class marked evictable.
pub(crate) fn finalize_evictions(
    evicted: &[Evicted],
    tasks: &mut TaskTable,
    now: Tick,
    recorder: &EventRecorder,
) {
    for ev in evicted {
        if let Some(victim) = tasks.get_mut(&ev.task) {
            debug_assert!(
                !matches!(victim.state, TaskState::Running { .. }),
                "evicted a running task"
            );
            if !victim.state.is_terminal() {
                victim.set_state(TaskState::Evicted);
            }
            debug!(task = ev.task.0, freed = ev.freed, "evicted for memory");
        }
        recorder.record(now, ev.task, EventKind::Evict { freed: ev.freed });
    }
}
