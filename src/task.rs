//! Task model: definitions, runtime records, and the lifecycle state machine.

use serde::{Deserialize, Serialize};

use crate::types::{CpuCost, CpuId, MemUnits, PlatformMode, Priority, TaskId, Tick};

/// Which scheduling class owns a task until it reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Rt,
    Multitask,
}

/// The lifecycle state of a simulated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submitted but not yet runnable (awaiting admission or cold launch).
    Pending,
    /// Runnable, waiting for a CPU unit.
    Ready,
    /// Executing on the given CPU unit.
    Running { cpu: CpuId },
    /// Suspended by a higher-priority task, quantum expiry, or backgrounding.
    Preempted,
    /// Finished all of its CPU cost.
    Completed,
    /// Deadline elapsed before completion.
    Missed,
    /// Removed to reclaim memory, or withdrawn by the submitter.
    Evicted,
    /// Refused at admission.
    AdmissionRejected,
}

impl TaskState {
    /// Terminal states become immutable records; no transitions leave them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed
                | TaskState::Missed
                | TaskState::Evicted
                | TaskState::AdmissionRejected
        )
    }

    /// Whether `next` is reachable from `self` in one step.
    ///
    /// Eviction is legal from `Ready` and `Preempted` (a backgrounded task
    /// that has already run sits in `Preempted`), and from `Pending` for
    /// withdrawal before launch.
    pub fn can_transition(&self, next: &TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, AdmissionRejected)
                | (Pending, Evicted)
                | (Ready, Running { .. })
                | (Ready, Missed)
                | (Ready, Evicted)
                | (Running { .. }, Preempted)
                | (Running { .. }, Completed)
                | (Preempted, Running { .. })
                | (Preempted, Missed)
                | (Preempted, Evicted)
        )
    }
}

/// Definition of a task for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDef {
    pub name: String,
    /// Scheduling priority; higher is more urgent.
    pub priority: Priority,
    /// Activation period in ticks; 0 means aperiodic.
    pub period: Tick,
    /// Absolute deadline in virtual time; 0 means none.
    pub deadline: Tick,
    /// Ticks of CPU work needed to complete. Clamped to at least 1.
    pub cpu_cost: CpuCost,
    /// Memory footprint charged while the task is resident.
    pub mem_footprint: MemUnits,
    /// Target class. Under Hybrid, `Rt`/`Multitask` pins the partition and
    /// `Hybrid` means auto-route by priority.
    pub mode: PlatformMode,
}

impl Default for TaskDef {
    fn default() -> Self {
        TaskDef {
            name: String::new(),
            priority: Priority(0),
            period: 0,
            deadline: 0,
            cpu_cost: 1,
            mem_footprint: 0,
            mode: PlatformMode::Hybrid,
        }
    }
}

/// A task at runtime. Owned by the active scheduling class until terminal,
/// then kept as an immutable record.
#[derive(Debug, Clone)]
pub struct SimTask {
    pub id: TaskId,
    pub name: String,
    pub priority: Priority,
    pub period: Tick,
    pub deadline: Tick,
    pub cpu_cost: CpuCost,
    pub mem_footprint: MemUnits,
    pub mode: PlatformMode,
    /// Class the task was routed to at submission.
    pub class: ClassKind,
    pub state: TaskState,
    pub submitted_at: Tick,
    /// Ticks of work still to retire.
    pub remaining: CpuCost,
    /// Tie-break key in the RT ready set. Preserved across preemption so a
    /// preempted task resumes ahead of equal-priority later arrivals.
    pub enqueue_seq: u64,
    /// Tick of the first dispatch, if any. Response time is measured once,
    /// from submission to this point.
    pub first_dispatch: Option<Tick>,
    /// Last tick the task ran or was touched; least-recently-used key.
    pub last_active: Tick,
    /// When a cold launch finishes and the task becomes Ready.
    pub launch_ready_at: Option<Tick>,
    /// Remaining fairness quantum while running under the multitask class.
    pub quantum_left: Tick,
}

impl SimTask {
    pub fn new(id: TaskId, def: &TaskDef, now: Tick) -> Self {
        let cpu_cost = def.cpu_cost.max(1);
        SimTask {
            id,
            name: def.name.clone(),
            priority: def.priority,
            period: def.period,
            deadline: def.deadline,
            cpu_cost,
            mem_footprint: def.mem_footprint,
            mode: def.mode,
            class: ClassKind::Multitask,
            state: TaskState::Pending,
            submitted_at: now,
            remaining: cpu_cost,
            enqueue_seq: 0,
            first_dispatch: None,
            last_active: now,
            launch_ready_at: None,
            quantum_left: 0,
        }
    }

    /// Move to `next`, enforcing the lifecycle graph.
    pub fn set_state(&mut self, next: TaskState) {
        assert!(
            self.state.can_transition(&next),
            "task {} illegal transition {:?} -> {:?}",
            self.id.0,
            self.state,
            next
        );
        self.state = next;
    }

    /// Whether the task is waiting for a CPU unit (dispatchable).
    pub fn is_waiting(&self) -> bool {
        matches!(self.state, TaskState::Ready | TaskState::Preempted)
    }
}
