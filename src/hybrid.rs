//! Hybrid platform: both scheduling classes on one timeline.
//!
//! The coordinator composes an RT scheduler and a multitask manager over
//! disjoint CPU partitions and a single shared memory pool. It owns no
//! scheduling logic of its own: per tick it drives the RT phases first and
//! the multitask phases second, which is what puts RT events ahead of
//! multitask events at the same timestamp in the merged stream.

use std::sync::Arc;

use crate::class::{SchedClass, TaskTable};
use crate::errors::SubmitError;
use crate::memory::MemoryPool;
use crate::multitask::MultitaskManager;
use crate::recorder::EventRecorder;
use crate::rt::RtScheduler;
use crate::task::SimTask;
use crate::types::{MemUnits, PlatformMode, Priority, Tick};

/// Coordinator for running both classes against the same virtual clock.
pub struct HybridCoordinator {
    rt: RtScheduler,
    multitask: MultitaskManager,
    memory: Arc<MemoryPool>,
    /// Tasks submitted with mode `Hybrid` route to the RT partition at or
    /// above this priority, to the multitask partition below it.
    rt_threshold: Priority,
}

impl HybridCoordinator {
    pub fn new(
        rt: RtScheduler,
        multitask: MultitaskManager,
        memory: Arc<MemoryPool>,
        rt_threshold: Priority,
    ) -> Self {
        HybridCoordinator {
            rt,
            multitask,
            memory,
            rt_threshold,
        }
    }

    /// Pick the class a task belongs to: pinned by its mode, or auto-routed
    /// by priority for mode `Hybrid`.
    fn route(&mut self, task: &SimTask) -> &mut dyn SchedClass {
        match task.mode {
            PlatformMode::Rt => &mut self.rt,
            PlatformMode::Multitask => &mut self.multitask,
            PlatformMode::Hybrid => {
                if task.priority >= self.rt_threshold {
                    &mut self.rt
                } else {
                    &mut self.multitask
                }
            }
        }
    }
}

impl SchedClass for HybridCoordinator {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn submit(
        &mut self,
        task: &mut SimTask,
        tasks: &mut TaskTable,
        now: Tick,
        recorder: &EventRecorder,
    ) -> Result<(), SubmitError> {
        self.route(task).submit(task, tasks, now, recorder)
    }

    fn resolve(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder) {
        self.rt.resolve(tasks, now, recorder);
        self.multitask.resolve(tasks, now, recorder);
    }

    fn dispatch(&mut self, tasks: &mut TaskTable, now: Tick, recorder: &EventRecorder) {
        self.rt.dispatch(tasks, now, recorder);
        self.multitask.dispatch(tasks, now, recorder);
    }

    fn cpu_sample(&self) -> (u64, u64) {
        let (rt_busy, rt_cap) = self.rt.cpu_sample();
        let (mt_busy, mt_cap) = self.multitask.cpu_sample();
        (rt_busy + mt_busy, rt_cap + mt_cap)
    }

    fn mem_sample(&self) -> (MemUnits, MemUnits) {
        (self.memory.allocated(), self.memory.capacity())
    }
}
