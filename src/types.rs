//! Newtype wrappers and type aliases for domain concepts.
//!
//! Newtypes for identifiers (task IDs, CPU units, priorities) prevent
//! silent type confusion. Type aliases for plain quantities (ticks,
//! memory units) provide self-documenting code without the boilerplate
//! of implementing arithmetic traits.

use serde::{Deserialize, Serialize};

/// One discrete unit of simulated time.
pub type Tick = u64;

/// Memory, in abstract budget units.
pub type MemUnits = u64;

/// CPU work, in ticks of execution a task needs to complete.
pub type CpuCost = u64;

/// Task identifier, assigned by the engine at submission.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TaskId(pub u64);

/// Scheduling priority. Higher values are more urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Priority(pub u8);

/// A CPU unit within a partition. Each unit runs at most one task per tick.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CpuId(pub u32);

/// Which scheduling class a simulation (or a task under Hybrid) targets.
///
/// On a `Scenario` this selects the active strategy. On a task submitted to
/// a Hybrid simulation, `Rt`/`Multitask` pins the partition and `Hybrid`
/// means auto-route by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformMode {
    Rt,
    Multitask,
    Hybrid,
}
