//! ivi_simulator - Deterministic platform-behavior simulator for
//! infotainment scheduling experiments.
//!
//! Two contrasting scheduling classes — a QNX-like hard-real-time priority
//! scheduler and an Android-like soft-real-time multitasking manager — run
//! under one virtual clock, producing a reproducible event stream that a
//! streaming KPI layer reduces into response-time, latency, throughput,
//! utilization and deadline-miss metrics.
//!
//! # Architecture
//!
//! - **Engine**: lock-step tick loop driving admission, eviction/launch
//!   resolution, dispatch/preemption, event emission, and KPI updates
//! - **Classes**: RT scheduler, multitask manager, and the hybrid
//!   coordinator composing both over one shared memory pool
//! - **Recorder**: append-only, time-ordered event log with lazy cursors
//! - **KPI**: O(1)-per-event streaming reduction into time windows
//!
//! # Usage
//!
//! ```rust,no_run
//! use ivi_simulator::*;
//!
//! let scenario = Scenario::builder()
//!     .mode(PlatformMode::Rt)
//!     .cpus(1)
//!     .submit(TaskDef {
//!         name: "control".into(),
//!         priority: Priority(10),
//!         cpu_cost: 2,
//!         ..TaskDef::default()
//!     })
//!     .duration(100)
//!     .build();
//!
//! let result = Simulation::new(scenario).run();
//! result.recorder.dump();
//! result.kpis.print_summary();
//! ```

pub mod budget;
pub mod class;
pub mod clock;
pub mod engine;
pub mod errors;
pub mod fmt;
pub mod hybrid;
pub mod kpi;
pub mod memory;
pub mod monitor;
pub mod multitask;
pub mod recorder;
pub mod rt;
pub mod scenario;
pub mod task;
pub mod types;
pub mod workload;

// Re-export the main public types for convenience.
pub use budget::ResourceBudget;
pub use class::{SchedClass, TaskTable};
pub use clock::VirtualClock;
pub use engine::{Simulation, SimulationResult};
pub use errors::SubmitError;
pub use fmt::{FmtTick, SimFormat};
pub use hybrid::HybridCoordinator;
pub use kpi::{DistributionStats, KpiAggregator, KpiSnapshot, KpiWindow, LatencyHistogram};
pub use memory::{EvictionPolicy, MemoryPool};
pub use monitor::{Monitor, ProbeContext, ThresholdMonitor};
pub use multitask::{MultitaskConfig, MultitaskManager};
pub use recorder::{EventClass, EventCursor, EventKind, EventRecorder, SchedEvent};
pub use rt::{RtConfig, RtScheduler, TieBreak};
pub use scenario::{LaunchConfig, Scenario, ScenarioBuilder, Submission, DEFAULT_SEED};
pub use task::{ClassKind, SimTask, TaskDef, TaskState};
pub use types::{CpuCost, CpuId, MemUnits, PlatformMode, Priority, TaskId, Tick};
pub use workload::load_workload;
