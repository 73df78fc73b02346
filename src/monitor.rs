//! Monitor trait for mid-simulation state sampling.
//!
//! Monitors are called by the engine at the end of every tick, enabling
//! experiment-specific probes to watch the event stream and resource
//! levels while a run is in flight.

use tracing::warn;

use crate::recorder::{EventClass, EventRecorder};
use crate::types::{MemUnits, Tick};

/// Context passed to monitors once per tick.
pub struct ProbeContext<'a> {
    /// The tick just processed.
    pub now: Tick,
    /// Read-only access to the log accumulated so far.
    pub recorder: &'a EventRecorder,
    /// CPU units allocated after this tick's dispatch.
    pub cpu_allocated: u64,
    pub cpu_capacity: u64,
    /// Memory units allocated.
    pub mem_allocated: MemUnits,
    pub mem_capacity: MemUnits,
}

/// Trait for mid-simulation state sampling.
///
/// Implement this to observe scheduling behavior while it happens and
/// accumulate state for post-run assertions or live alerting.
pub trait Monitor {
    /// Called after each tick's phases have run.
    fn sample(&mut self, ctx: &ProbeContext<'_>);
}

/// Built-in monitor that raises log warnings when performance thresholds
/// are crossed: accumulated deadline misses, or memory pressure beyond a
/// configured fraction of the budget.
pub struct ThresholdMonitor {
    miss_warn: u64,
    mem_warn_ratio: f64,
    cursor: usize,
    misses: u64,
    mem_warned: bool,
}

impl ThresholdMonitor {
    pub fn new(miss_warn: u64, mem_warn_ratio: f64) -> Self {
        ThresholdMonitor {
            miss_warn,
            mem_warn_ratio,
            cursor: 0,
            misses: 0,
            mem_warned: false,
        }
    }
}

impl Monitor for ThresholdMonitor {
    fn sample(&mut self, ctx: &ProbeContext<'_>) {
        while let Some(event) = ctx.recorder.get(self.cursor) {
            self.cursor += 1;
            if event.kind.class() == EventClass::DeadlineMiss {
                self.misses += 1;
                if self.misses == self.miss_warn {
                    warn!(misses = self.misses, "deadline-miss threshold reached");
                }
            }
        }

        if ctx.mem_capacity > 0 {
            let ratio = ctx.mem_allocated as f64 / ctx.mem_capacity as f64;
            if ratio >= self.mem_warn_ratio && !self.mem_warned {
                warn!(
                    allocated = ctx.mem_allocated,
                    capacity = ctx.mem_capacity,
                    "memory pressure threshold reached"
                );
                self.mem_warned = true;
            } else if ratio < self.mem_warn_ratio {
                self.mem_warned = false;
            }
        }
    }
}
