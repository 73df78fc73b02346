//! Scenario definition and builder API.
//!
//! A scenario is the whole construction-time configuration surface of the
//! engine: platform mode, CPU and memory budgets, launch-latency
//! distribution, fairness quantum, policies, KPI windowing, and the
//! scripted submission sequence.

use serde::Deserialize;
use tracing::warn;

use crate::memory::EvictionPolicy;
use crate::rt::TieBreak;
use crate::task::TaskDef;
use crate::types::{MemUnits, PlatformMode, Priority, Tick};

/// Default PRNG seed used when no seed is specified.
pub const DEFAULT_SEED: u64 = 42;

/// Cold-start latency distribution for the multitask class: `base` ticks
/// plus uniform jitter in `[0, jitter]`, drawn from the scenario-seeded
/// PRNG so runs replay bit-for-bit.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LaunchConfig {
    pub base: Tick,
    #[serde(default)]
    pub jitter: Tick,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        LaunchConfig { base: 2, jitter: 0 }
    }
}

/// A scripted task submission.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Virtual tick at which the submission arrives.
    pub at: Tick,
    pub def: TaskDef,
}

/// A complete simulation scenario: platform, budgets, policies, and tasks.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub mode: PlatformMode,
    /// Total CPU units across all partitions.
    pub cpu_units: u32,
    /// RT partition size under Hybrid. `None` means an even split (RT gets
    /// the larger half of an odd total).
    pub rt_units: Option<u32>,
    /// Shared memory budget.
    pub memory_units: MemUnits,
    /// RT admission window in ticks.
    pub admission_window: Tick,
    /// Multitask fairness quantum in ticks.
    pub quantum: Tick,
    pub launch: LaunchConfig,
    pub tie_break: TieBreak,
    pub eviction: EvictionPolicy,
    /// Auto-route threshold for mode-`Hybrid` tasks under Hybrid.
    pub rt_threshold: Priority,
    /// Simulated microseconds one tick stands for. Pure reporting scale:
    /// scheduling itself only ever sees ticks.
    pub tick_micros: u64,
    /// KPI window length in ticks.
    pub kpi_window: Tick,
    /// Number of ticks to simulate in `run()`.
    pub duration: Tick,
    /// PRNG seed for the launch-latency jitter.
    pub seed: u64,
    pub submissions: Vec<Submission>,
}

impl Scenario {
    pub fn builder() -> ScenarioBuilder {
        ScenarioBuilder {
            scenario: Scenario {
                mode: PlatformMode::Hybrid,
                cpu_units: 2,
                rt_units: None,
                memory_units: 64,
                admission_window: 100,
                quantum: 4,
                launch: LaunchConfig::default(),
                tie_break: TieBreak::default(),
                eviction: EvictionPolicy::default(),
                rt_threshold: Priority(10),
                tick_micros: 1_000,
                kpi_window: 100,
                duration: 1_000,
                seed: DEFAULT_SEED,
                submissions: Vec::new(),
            },
        }
    }

    /// CPU units of the RT partition under the configured split.
    pub fn rt_partition(&self) -> u32 {
        match self.mode {
            PlatformMode::Rt => self.cpu_units,
            PlatformMode::Multitask => 0,
            PlatformMode::Hybrid => self
                .rt_units
                .unwrap_or(self.cpu_units.div_ceil(2))
                .min(self.cpu_units),
        }
    }

    /// CPU units of the multitask partition under the configured split.
    pub fn multitask_partition(&self) -> u32 {
        self.cpu_units - self.rt_partition()
    }
}

/// Builder for constructing scenarios.
pub struct ScenarioBuilder {
    scenario: Scenario,
}

impl ScenarioBuilder {
    pub fn mode(mut self, mode: PlatformMode) -> Self {
        self.scenario.mode = mode;
        self
    }

    /// Set the total number of CPU units.
    pub fn cpus(mut self, n: u32) -> Self {
        self.scenario.cpu_units = n;
        self
    }

    /// Pin the RT partition size under Hybrid (default: even split).
    pub fn rt_partition(mut self, n: u32) -> Self {
        self.scenario.rt_units = Some(n);
        self
    }

    pub fn memory(mut self, units: MemUnits) -> Self {
        self.scenario.memory_units = units;
        self
    }

    pub fn admission_window(mut self, ticks: Tick) -> Self {
        self.scenario.admission_window = ticks;
        self
    }

    pub fn quantum(mut self, ticks: Tick) -> Self {
        self.scenario.quantum = ticks;
        self
    }

    pub fn launch_latency(mut self, base: Tick, jitter: Tick) -> Self {
        self.scenario.launch = LaunchConfig { base, jitter };
        self
    }

    pub fn tie_break(mut self, policy: TieBreak) -> Self {
        self.scenario.tie_break = policy;
        self
    }

    pub fn eviction(mut self, policy: EvictionPolicy) -> Self {
        self.scenario.eviction = policy;
        self
    }

    pub fn rt_threshold(mut self, priority: Priority) -> Self {
        self.scenario.rt_threshold = priority;
        self
    }

    /// Set how many simulated microseconds one tick stands for.
    pub fn tick_resolution(mut self, micros: u64) -> Self {
        self.scenario.tick_micros = micros;
        self
    }

    pub fn kpi_window(mut self, ticks: Tick) -> Self {
        self.scenario.kpi_window = ticks;
        self
    }

    pub fn duration(mut self, ticks: Tick) -> Self {
        self.scenario.duration = ticks;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.scenario.seed = seed;
        self
    }

    /// Add a submission at tick 0.
    pub fn submit(self, def: TaskDef) -> Self {
        self.submit_at(0, def)
    }

    /// Add a submission at the given tick.
    pub fn submit_at(mut self, at: Tick, def: TaskDef) -> Self {
        self.scenario.submissions.push(Submission { at, def });
        self
    }

    pub fn build(mut self) -> Scenario {
        let s = &mut self.scenario;
        assert!(s.cpu_units >= 1, "scenario needs at least one CPU unit");
        assert!(s.quantum >= 1, "fairness quantum must be at least one tick");
        assert!(s.admission_window >= 1, "admission window must be at least one tick");
        if s.mode == PlatformMode::Hybrid {
            if let Some(rt) = s.rt_units {
                if rt == 0 || rt >= s.cpu_units {
                    warn!(
                        rt_units = rt,
                        cpu_units = s.cpu_units,
                        "hybrid partition leaves a class with no CPU; falling back to even split"
                    );
                    s.rt_units = None;
                }
            }
        }
        self.scenario
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split_default() {
        let s = Scenario::builder().mode(PlatformMode::Hybrid).cpus(4).build();
        assert_eq!(s.rt_partition(), 2);
        assert_eq!(s.multitask_partition(), 2);
    }

    #[test]
    fn test_odd_split_favors_rt() {
        let s = Scenario::builder().mode(PlatformMode::Hybrid).cpus(3).build();
        assert_eq!(s.rt_partition(), 2);
        assert_eq!(s.multitask_partition(), 1);
    }

    #[test]
    fn test_pure_modes_own_all_units() {
        let rt = Scenario::builder().mode(PlatformMode::Rt).cpus(3).build();
        assert_eq!(rt.rt_partition(), 3);
        assert_eq!(rt.multitask_partition(), 0);

        let mt = Scenario::builder().mode(PlatformMode::Multitask).cpus(3).build();
        assert_eq!(mt.rt_partition(), 0);
        assert_eq!(mt.multitask_partition(), 3);
    }

    #[test]
    fn test_degenerate_partition_falls_back() {
        let s = Scenario::builder()
            .mode(PlatformMode::Hybrid)
            .cpus(2)
            .rt_partition(2)
            .build();
        assert_eq!(s.rt_partition(), 1);
    }
}
