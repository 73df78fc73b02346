//! Load simulation scenarios from JSON workload files.
//!
//! This is the submission surface for the external test-automation layer:
//! a workload file describes the platform configuration and the scripted
//! task arrivals, and maps onto a [`Scenario`].
//!
//! ```json
//! {
//!   "mode": "hybrid",
//!   "cpus": 2,
//!   "memory": 64,
//!   "duration": 500,
//!   "tasks": [
//!     { "name": "nav", "at": 0, "priority": 12, "deadline": 50,
//!       "cost": 5, "footprint": 8, "mode": "rt" }
//!   ]
//! }
//! ```

use serde::Deserialize;

use crate::scenario::{LaunchConfig, Scenario};
use crate::task::TaskDef;
use crate::types::{MemUnits, PlatformMode, Priority, Tick};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkloadSpec {
    #[serde(default)]
    mode: Option<PlatformMode>,
    #[serde(default)]
    cpus: Option<u32>,
    #[serde(default)]
    rt_partition: Option<u32>,
    #[serde(default)]
    memory: Option<MemUnits>,
    #[serde(default)]
    duration: Option<Tick>,
    #[serde(default)]
    admission_window: Option<Tick>,
    #[serde(default)]
    quantum: Option<Tick>,
    #[serde(default)]
    launch_latency: Option<LaunchConfig>,
    #[serde(default)]
    tick_micros: Option<u64>,
    #[serde(default)]
    kpi_window: Option<Tick>,
    #[serde(default)]
    seed: Option<u64>,
    tasks: Vec<TaskSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskSpec {
    name: String,
    #[serde(default)]
    at: Tick,
    #[serde(default)]
    priority: u8,
    #[serde(default)]
    period: Tick,
    #[serde(default)]
    deadline: Tick,
    #[serde(default = "default_cost")]
    cost: u64,
    #[serde(default)]
    footprint: MemUnits,
    #[serde(default)]
    mode: Option<PlatformMode>,
}

fn default_cost() -> u64 {
    1
}

/// Parse a JSON workload into a scenario.
pub fn load_workload(json: &str) -> Result<Scenario, String> {
    let spec: WorkloadSpec =
        serde_json::from_str(json).map_err(|e| format!("invalid workload: {e}"))?;

    if spec.tasks.is_empty() {
        return Err("workload defines no tasks".into());
    }

    let mut builder = Scenario::builder();
    if let Some(mode) = spec.mode {
        builder = builder.mode(mode);
    }
    if let Some(cpus) = spec.cpus {
        builder = builder.cpus(cpus);
    }
    if let Some(rt) = spec.rt_partition {
        builder = builder.rt_partition(rt);
    }
    if let Some(memory) = spec.memory {
        builder = builder.memory(memory);
    }
    if let Some(duration) = spec.duration {
        builder = builder.duration(duration);
    }
    if let Some(window) = spec.admission_window {
        builder = builder.admission_window(window);
    }
    if let Some(quantum) = spec.quantum {
        builder = builder.quantum(quantum);
    }
    if let Some(launch) = spec.launch_latency {
        builder = builder.launch_latency(launch.base, launch.jitter);
    }
    if let Some(micros) = spec.tick_micros {
        builder = builder.tick_resolution(micros);
    }
    if let Some(window) = spec.kpi_window {
        builder = builder.kpi_window(window);
    }
    if let Some(seed) = spec.seed {
        builder = builder.seed(seed);
    }

    for task in spec.tasks {
        builder = builder.submit_at(
            task.at,
            TaskDef {
                name: task.name,
                priority: Priority(task.priority),
                period: task.period,
                deadline: task.deadline,
                cpu_cost: task.cost,
                mem_footprint: task.footprint,
                mode: task.mode.unwrap_or(PlatformMode::Hybrid),
            },
        );
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_workload() {
        let scenario = load_workload(
            r#"{ "tasks": [ { "name": "a" } ] }"#,
        )
        .unwrap();
        assert_eq!(scenario.submissions.len(), 1);
        assert_eq!(scenario.submissions[0].def.cpu_cost, 1);
        assert_eq!(scenario.submissions[0].at, 0);
    }

    #[test]
    fn test_full_workload() {
        let scenario = load_workload(
            r#"{
                "mode": "hybrid",
                "cpus": 4,
                "memory": 32,
                "duration": 200,
                "quantum": 3,
                "launch_latency": { "base": 2, "jitter": 1 },
                "seed": 7,
                "tasks": [
                    { "name": "nav", "at": 5, "priority": 12, "deadline": 50,
                      "cost": 5, "footprint": 8, "mode": "rt" },
                    { "name": "radio", "priority": 3, "cost": 9,
                      "footprint": 6, "mode": "multitask" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(scenario.cpu_units, 4);
        assert_eq!(scenario.duration, 200);
        assert_eq!(scenario.seed, 7);
        assert_eq!(scenario.submissions.len(), 2);
        assert_eq!(scenario.submissions[0].at, 5);
        assert_eq!(scenario.submissions[0].def.mode, PlatformMode::Rt);
        assert_eq!(scenario.submissions[1].def.priority, Priority(3));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = load_workload(r#"{ "cpu_count": 2, "tasks": [] }"#).unwrap_err();
        assert!(err.contains("invalid workload"), "got: {err}");
    }

    #[test]
    fn test_rejects_empty_tasks() {
        let err = load_workload(r#"{ "tasks": [] }"#).unwrap_err();
        assert!(err.contains("no tasks"), "got: {err}");
    }
}
