//! ivisim — Run platform scheduling simulations from JSON workloads.

use std::path::PathBuf;

use clap::Parser;

use ivi_simulator::{load_workload, PlatformMode, Simulation, SimFormat, ThresholdMonitor};

/// Run platform scheduling simulations from JSON workloads.
#[derive(Parser)]
#[command(name = "ivisim")]
struct Cli {
    /// Path to a JSON workload file.
    workload: PathBuf,

    /// Override the platform mode (rt, multitask, hybrid).
    #[arg(short, long)]
    mode: Option<String>,

    /// Override the simulation duration in ticks.
    #[arg(long, value_name = "TICKS")]
    duration: Option<u64>,

    /// Override the PRNG seed for launch-latency jitter.
    #[arg(long, env = "IVI_SIM_SEED")]
    seed: Option<u64>,

    /// Print recorded events to stderr.
    #[arg(long)]
    dump_events: bool,

    /// Write the event log as JSON to a file.
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Skip the KPI summary.
    #[arg(long)]
    no_kpis: bool,

    /// Warn after this many deadline misses.
    #[arg(long, default_value_t = 1)]
    miss_warn: u64,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let json = std::fs::read_to_string(&cli.workload)
        .map_err(|e| format!("failed to read {}: {e}", cli.workload.display()))?;

    let mut scenario = load_workload(&json)?;

    // Override scenario fields from CLI flags.
    if let Some(ref mode) = cli.mode {
        scenario.mode = parse_mode(mode)?;
    }
    if let Some(duration) = cli.duration {
        scenario.duration = duration;
    }
    if let Some(seed) = cli.seed {
        scenario.seed = seed;
    }

    let mut sim = Simulation::new(scenario);
    sim.add_monitor(Box::new(ThresholdMonitor::new(cli.miss_warn, 0.9)));
    let result = sim.run();

    if cli.dump_events {
        result.recorder.dump();
    }

    if let Some(path) = &cli.json {
        let mut file = std::fs::File::create(path)
            .map_err(|e| format!("failed to create {}: {e}", path.display()))?;
        result
            .recorder
            .write_json(&mut file)
            .map_err(|e| format!("failed to write event log: {e}"))?;
        eprintln!("wrote event log to {}", path.display());
    }

    if !cli.no_kpis {
        result.kpis.print_summary();
    }

    Ok(())
}

fn parse_mode(s: &str) -> Result<PlatformMode, String> {
    match s {
        "rt" => Ok(PlatformMode::Rt),
        "multitask" => Ok(PlatformMode::Multitask),
        "hybrid" => Ok(PlatformMode::Hybrid),
        other => Err(format!(
            "unknown mode {other:?}; expected rt, multitask, or hybrid"
        )),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .event_format(SimFormat)
        .try_init();
}
