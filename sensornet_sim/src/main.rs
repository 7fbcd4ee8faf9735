//! SensorNet Simulator CLI
//!
//! Run round-synchronized fleet simulations and check their invariants.

use clap::Parser;
use sensornet_sim::scenarios::ScenarioId;
use sensornet_sim::{ScenarioResult, ScenarioRunner, ScenarioSpec, SimConfig, SimExport};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "sensornet-sim")]
#[command(about = "Run round-synchronized SensorNet fleet simulations", long_about = None)]
struct Args {
    /// Master seed for scenario generation (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of devices
    #[arg(short, long, default_value = "6")]
    devices: usize,

    /// Number of locations
    #[arg(short, long, default_value = "8")]
    locations: usize,

    /// Number of timepoints
    #[arg(short, long, default_value = "10")]
    timepoints: usize,

    /// Scripts per device per timepoint
    #[arg(long, default_value = "3")]
    scripts: usize,

    /// Scenario to run (average_pair, hotspot, scatter, idle, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Run a scenario from a JSON file instead of a built-in one
    #[arg(long)]
    scenario_file: Option<PathBuf>,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Probability that a device sees a given other device in a round
    #[arg(long, default_value = "0.5")]
    neighbour_probability: f64,

    /// Probability that a device holds a reading for a given location
    #[arg(long, default_value = "0.6")]
    coverage: f64,

    /// Per-run timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the final state of a single run to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("SensorNet Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let config = SimConfig {
        seed: base_seed,
        num_devices: args.devices,
        num_locations: args.locations,
        timepoints: args.timepoints,
        scripts_per_device: args.scripts,
        neighbour_probability: args.neighbour_probability,
        coverage: args.coverage,
        ..Default::default()
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();

    if let Some(path) = &args.scenario_file {
        let spec = match ScenarioSpec::load(path) {
            Ok(spec) => spec,
            Err(e) => {
                eprintln!("Error: failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        };
        let runner = ScenarioRunner::new(config.clone()).with_timeout(args.timeout);
        all_results.push(runner.run_spec(spec));
    } else {
        let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
            ScenarioId::all()
        } else {
            vec![args.scenario.parse().unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: average_pair, hotspot, scatter, idle, all");
                std::process::exit(1);
            })]
        };

        for seed_offset in 0..args.seeds {
            let seed = base_seed.wrapping_add(seed_offset as u64);
            let runner = ScenarioRunner::new(config.clone())
                .with_seed(seed)
                .with_timeout(args.timeout);

            for scenario in &scenarios {
                all_results.push(runner.run(*scenario));
            }
        }
    }

    if let Some(export_path) = &args.export {
        if all_results.len() != 1 {
            eprintln!("Error: --export only supports a single run, got {}", all_results.len());
            std::process::exit(1);
        }
        match SimExport::from_result(&all_results[0]).write_to_file(export_path) {
            Ok(()) => info!("Exported {} to {}", all_results[0].scenario, export_path),
            Err(e) => {
                error!("Failed to write {}: {}", export_path, e);
                std::process::exit(1);
            }
        }
    }

    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    let total = all_results.len();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario,
                    "seed": r.seed,
                    "passed": r.passed,
                    "rounds": r.rounds,
                    "scripts_run": r.scripts_run,
                    "elapsed_ms": r.elapsed_ms,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else {
        for result in &all_results {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED - {} rounds, {} scripts in {}ms",
                    result.scenario, result.seed, result.rounds, result.scripts_run, result.elapsed_ms
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    result.scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("All {} runs passed", total);
        } else {
            error!("{}/{} runs failed", failed_count, total);
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
