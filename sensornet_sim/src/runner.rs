//! Scenario runner: executes a scenario and checks the fleet's invariants.
//!
//! # Checks
//!
//! - every device completed every timepoint
//! - every delivered script was run and no worker failed
//! - no device gained or lost a location
//! - deterministic scenarios end with their expected readings

use crate::error::SimError;
use crate::scenarios::{initial_readings, ExpectedReadings, ScenarioId};
use crate::scenario::ScenarioSpec;
use crate::world::{RunReport, SimConfig, SimWorld};

use std::time::Duration;
use tracing::{info, warn};

const TOLERANCE: f64 = 1e-9;

/// Result of a scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether the run passed every check
    pub passed: bool,

    /// Rounds completed, summed over devices
    pub rounds: u64,

    /// Scripts run, summed over devices
    pub scripts_run: u64,

    /// Wall-clock time in milliseconds
    pub elapsed_ms: u64,

    /// First failed check, if any
    pub failure_reason: Option<String>,

    /// Full report, when the run completed
    pub report: Option<RunReport>,
}

impl ScenarioResult {
    fn failed(scenario: &str, seed: u64, reason: String) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            passed: false,
            rounds: 0,
            scripts_run: 0,
            elapsed_ms: 0,
            failure_reason: Some(reason),
            report: None,
        }
    }
}

/// Runs scenarios against a fresh fleet each time.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Sets the per-run timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    /// Runs a built-in scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let spec = scenario.build(&self.config);
        let expected = scenario.expected_readings(&spec);
        self.run_checked(spec, expected)
    }

    /// Runs a scenario loaded from a file. Only the generic checks apply.
    pub fn run_spec(&self, spec: ScenarioSpec) -> ScenarioResult {
        info!("Starting scenario file: {}", spec.name);
        self.run_checked(spec, None)
    }

    fn run_checked(&self, spec: ScenarioSpec, expected: Option<ExpectedReadings>) -> ScenarioResult {
        let name = spec.name.clone();
        let seed = self.config.seed;

        let report = match self.execute(spec.clone()) {
            Ok(report) => report,
            Err(e) => {
                warn!(scenario = %name, error = %e, "run aborted");
                return ScenarioResult::failed(&name, seed, e.to_string());
            }
        };

        let failure_reason = check(&spec, &report, expected.as_ref()).err();
        if let Some(reason) = &failure_reason {
            warn!(scenario = %name, %reason, "check failed");
        }

        let total = report.total();
        ScenarioResult {
            scenario: name,
            seed,
            passed: failure_reason.is_none(),
            rounds: total.rounds,
            scripts_run: total.scripts_run,
            elapsed_ms: report.elapsed.as_millis() as u64,
            failure_reason,
            report: Some(report),
        }
    }

    fn execute(&self, spec: ScenarioSpec) -> Result<RunReport, SimError> {
        SimWorld::new(spec)?
            .with_timeout(Duration::from_secs(self.config.timeout_secs))
            .run()
    }
}

fn check(spec: &ScenarioSpec, report: &RunReport, expected: Option<&ExpectedReadings>) -> Result<(), String> {
    let timepoints = spec.timepoints.len() as u64;
    for device in &report.devices {
        if device.stats.rounds != timepoints {
            return Err(format!(
                "{} completed {} of {} rounds",
                device.id, device.stats.rounds, timepoints
            ));
        }
    }

    let total = report.total();
    if total.failures > 0 {
        return Err(format!("{} workers failed", total.failures));
    }
    if total.scripts_run != spec.script_count() as u64 {
        return Err(format!(
            "{} scripts run, {} delivered",
            total.scripts_run,
            spec.script_count()
        ));
    }

    let initial = initial_readings(spec);
    for device in &report.devices {
        let before = initial.get(&device.id).map(|r| r.keys().collect::<Vec<_>>());
        let after: Vec<_> = device.readings.keys().collect();
        if before.as_ref() != Some(&after) {
            return Err(format!("{} changed its set of locations", device.id));
        }
    }

    if let Some(expected) = expected {
        for (id, locations) in expected {
            let actual = report
                .readings(*id)
                .ok_or_else(|| format!("{id} missing from report"))?;
            for (location, want) in locations {
                match actual.get(location) {
                    Some(got) if (got - want).abs() <= TOLERANCE * want.abs().max(1.0) => {}
                    Some(got) => {
                        return Err(format!("{id} {location}: expected {want}, got {got}"));
                    }
                    None => return Err(format!("{id} {location}: expected {want}, got nothing")),
                }
            }
        }
    }

    Ok(())
}
