//! SimWorld - builds a fleet from a scenario and runs it to completion.

use crate::error::SimError;
use crate::scenario::ScenarioSpec;
use crate::supervisor::ScheduledSupervisor;

use sensornet_core::{DeviceId, DeviceStats, Fleet, LocationId, Supervisor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Configuration for a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Master seed for scenario generation
    pub seed: u64,

    /// Number of devices
    pub num_devices: usize,

    /// Number of distinct locations
    pub num_locations: usize,

    /// Number of timepoints (rounds)
    pub timepoints: usize,

    /// Scripts delivered to each device per timepoint
    pub scripts_per_device: usize,

    /// Probability that a device sees a given other device in a round
    pub neighbour_probability: f64,

    /// Probability that a device holds a reading for a given location
    pub coverage: f64,

    /// Upper bound on a run's wall-clock time
    pub timeout_secs: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_devices: 6,
            num_locations: 8,
            timepoints: 10,
            scripts_per_device: 3,
            neighbour_probability: 0.5,
            coverage: 0.6,
            timeout_secs: 30,
        }
    }
}

/// Final state and counters of one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub id: DeviceId,
    pub stats: DeviceStats,
    pub readings: BTreeMap<LocationId, f64>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Scenario name
    pub scenario: String,

    /// Timepoints in the schedule
    pub timepoints: usize,

    /// Wall-clock duration of the run
    pub elapsed: Duration,

    /// Per-device results, in scenario order
    pub devices: Vec<DeviceReport>,
}

impl RunReport {
    /// Counters summed over every device.
    pub fn total(&self) -> DeviceStats {
        let mut total = DeviceStats::default();
        for device in &self.devices {
            total.merge(&device.stats);
        }
        total
    }

    /// Final readings of one device.
    pub fn readings(&self, id: DeviceId) -> Option<&BTreeMap<LocationId, f64>> {
        self.devices.iter().find(|d| d.id == id).map(|d| &d.readings)
    }
}

/// The SimWorld - a fleet wired to a scheduled supervisor.
pub struct SimWorld {
    spec: ScenarioSpec,
    fleet: Fleet,
    supervisor: Arc<ScheduledSupervisor>,
    timeout: Duration,
}

impl SimWorld {
    /// Validates `spec` and builds its fleet. No coordinator is started.
    pub fn new(spec: ScenarioSpec) -> Result<Self, SimError> {
        spec.validate()?;

        let supervisor = Arc::new(ScheduledSupervisor::from_spec(&spec));

        let mut builder = Fleet::builder().with_location_space(spec.required_locations());
        for device in &spec.devices {
            builder = builder.with_device(
                device.id,
                device.readings.iter().map(|r| (r.location, r.value)),
            );
        }
        let fleet = builder.build(Arc::clone(&supervisor) as Arc<dyn Supervisor>)?;
        supervisor.attach(fleet.devices());

        Ok(Self {
            spec,
            fleet,
            supervisor,
            timeout: Duration::from_secs(SimConfig::default().timeout_secs),
        })
    }

    /// Sets the upper bound on the run's duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The fleet under simulation.
    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    /// Starts every device and waits for the schedule to play out.
    ///
    /// # Errors
    /// `SimError::Timeout` if the fleet has not shut down within the
    /// configured timeout; the coordinators are left running.
    pub fn run(self) -> Result<RunReport, SimError> {
        info!(
            scenario = %self.spec.name,
            devices = self.spec.devices.len(),
            timepoints = self.supervisor.timepoints(),
            scripts = self.spec.script_count(),
            "starting run"
        );

        let started = Instant::now();
        self.fleet.start()?;

        let devices = self.fleet.devices().to_vec();
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("sim-shutdown".to_string())
            .spawn(move || {
                let stats: Result<Vec<DeviceStats>, _> = devices.iter().map(|d| d.shutdown()).collect();
                let _ = tx.send(stats);
            })?;

        let stats = match rx.recv_timeout(self.timeout) {
            Ok(stats) => stats?,
            Err(_) => {
                warn!(scenario = %self.spec.name, timeout_ms = self.timeout.as_millis() as u64, "fleet did not shut down");
                return Err(SimError::Timeout(self.timeout.as_millis() as u64));
            }
        };
        let elapsed = started.elapsed();

        let devices = self
            .fleet
            .devices()
            .iter()
            .zip(stats)
            .map(|(device, stats)| DeviceReport {
                id: device.id(),
                stats,
                readings: device.snapshot(),
            })
            .collect();

        info!(scenario = %self.spec.name, elapsed_ms = elapsed.as_millis() as u64, "run complete");

        Ok(RunReport {
            scenario: self.spec.name.clone(),
            timepoints: self.supervisor.timepoints(),
            elapsed,
            devices,
        })
    }
}
