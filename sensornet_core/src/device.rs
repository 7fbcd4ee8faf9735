//! Device - owns partial sensor data and coordinates its rounds.
//!
//! # Round structure
//!
//! ```text
//! ┌──────────────────────── coordinator thread ────────────────────────┐
//! │ get_neighbours() ── None ──► exit                                  │
//! │        │ Some                                                      │
//! │ wait "scripts received", clear it                                  │
//! │ drain inbox ──► one worker per (script, location) ──► join all     │
//! │ barrier.wait()  ◄── every device meets here before the next round  │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::CoreError;
use crate::fleet::FleetResources;
use crate::lock_table::LocationLockTable;
use crate::script::ScriptRef;
use crate::signal::RoundSignal;
use crate::supervisor::Supervisor;
use crate::types::{DeviceId, LocationId};
use crate::worker::{Worker, WorkerOutcome};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// A script waiting in a device's inbox.
#[derive(Clone)]
pub struct Assignment {
    pub script: ScriptRef,
    pub location: LocationId,
}

/// Counters accumulated by a coordinator over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    /// Rounds completed (barrier passed)
    pub rounds: u64,

    /// Scripts taken from the inbox
    pub scripts_run: u64,

    /// Workers that wrote a result
    pub updates: u64,

    /// Workers that found no data for their location
    pub skipped: u64,

    /// Workers that failed or panicked
    pub failures: u64,
}

impl DeviceStats {
    fn record(&mut self, outcome: WorkerOutcome) {
        match outcome {
            WorkerOutcome::Updated { .. } => self.updates += 1,
            WorkerOutcome::NoData => self.skipped += 1,
        }
    }

    /// Adds another device's counters into this one.
    pub fn merge(&mut self, other: &DeviceStats) {
        self.rounds += other.rounds;
        self.scripts_run += other.scripts_run;
        self.updates += other.updates;
        self.skipped += other.skipped;
        self.failures += other.failures;
    }
}

/// A measured value, updated in place by workers holding the location lock.
#[derive(Debug)]
struct Reading(AtomicU64);

impl Reading {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

enum Coordinator {
    Idle,
    Running(JoinHandle<DeviceStats>),
    Finished(DeviceStats),
    Panicked,
}

/// A sensor device taking part in the round-synchronized simulation.
///
/// The set of locations a device holds is fixed at construction; only the
/// values change afterwards.
pub struct Device {
    id: DeviceId,
    sensor_data: BTreeMap<LocationId, Reading>,
    inbox: Mutex<Vec<Assignment>>,
    scripts_received: RoundSignal,
    resources: Arc<FleetResources>,
    supervisor: Arc<dyn Supervisor>,
    coordinator: Mutex<Coordinator>,
}

impl Device {
    /// Creates a device bound to the fleet's shared barrier and lock table.
    ///
    /// The coordinator is not started; call `start` once every device of
    /// the fleet exists.
    pub fn new(
        id: DeviceId,
        readings: impl IntoIterator<Item = (LocationId, f64)>,
        resources: Arc<FleetResources>,
        supervisor: Arc<dyn Supervisor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            sensor_data: readings
                .into_iter()
                .map(|(location, value)| (location, Reading::new(value)))
                .collect(),
            inbox: Mutex::new(Vec::new()),
            scripts_received: RoundSignal::default(),
            resources,
            supervisor,
            coordinator: Mutex::new(Coordinator::Idle),
        })
    }

    /// Returns the device id.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Locations this device holds a value for.
    pub fn locations(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.sensor_data.keys().copied()
    }

    /// Current values of every location held.
    pub fn snapshot(&self) -> BTreeMap<LocationId, f64> {
        self.sensor_data
            .iter()
            .map(|(location, reading)| (*location, reading.load()))
            .collect()
    }

    /// Returns the value held for `location`, if any.
    pub fn get_data(&self, location: LocationId) -> Option<f64> {
        self.sensor_data.get(&location).map(Reading::load)
    }

    /// Overwrites the value for `location`; does nothing if the device
    /// holds no value there.
    pub fn set_data(&self, location: LocationId, value: f64) {
        if let Some(reading) = self.sensor_data.get(&location) {
            reading.store(value);
        }
    }

    /// Delivers a script for the current round.
    ///
    /// `None` is the end-of-round sentinel: it signals that every script of
    /// this round has been delivered.
    pub fn assign_script(&self, script: Option<ScriptRef>, location: LocationId) {
        match script {
            Some(script) => self
                .inbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Assignment { script, location }),
            None => self.scripts_received.raise(),
        }
    }

    /// Number of scripts waiting in the inbox.
    pub fn pending_scripts(&self) -> usize {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn location_locks(&self) -> &LocationLockTable {
        self.resources.locks()
    }

    /// Spawns the coordinator thread.
    pub fn start(self: &Arc<Self>) -> Result<(), CoreError> {
        let mut coordinator = self.coordinator.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*coordinator, Coordinator::Idle) {
            return Err(CoreError::AlreadyStarted(self.id));
        }

        let name = format!("device-{}", self.id.get());
        let device = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || device.coordinate())
            .map_err(|e| CoreError::spawn(name, e))?;

        *coordinator = Coordinator::Running(handle);
        Ok(())
    }

    /// Blocks until the coordinator has exited and returns its counters.
    ///
    /// The coordinator exits only after the supervisor reports the end of
    /// the simulation; nothing in flight is cancelled. Calling this again
    /// returns the same counters.
    pub fn shutdown(&self) -> Result<DeviceStats, CoreError> {
        let mut coordinator = self.coordinator.lock().unwrap_or_else(PoisonError::into_inner);

        match std::mem::replace(&mut *coordinator, Coordinator::Panicked) {
            Coordinator::Idle => {
                *coordinator = Coordinator::Idle;
                Err(CoreError::NotStarted(self.id))
            }
            Coordinator::Running(handle) => match handle.join() {
                Ok(stats) => {
                    *coordinator = Coordinator::Finished(stats);
                    Ok(stats)
                }
                Err(_) => Err(CoreError::CoordinatorPanicked(self.id)),
            },
            Coordinator::Finished(stats) => {
                *coordinator = Coordinator::Finished(stats);
                Ok(stats)
            }
            Coordinator::Panicked => Err(CoreError::CoordinatorPanicked(self.id)),
        }
    }

    fn coordinate(self: Arc<Self>) -> DeviceStats {
        let mut stats = DeviceStats::default();
        debug!(device = %self.id, "coordinator started");

        while let Some(neighbours) = self.supervisor.get_neighbours(self.id) {
            self.scripts_received.wait_and_clear();

            let assignments = std::mem::take(
                &mut *self.inbox.lock().unwrap_or_else(PoisonError::into_inner),
            );
            debug!(
                device = %self.id,
                round = stats.rounds,
                scripts = assignments.len(),
                neighbours = neighbours.len(),
                "round started"
            );

            self.run_workers(&assignments, &neighbours, &mut stats);

            if self.resources.barrier().wait() {
                debug!(round = stats.rounds, "all devices finished round");
            }
            stats.rounds += 1;
        }

        debug!(device = %self.id, rounds = stats.rounds, "coordinator finished");
        stats
    }

    /// Spawns one worker per assignment and joins all of them.
    fn run_workers(&self, assignments: &[Assignment], neighbours: &[Arc<Device>], stats: &mut DeviceStats) {
        let workers: Vec<Worker<'_>> = assignments
            .iter()
            .map(|a| Worker::new(self, &*a.script, a.location, neighbours))
            .collect();

        thread::scope(|scope| {
            let handles: Vec<_> = workers
                .into_iter()
                .enumerate()
                .map(|(index, worker)| {
                    thread::Builder::new()
                        .name(format!("device-{}-worker-{}", self.id.get(), index))
                        .spawn_scoped(scope, move || worker.run())
                })
                .collect();

            for (handle, assignment) in handles.into_iter().zip(assignments) {
                stats.scripts_run += 1;

                let joined = match handle {
                    Ok(handle) => handle.join(),
                    Err(e) => {
                        error!(device = %self.id, location = %assignment.location, error = %e, "failed to spawn worker");
                        stats.failures += 1;
                        continue;
                    }
                };

                match joined {
                    Ok(Ok(outcome)) => stats.record(outcome),
                    Ok(Err(e)) => {
                        error!(device = %self.id, location = %assignment.location, error = %e, "worker failed");
                        stats.failures += 1;
                    }
                    Err(_) => {
                        error!(
                            device = %self.id,
                            location = %assignment.location,
                            script = assignment.script.name(),
                            "worker panicked"
                        );
                        stats.failures += 1;
                    }
                }
            }
        });
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}
