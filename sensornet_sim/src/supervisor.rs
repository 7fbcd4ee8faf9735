//! Scheduled supervisor: replays a scenario's timepoints.

use crate::scenario::ScenarioSpec;

use sensornet_core::{Device, DeviceId, LocationId, Neighbours, ScriptRef, Supervisor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::{error, trace};

struct Timepoint {
    neighbours: HashMap<DeviceId, Vec<DeviceId>>,
    scripts: HashMap<DeviceId, Vec<(ScriptRef, LocationId)>>,
}

/// Supervisor driven by a fixed schedule of timepoints.
///
/// Each device advances through the schedule on its own cursor. When a
/// device asks for its neighbours, the supervisor first delivers that
/// device's scripts for the round followed by the end-of-round sentinel.
/// Past the last timepoint it returns the terminal marker.
///
/// Devices are held weakly: they hold the supervisor, not the other way
/// around.
pub struct ScheduledSupervisor {
    timepoints: Vec<Timepoint>,
    devices: RwLock<HashMap<DeviceId, Weak<Device>>>,
    cursors: Mutex<HashMap<DeviceId, usize>>,
}

impl ScheduledSupervisor {
    /// Builds the schedule from a scenario.
    pub fn from_spec(spec: &ScenarioSpec) -> Self {
        let timepoints = spec
            .timepoints
            .iter()
            .map(|timepoint| {
                let neighbours = spec
                    .devices
                    .iter()
                    .map(|device| (device.id, timepoint.neighbours_of(device.id).to_vec()))
                    .collect();

                let mut scripts: HashMap<DeviceId, Vec<(ScriptRef, LocationId)>> = HashMap::new();
                for assignment in &timepoint.scripts {
                    scripts
                        .entry(assignment.device)
                        .or_default()
                        .push((assignment.script.into_script(), assignment.location));
                }

                Timepoint { neighbours, scripts }
            })
            .collect();

        Self {
            timepoints,
            devices: RwLock::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Registers the devices the schedule refers to. Must happen before
    /// any coordinator starts.
    pub fn attach(&self, devices: &[Arc<Device>]) {
        let mut registry = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        for device in devices {
            registry.insert(device.id(), Arc::downgrade(device));
        }
    }

    /// Number of timepoints in the schedule.
    pub fn timepoints(&self) -> usize {
        self.timepoints.len()
    }

    #[cfg(test)]
    fn rounds_served(&self, device: DeviceId) -> usize {
        let cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
        cursors
            .get(&device)
            .copied()
            .unwrap_or(0)
            .min(self.timepoints.len())
    }

    fn advance(&self, device: DeviceId) -> usize {
        let mut cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
        let cursor = cursors.entry(device).or_insert(0);
        let round = *cursor;
        *cursor += 1;
        round
    }
}

impl Supervisor for ScheduledSupervisor {
    fn get_neighbours(&self, device: DeviceId) -> Option<Neighbours> {
        let round = self.advance(device);
        let timepoint = self.timepoints.get(round)?;

        let registry = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let Some(caller) = registry.get(&device).and_then(Weak::upgrade) else {
            error!(%device, "device not attached to supervisor, ending its run");
            return None;
        };

        let scripts = timepoint.scripts.get(&device).map(Vec::as_slice).unwrap_or(&[]);
        for (script, location) in scripts {
            caller.assign_script(Some(Arc::clone(script)), *location);
        }
        caller.assign_script(None, LocationId(0));

        let neighbours: Neighbours = timepoint
            .neighbours
            .get(&device)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| registry.get(id).and_then(Weak::upgrade))
                    .collect()
            })
            .unwrap_or_default();

        trace!(%device, round, scripts = scripts.len(), neighbours = neighbours.len(), "timepoint served");
        Some(neighbours)
    }
}
