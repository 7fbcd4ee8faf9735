//! Scenario files: devices, initial readings and the timepoint schedule.
//!
//! # Format
//!
//! ```text
//! {
//!   "name": "average_pair",
//!   "devices": [{ "id": 0, "readings": [{ "location": 0, "value": 10.0 }] }, ...],
//!   "timepoints": [{
//!     "neighbours": [{ "device": 0, "neighbours": [1] }],
//!     "scripts":    [{ "device": 0, "location": 0, "script": "average" }]
//!   }]
//! }
//! ```
//!
//! A device missing from a timepoint's `neighbours` has no neighbours that
//! round.

use crate::error::SimError;
use crate::scripts::ScriptKind;
use crate::world::SimConfig;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sensornet_core::{DeviceId, LocationId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Largest lock table a scenario may ask for.
pub const MAX_LOCATIONS: usize = 1 << 16;

/// One initial measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingSpec {
    pub location: LocationId,
    pub value: f64,
}

/// A device and its initial readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: DeviceId,
    #[serde(default)]
    pub readings: Vec<ReadingSpec>,
}

/// A device's neighbour list for one timepoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighbourSpec {
    pub device: DeviceId,
    pub neighbours: Vec<DeviceId>,
}

/// A script delivered to a device for one timepoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSpec {
    pub device: DeviceId,
    pub location: LocationId,
    pub script: ScriptKind,
}

/// Topology and scripts for one timepoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimepointSpec {
    #[serde(default)]
    pub neighbours: Vec<NeighbourSpec>,
    #[serde(default)]
    pub scripts: Vec<AssignmentSpec>,
}

impl TimepointSpec {
    /// Neighbours of `device` for this timepoint.
    pub fn neighbours_of(&self, device: DeviceId) -> &[DeviceId] {
        self.neighbours
            .iter()
            .find(|n| n.device == device)
            .map(|n| n.neighbours.as_slice())
            .unwrap_or(&[])
    }
}

/// A complete simulation input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,

    /// Minimum number of locations to lock; raised to cover every reading
    /// and script
    #[serde(default)]
    pub location_space: usize,

    pub devices: Vec<DeviceSpec>,

    #[serde(default)]
    pub timepoints: Vec<TimepointSpec>,
}

impl ScenarioSpec {
    /// Reads a scenario from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let json = std::fs::read_to_string(path)?;
        let spec: ScenarioSpec = serde_json::from_str(&json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Writes the scenario as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Checks that every reference points at a declared device, that no
    /// device is listed twice and that every location fits in
    /// `MAX_LOCATIONS`.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.devices.is_empty() {
            return Err(SimError::invalid("scenario declares no devices"));
        }
        if self.location_space > MAX_LOCATIONS {
            return Err(SimError::invalid(format!(
                "location space {} exceeds {MAX_LOCATIONS}",
                self.location_space
            )));
        }

        let mut ids = BTreeSet::new();
        for device in &self.devices {
            if !ids.insert(device.id) {
                return Err(SimError::invalid(format!("{} declared twice", device.id)));
            }
            let mut locations = BTreeSet::new();
            for reading in &device.readings {
                check_location(reading.location)?;
                if !locations.insert(reading.location) {
                    return Err(SimError::invalid(format!(
                        "{} has two readings for {}",
                        device.id, reading.location
                    )));
                }
            }
        }

        for (round, timepoint) in self.timepoints.iter().enumerate() {
            let mut listed = BTreeSet::new();
            for entry in &timepoint.neighbours {
                if !ids.contains(&entry.device) {
                    return Err(SimError::invalid(format!(
                        "timepoint {round}: unknown {}",
                        entry.device
                    )));
                }
                if !listed.insert(entry.device) {
                    return Err(SimError::invalid(format!(
                        "timepoint {round}: neighbours of {} listed twice",
                        entry.device
                    )));
                }
                for neighbour in &entry.neighbours {
                    if !ids.contains(neighbour) {
                        return Err(SimError::invalid(format!(
                            "timepoint {round}: unknown neighbour {neighbour}"
                        )));
                    }
                    if *neighbour == entry.device {
                        return Err(SimError::invalid(format!(
                            "timepoint {round}: {} lists itself as neighbour",
                            entry.device
                        )));
                    }
                }
            }
            for script in &timepoint.scripts {
                if !ids.contains(&script.device) {
                    return Err(SimError::invalid(format!(
                        "timepoint {round}: script for unknown {}",
                        script.device
                    )));
                }
                check_location(script.location)?;
            }
        }

        Ok(())
    }

    /// Number of locations the lock table must cover.
    pub fn required_locations(&self) -> usize {
        let readings = self
            .devices
            .iter()
            .flat_map(|d| d.readings.iter().map(|r| r.location));
        let scripts = self
            .timepoints
            .iter()
            .flat_map(|t| t.scripts.iter().map(|s| s.location));

        readings
            .chain(scripts)
            .map(|location| location.index().saturating_add(1))
            .max()
            .unwrap_or(0)
            .max(self.location_space)
    }

    /// Total number of scripts over all timepoints.
    pub fn script_count(&self) -> usize {
        self.timepoints.iter().map(|t| t.scripts.len()).sum()
    }

    /// Generates a random scenario, fully determined by `config.seed`.
    pub fn generate(config: &SimConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let ids: Vec<DeviceId> = (0..config.num_devices as u32).map(DeviceId).collect();

        let coverage = config.coverage.clamp(0.0, 1.0);
        let linkage = config.neighbour_probability.clamp(0.0, 1.0);

        let mut devices = Vec::with_capacity(ids.len());
        for &id in &ids {
            let mut readings = Vec::new();
            for location in 0..config.num_locations {
                if rng.gen_bool(coverage) {
                    readings.push(ReadingSpec {
                        location: LocationId(location),
                        value: rng.gen_range(0.0..100.0),
                    });
                }
            }
            devices.push(DeviceSpec { id, readings });
        }

        let kinds = ScriptKind::all();
        let timepoints = (0..config.timepoints)
            .map(|_| {
                let neighbours = ids
                    .iter()
                    .map(|&device| NeighbourSpec {
                        device,
                        neighbours: ids
                            .iter()
                            .copied()
                            .filter(|&other| other != device)
                            .filter(|_| rng.gen_bool(linkage))
                            .collect(),
                    })
                    .collect();

                let scripts = if config.num_locations == 0 {
                    Vec::new()
                } else {
                    ids.iter()
                        .flat_map(|&device| std::iter::repeat(device).take(config.scripts_per_device))
                        .map(|device| AssignmentSpec {
                            device,
                            location: LocationId(rng.gen_range(0..config.num_locations)),
                            script: *kinds.choose(&mut rng).unwrap_or(&ScriptKind::Average),
                        })
                        .collect()
                };

                TimepointSpec { neighbours, scripts }
            })
            .collect();

        Self {
            name: format!("generated-{}", config.seed),
            location_space: config.num_locations,
            devices,
            timepoints,
        }
    }
}

fn check_location(location: LocationId) -> Result<(), SimError> {
    if location.index() >= MAX_LOCATIONS {
        return Err(SimError::invalid(format!(
            "{location} exceeds the {MAX_LOCATIONS} location limit"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small_config(seed: u64) -> SimConfig {
        SimConfig {
            seed,
            num_devices: 4,
            num_locations: 3,
            timepoints: 5,
            scripts_per_device: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = ScenarioSpec::generate(&small_config(7));
        let b = ScenarioSpec::generate(&small_config(7));
        let c = ScenarioSpec::generate(&small_config(8));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let spec = ScenarioSpec::generate(&small_config(1));
        let path = std::env::temp_dir().join(format!("sensornet-scenario-{}.json", std::process::id()));

        spec.save(&path).unwrap();
        let loaded = ScenarioSpec::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(spec.devices, loaded.devices);
        assert_eq!(spec.timepoints.len(), loaded.timepoints.len());
    }

    #[test]
    fn test_parse_minimal_file() {
        let json = r#"{
            "name": "tiny",
            "devices": [
                { "id": 0, "readings": [{ "location": 0, "value": 1.5 }] },
                { "id": 1 }
            ],
            "timepoints": [
                { "neighbours": [{ "device": 0, "neighbours": [1] }],
                  "scripts": [{ "device": 0, "location": 2, "script": "maximum" }] },
                {}
            ]
        }"#;
        let spec: ScenarioSpec = serde_json::from_str(json).unwrap();
        spec.validate().unwrap();

        assert_eq!(spec.required_locations(), 3);
        assert_eq!(spec.script_count(), 1);
        assert_eq!(spec.timepoints[0].neighbours_of(DeviceId(0)), &[DeviceId(1)]);
        assert!(spec.timepoints[1].neighbours_of(DeviceId(0)).is_empty());
    }

    #[test]
    fn test_demo_scenario_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/average_pair.json");
        let spec = ScenarioSpec::load(path).unwrap();

        assert_eq!(spec.devices.len(), 3);
        assert_eq!(spec.script_count(), 2);
        assert_eq!(spec.required_locations(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_references() {
        let mut spec = ScenarioSpec::generate(&small_config(3));
        spec.timepoints[0].neighbours[0].neighbours.push(DeviceId(99));
        assert!(matches!(spec.validate(), Err(SimError::InvalidScenario(_))));

        let mut spec = ScenarioSpec::generate(&small_config(3));
        let own = spec.timepoints[0].neighbours[0].device;
        spec.timepoints[0].neighbours[0].neighbours.push(own);
        assert!(matches!(spec.validate(), Err(SimError::InvalidScenario(_))));

        let mut spec = ScenarioSpec::generate(&small_config(3));
        spec.devices.push(spec.devices[0].clone());
        assert!(matches!(spec.validate(), Err(SimError::InvalidScenario(_))));
    }

    #[test]
    fn test_validate_rejects_repeated_neighbour_entry() {
        let mut spec = ScenarioSpec::generate(&small_config(3));
        let device = spec.timepoints[0].neighbours[0].device;
        spec.timepoints[0].neighbours.push(NeighbourSpec {
            device,
            neighbours: Vec::new(),
        });
        assert!(matches!(spec.validate(), Err(SimError::InvalidScenario(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_locations() {
        let json = r#"{
            "name": "far",
            "devices": [{ "id": 0, "readings": [{ "location": 18446744073709551615, "value": 1.0 }] }]
        }"#;
        let spec: ScenarioSpec = serde_json::from_str(json).unwrap();
        assert!(matches!(spec.validate(), Err(SimError::InvalidScenario(_))));
        assert_eq!(spec.required_locations(), usize::MAX);

        let mut spec = ScenarioSpec::generate(&small_config(3));
        spec.timepoints[0].scripts[0].location = LocationId(100_000_000_000);
        assert!(matches!(spec.validate(), Err(SimError::InvalidScenario(_))));

        let mut spec = ScenarioSpec::generate(&small_config(3));
        spec.location_space = MAX_LOCATIONS + 1;
        assert!(matches!(spec.validate(), Err(SimError::InvalidScenario(_))));

        spec.location_space = MAX_LOCATIONS;
        spec.validate().unwrap();
    }

    proptest! {
        #[test]
        fn test_generated_scenarios_are_valid(seed in any::<u64>(), devices in 1usize..6, locations in 0usize..5) {
            let config = SimConfig {
                seed,
                num_devices: devices,
                num_locations: locations,
                timepoints: 3,
                scripts_per_device: 2,
                ..Default::default()
            };
            let spec = ScenarioSpec::generate(&config);

            prop_assert!(spec.validate().is_ok());
            prop_assert_eq!(spec.devices.len(), devices);
            prop_assert_eq!(spec.required_locations(), locations);
            let expected_scripts = if locations == 0 { 0 } else { devices * 2 * 3 };
            prop_assert_eq!(spec.script_count(), expected_scripts);
        }
    }
}
