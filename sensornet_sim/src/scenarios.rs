//! Built-in scenarios and their expected outcomes.

use crate::scenario::{AssignmentSpec, DeviceSpec, NeighbourSpec, ReadingSpec, ScenarioSpec, TimepointSpec};
use crate::scripts::ScriptKind;
use crate::world::SimConfig;

use sensornet_core::{DeviceId, LocationId};
use std::collections::BTreeMap;

/// Expected final readings, per device.
pub type ExpectedReadings = BTreeMap<DeviceId, BTreeMap<LocationId, f64>>;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Three devices, one averaging script shared between two of them
    AveragePair,

    /// Fully connected fleet, every script increments location 0
    Hotspot,

    /// Random topology, readings and scripts from the seed
    Scatter,

    /// Rounds with no scripts at all
    Idle,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::AveragePair,
            ScenarioId::Hotspot,
            ScenarioId::Scatter,
            ScenarioId::Idle,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::AveragePair => "average_pair",
            ScenarioId::Hotspot => "hotspot",
            ScenarioId::Scatter => "scatter",
            ScenarioId::Idle => "idle",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::AveragePair => "A averages L0 with neighbour B; C must stay untouched",
            ScenarioId::Hotspot => "Every device increments L0 each round; detects lost updates",
            ScenarioId::Scatter => "Seeded random topology and scripts; checks round alignment",
            ScenarioId::Idle => "Empty rounds; barrier reuse and clean termination",
        }
    }

    /// Builds the scenario for `config`.
    ///
    /// `AveragePair` ignores the config; the others take their sizes from it.
    pub fn build(&self, config: &SimConfig) -> ScenarioSpec {
        match self {
            ScenarioId::AveragePair => average_pair(),
            ScenarioId::Hotspot => hotspot(config),
            ScenarioId::Scatter => ScenarioSpec {
                name: self.name().to_string(),
                ..ScenarioSpec::generate(config)
            },
            ScenarioId::Idle => {
                let mut spec = ScenarioSpec::generate(config);
                for timepoint in &mut spec.timepoints {
                    timepoint.scripts.clear();
                }
                spec.name = self.name().to_string();
                spec
            }
        }
    }

    /// Final readings a correct run must produce, when they are
    /// deterministic.
    pub fn expected_readings(&self, spec: &ScenarioSpec) -> Option<ExpectedReadings> {
        match self {
            ScenarioId::AveragePair => Some(BTreeMap::from([
                (DeviceId(0), BTreeMap::from([(LocationId(0), 15.0)])),
                (DeviceId(1), BTreeMap::from([(LocationId(0), 15.0), (LocationId(1), 5.0)])),
                (DeviceId(2), BTreeMap::from([(LocationId(1), 7.0)])),
            ])),
            ScenarioId::Hotspot => {
                let total = spec.script_count() as f64;
                Some(
                    spec.devices
                        .iter()
                        .map(|d| (d.id, BTreeMap::from([(LocationId(0), total)])))
                        .collect(),
                )
            }
            ScenarioId::Idle => Some(initial_readings(spec)),
            ScenarioId::Scatter => None,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average_pair" | "averagepair" | "pair" => Ok(ScenarioId::AveragePair),
            "hotspot" => Ok(ScenarioId::Hotspot),
            "scatter" | "random" => Ok(ScenarioId::Scatter),
            "idle" => Ok(ScenarioId::Idle),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

/// Readings each device starts with.
pub fn initial_readings(spec: &ScenarioSpec) -> ExpectedReadings {
    spec.devices
        .iter()
        .map(|d| (d.id, d.readings.iter().map(|r| (r.location, r.value)).collect()))
        .collect()
}

fn device(id: u32, values: &[(usize, f64)]) -> DeviceSpec {
    DeviceSpec {
        id: DeviceId(id),
        readings: values
            .iter()
            .map(|(l, v)| ReadingSpec { location: LocationId(*l), value: *v })
            .collect(),
    }
}

fn average_pair() -> ScenarioSpec {
    ScenarioSpec {
        name: ScenarioId::AveragePair.name().to_string(),
        location_space: 2,
        devices: vec![
            device(0, &[(0, 10.0)]),
            device(1, &[(0, 20.0), (1, 5.0)]),
            device(2, &[(1, 7.0)]),
        ],
        timepoints: vec![TimepointSpec {
            neighbours: vec![NeighbourSpec {
                device: DeviceId(0),
                neighbours: vec![DeviceId(1)],
            }],
            scripts: vec![AssignmentSpec {
                device: DeviceId(0),
                location: LocationId(0),
                script: ScriptKind::Average,
            }],
        }],
    }
}

fn hotspot(config: &SimConfig) -> ScenarioSpec {
    let ids: Vec<DeviceId> = (0..config.num_devices.max(1) as u32).map(DeviceId).collect();
    let scripts_per_device = config.scripts_per_device.max(1);

    let timepoint = TimepointSpec {
        neighbours: ids
            .iter()
            .map(|&device| NeighbourSpec {
                device,
                neighbours: ids.iter().copied().filter(|&other| other != device).collect(),
            })
            .collect(),
        scripts: ids
            .iter()
            .flat_map(|&device| {
                (0..scripts_per_device).map(move |_| AssignmentSpec {
                    device,
                    location: LocationId(0),
                    script: ScriptKind::Increment,
                })
            })
            .collect(),
    };

    ScenarioSpec {
        name: ScenarioId::Hotspot.name().to_string(),
        location_space: 1,
        devices: ids.iter().map(|id| device(id.get(), &[(0, 0.0)])).collect(),
        timepoints: vec![timepoint; config.timepoints],
    }
}
