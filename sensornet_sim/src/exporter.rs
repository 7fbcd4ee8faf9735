//! JSON exporter for finished runs.

use crate::runner::ScenarioResult;
use crate::scenario::ReadingSpec;

use sensornet_core::{DeviceId, DeviceStats};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// Final state of one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceExport {
    pub id: DeviceId,
    pub stats: DeviceStats,
    pub readings: Vec<ReadingSpec>,
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Timepoints in the schedule
    pub timepoints: usize,

    /// Wall-clock time in milliseconds
    pub elapsed_ms: u64,

    /// Whether every check passed
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Per-device final state
    pub devices: Vec<DeviceExport>,
}

impl SimExport {
    /// Builds an export from a scenario result.
    pub fn from_result(result: &ScenarioResult) -> Self {
        let (timepoints, devices) = match &result.report {
            Some(report) => (
                report.timepoints,
                report
                    .devices
                    .iter()
                    .map(|d| DeviceExport {
                        id: d.id,
                        stats: d.stats,
                        readings: d
                            .readings
                            .iter()
                            .map(|(location, value)| ReadingSpec {
                                location: *location,
                                value: *value,
                            })
                            .collect(),
                    })
                    .collect(),
            ),
            None => (0, Vec::new()),
        };

        Self {
            scenario: result.scenario.clone(),
            seed: result.seed,
            timepoints,
            elapsed_ms: result.elapsed_ms,
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
            devices,
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
