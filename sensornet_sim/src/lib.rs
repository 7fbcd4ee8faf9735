//! SensorNet Simulation Harness
//!
//! Drives a `sensornet_core` fleet through a schedule of timepoints and
//! checks that the concurrency invariants held.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          SimWorld                            │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ ScheduledSupervisor (timepoints: neighbours + scripts) │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │       │ get_neighbours / assign_script      │                │
//! │  ┌────▼─────┐                          ┌────▼─────┐          │
//! │  │ Device 0 │◄── shared barrier ──────►│ Device 1 │   ...    │
//! │  │ workers  │    + location locks      │ workers  │          │
//! │  └──────────┘                          └──────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sensornet_sim::{ScenarioRunner, SimConfig};
//! use sensornet_sim::scenarios::ScenarioId;
//!
//! let runner = ScenarioRunner::new(SimConfig::default());
//! let result = runner.run(ScenarioId::Hotspot);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod runner;
mod scenario;
mod scripts;
mod supervisor;
mod world;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{DeviceExport, SimExport};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenario::{AssignmentSpec, DeviceSpec, NeighbourSpec, ReadingSpec, ScenarioSpec, TimepointSpec};
pub use scripts::ScriptKind;
pub use supervisor::ScheduledSupervisor;
pub use world::{DeviceReport, RunReport, SimConfig, SimWorld};
