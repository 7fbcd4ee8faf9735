//! Error types for the simulation harness.

use sensornet_core::CoreError;
use thiserror::Error;

/// Errors raised while loading, building or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Fleet setup or coordinator failure
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Scenario file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario file is not valid JSON for a scenario
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Scenario is well-formed JSON but inconsistent
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// The fleet did not finish in time
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl SimError {
    /// Creates an invalid-scenario error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidScenario(msg.into())
    }
}
