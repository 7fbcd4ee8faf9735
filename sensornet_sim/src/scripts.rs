//! Built-in aggregation scripts.

use sensornet_core::{Script, ScriptRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The scripts a scenario can assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// Arithmetic mean of all inputs
    Average,

    /// Largest input
    Maximum,

    /// Smallest input
    Minimum,

    /// Sum of all inputs
    Sum,

    /// Largest input plus one; every run must observe the previous one,
    /// so a lost update shows up in the final value
    Increment,
}

impl ScriptKind {
    /// Returns every script kind.
    pub fn all() -> [ScriptKind; 5] {
        [
            ScriptKind::Average,
            ScriptKind::Maximum,
            ScriptKind::Minimum,
            ScriptKind::Sum,
            ScriptKind::Increment,
        ]
    }

    /// Returns the script's name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::Average => "average",
            ScriptKind::Maximum => "maximum",
            ScriptKind::Minimum => "minimum",
            ScriptKind::Sum => "sum",
            ScriptKind::Increment => "increment",
        }
    }

    /// Wraps the script for delivery to a device.
    pub fn into_script(self) -> ScriptRef {
        Arc::new(self)
    }
}

impl Script for ScriptKind {
    fn run(&self, values: &[f64]) -> f64 {
        let max = || values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        match self {
            ScriptKind::Average => values.iter().sum::<f64>() / values.len() as f64,
            ScriptKind::Maximum => max(),
            ScriptKind::Minimum => values.iter().copied().fold(f64::INFINITY, f64::min),
            ScriptKind::Sum => values.iter().sum(),
            ScriptKind::Increment => max() + 1.0,
        }
    }

    fn name(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
