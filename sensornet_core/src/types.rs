//! Identifier types shared by every SensorNet component.

use serde::{Deserialize, Serialize};

/// Unique identifier for a device in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Returns the raw numeric id.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Device {}", self.0)
    }
}

/// Identifier of a measurement site.
///
/// Locations are contiguous integers starting at zero, which lets the lock
/// table index them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub usize);

impl LocationId {
    /// Returns the location as a table index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}
