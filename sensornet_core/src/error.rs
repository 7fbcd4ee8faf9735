//! Error types for the SensorNet core.

use crate::types::{DeviceId, LocationId};
use thiserror::Error;

/// Errors raised while setting up or running a fleet.
///
/// Setup errors (`ZeroParticipants`, `EmptyFleet`, `DuplicateDevice`) are
/// programmer errors and should abort the run before any coordinator starts.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A barrier was requested for zero participants
    #[error("Barrier requires at least one participant")]
    ZeroParticipants,

    /// A fleet was built without any device
    #[error("Fleet has no devices")]
    EmptyFleet,

    /// Two devices were registered with the same id
    #[error("Duplicate device: {0}")]
    DuplicateDevice(DeviceId),

    /// A location outside the lock table was referenced
    #[error("Unknown location {location} (lock table holds {capacity} locations)")]
    UnknownLocation {
        location: LocationId,
        capacity: usize,
    },

    /// A location id too large to size a lock table for
    #[error("Location {0} is out of range")]
    LocationOutOfRange(LocationId),

    /// `start()` was called on a device whose coordinator already runs
    #[error("{0} already started")]
    AlreadyStarted(DeviceId),

    /// `shutdown()` was called on a device that was never started
    #[error("{0} was never started")]
    NotStarted(DeviceId),

    /// The coordinator thread panicked
    #[error("Coordinator of {0} panicked")]
    CoordinatorPanicked(DeviceId),

    /// The OS refused to spawn a thread
    #[error("Failed to spawn thread {name}: {reason}")]
    SpawnFailed { name: String, reason: String },
}

impl CoreError {
    /// Creates a spawn failure from an I/O error.
    pub fn spawn(name: impl Into<String>, err: std::io::Error) -> Self {
        Self::SpawnFailed {
            name: name.into(),
            reason: err.to_string(),
        }
    }
}
