//! Interface to the topology service that drives timepoints.

use crate::device::Device;
use crate::types::DeviceId;
use std::sync::Arc;

/// Devices reachable from a given device during one timepoint.
pub type Neighbours = Vec<Arc<Device>>;

/// Supplies each device's neighbour set, one timepoint at a time.
///
/// Every coordinator calls `get_neighbours` concurrently, once per round.
///
/// # Returns
/// * `Some(neighbours)` - The set for the caller's current round (may be empty)
/// * `None` - The simulation is over; the caller must not start another round
pub trait Supervisor: Send + Sync {
    fn get_neighbours(&self, device: DeviceId) -> Option<Neighbours>;
}
