//! Fleet setup: sizes the shared primitives once, then builds devices.
//!
//! The barrier and the lock table are created before any device, so no
//! device ever observes a placeholder. Starting the coordinators is a
//! separate step, leaving room for the supervisor to learn about the
//! devices first.

use crate::barrier::ReusableBarrier;
use crate::device::{Device, DeviceStats};
use crate::error::CoreError;
use crate::lock_table::LocationLockTable;
use crate::supervisor::Supervisor;
use crate::types::{DeviceId, LocationId};

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Primitives shared by reference across every device of a fleet.
#[derive(Debug)]
pub struct FleetResources {
    barrier: ReusableBarrier,
    locks: LocationLockTable,
}

impl FleetResources {
    /// Creates a barrier for `devices` participants and a lock table for
    /// `locations` locations.
    pub fn new(devices: usize, locations: usize) -> Result<Self, CoreError> {
        Ok(Self {
            barrier: ReusableBarrier::new(devices)?,
            locks: LocationLockTable::new(locations),
        })
    }

    /// The round barrier.
    pub fn barrier(&self) -> &ReusableBarrier {
        &self.barrier
    }

    /// The per-location lock table.
    pub fn locks(&self) -> &LocationLockTable {
        &self.locks
    }
}

/// Builder for a [`Fleet`].
#[derive(Debug, Default)]
pub struct FleetBuilder {
    devices: Vec<(DeviceId, Vec<(LocationId, f64)>)>,
    location_space: usize,
}

impl FleetBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device with its initial readings.
    pub fn with_device(
        mut self,
        id: DeviceId,
        readings: impl IntoIterator<Item = (LocationId, f64)>,
    ) -> Self {
        self.devices.push((id, readings.into_iter().collect()));
        self
    }

    /// Reserves locks for locations `0..locations` even if no device holds
    /// a reading there (scripts may still target them).
    pub fn with_location_space(mut self, locations: usize) -> Self {
        self.location_space = locations;
        self
    }

    /// Sizes the shared primitives and constructs every device.
    pub fn build(self, supervisor: Arc<dyn Supervisor>) -> Result<Fleet, CoreError> {
        if self.devices.is_empty() {
            return Err(CoreError::EmptyFleet);
        }

        let mut seen = BTreeSet::new();
        for (id, _) in &self.devices {
            if !seen.insert(*id) {
                return Err(CoreError::DuplicateDevice(*id));
            }
        }

        let mut locations = self.location_space;
        for (_, readings) in &self.devices {
            for (location, _) in readings {
                let required = location
                    .index()
                    .checked_add(1)
                    .ok_or(CoreError::LocationOutOfRange(*location))?;
                locations = locations.max(required);
            }
        }

        let resources = Arc::new(FleetResources::new(self.devices.len(), locations)?);
        info!(devices = self.devices.len(), locations, "fleet resources ready");

        let devices = self
            .devices
            .into_iter()
            .map(|(id, readings)| {
                Device::new(id, readings, Arc::clone(&resources), Arc::clone(&supervisor))
            })
            .collect();

        Ok(Fleet { devices, resources })
    }
}

/// A set of devices sharing one barrier and one lock table.
pub struct Fleet {
    devices: Vec<Arc<Device>>,
    resources: Arc<FleetResources>,
}

impl Fleet {
    /// Returns a builder.
    pub fn builder() -> FleetBuilder {
        FleetBuilder::new()
    }

    /// All devices, in registration order.
    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    /// Looks a device up by id.
    pub fn device(&self, id: DeviceId) -> Option<&Arc<Device>> {
        self.devices.iter().find(|d| d.id() == id)
    }

    /// Number of locations covered by the lock table.
    pub fn location_count(&self) -> usize {
        self.resources.locks().len()
    }

    /// Shared primitives of this fleet.
    pub fn resources(&self) -> &Arc<FleetResources> {
        &self.resources
    }

    /// Starts every device's coordinator.
    pub fn start(&self) -> Result<(), CoreError> {
        for device in &self.devices {
            device.start()?;
        }
        debug!(devices = self.devices.len(), "all coordinators started");
        Ok(())
    }

    /// Waits for every coordinator to exit and returns their counters in
    /// device order.
    ///
    /// Every device is joined even if one of them fails; the first error is
    /// returned.
    pub fn shutdown(&self) -> Result<Vec<DeviceStats>, CoreError> {
        let results: Vec<_> = self.devices.iter().map(|d| d.shutdown()).collect();
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::Neighbours;

    struct Finished;

    impl Supervisor for Finished {
        fn get_neighbours(&self, _device: DeviceId) -> Option<Neighbours> {
            None
        }
    }

    fn readings(pairs: &[(usize, f64)]) -> Vec<(LocationId, f64)> {
        pairs.iter().map(|(l, v)| (LocationId(*l), *v)).collect()
    }

    #[test]
    fn test_location_space_from_readings() {
        let fleet = Fleet::builder()
            .with_device(DeviceId(0), readings(&[(0, 1.0)]))
            .with_device(DeviceId(1), readings(&[(4, 1.0), (2, 3.0)]))
            .build(Arc::new(Finished))
            .unwrap();

        assert_eq!(fleet.location_count(), 5);
        assert_eq!(fleet.resources().barrier().participants(), 2);
        assert_eq!(fleet.device(DeviceId(1)).unwrap().get_data(LocationId(2)), Some(3.0));
        assert!(fleet.device(DeviceId(9)).is_none());
    }

    #[test]
    fn test_explicit_location_space_extends_table() {
        let fleet = Fleet::builder()
            .with_device(DeviceId(0), readings(&[(1, 1.0)]))
            .with_location_space(8)
            .build(Arc::new(Finished))
            .unwrap();
        assert_eq!(fleet.location_count(), 8);
    }

    #[test]
    fn test_devices_share_resources() {
        let fleet = Fleet::builder()
            .with_device(DeviceId(0), readings(&[(0, 1.0)]))
            .with_device(DeviceId(1), readings(&[(0, 2.0)]))
            .build(Arc::new(Finished))
            .unwrap();

        let _held = fleet.devices()[0].location_locks().lock(LocationId(0)).unwrap();
        assert!(fleet.devices()[1]
            .location_locks()
            .try_lock(LocationId(0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_setup_errors() {
        assert!(matches!(
            FleetBuilder::new().build(Arc::new(Finished)),
            Err(CoreError::EmptyFleet)
        ));

        let duplicate = Fleet::builder()
            .with_device(DeviceId(3), readings(&[]))
            .with_device(DeviceId(3), readings(&[]))
            .build(Arc::new(Finished));
        assert!(matches!(duplicate, Err(CoreError::DuplicateDevice(DeviceId(3)))));
    }

    #[test]
    fn test_last_representable_location_rejected() {
        let result = Fleet::builder()
            .with_device(DeviceId(0), readings(&[(usize::MAX, 1.0)]))
            .build(Arc::new(Finished));
        assert!(matches!(
            result,
            Err(CoreError::LocationOutOfRange(LocationId(usize::MAX)))
        ));
    }

    #[test]
    fn test_start_and_shutdown() {
        let fleet = Fleet::builder()
            .with_device(DeviceId(0), readings(&[]))
            .with_device(DeviceId(1), readings(&[]))
            .build(Arc::new(Finished))
            .unwrap();

        fleet.start().unwrap();
        let stats = fleet.shutdown().unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.rounds == 0));
    }
}
