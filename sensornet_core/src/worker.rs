//! Worker task: runs one script for one location during one round.
//!
//! # Critical section
//!
//! ```text
//! lock(location)
//!   ├── collect: neighbour values (supervisor order), then own value
//!   ├── run script            (skipped when nothing was collected)
//!   └── write result to every neighbour and to the owner
//! unlock(location)
//! ```
//!
//! Devices without a reading for the location contribute nothing and are
//! not given one: `Device::set_data` ignores absent keys.

use crate::device::Device;
use crate::error::CoreError;
use crate::script::Script;
use crate::types::LocationId;
use std::sync::Arc;
use tracing::trace;

/// What a finished worker did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerOutcome {
    /// The script ran over `inputs` values and produced `value`
    Updated { inputs: usize, value: f64 },

    /// Nobody held a value for the location; no script ran
    NoData,
}

/// A single script execution bound to a device and a neighbour snapshot.
pub struct Worker<'a> {
    device: &'a Device,
    script: &'a dyn Script,
    location: LocationId,
    neighbours: &'a [Arc<Device>],
}

impl<'a> Worker<'a> {
    /// Creates a worker for `device`.
    ///
    /// # Arguments
    /// * `device` - The device that received the script
    /// * `script` - The aggregation to run
    /// * `location` - The location the script targets
    /// * `neighbours` - The neighbour set of the current round
    pub fn new(
        device: &'a Device,
        script: &'a dyn Script,
        location: LocationId,
        neighbours: &'a [Arc<Device>],
    ) -> Self {
        Self {
            device,
            script,
            location,
            neighbours,
        }
    }

    /// Runs the read-compute-write sequence under the location lock.
    pub fn run(self) -> Result<WorkerOutcome, CoreError> {
        let _guard = self.device.location_locks().lock(self.location)?;

        let values: Vec<f64> = self
            .neighbours
            .iter()
            .filter_map(|neighbour| neighbour.get_data(self.location))
            .chain(self.device.get_data(self.location))
            .collect();

        if values.is_empty() {
            trace!(device = %self.device.id(), location = %self.location, "no data, script skipped");
            return Ok(WorkerOutcome::NoData);
        }

        let value = self.script.run(&values);

        for neighbour in self.neighbours {
            neighbour.set_data(self.location, value);
        }
        self.device.set_data(self.location, value);

        trace!(
            device = %self.device.id(),
            location = %self.location,
            script = self.script.name(),
            inputs = values.len(),
            value,
            "location updated"
        );

        Ok(WorkerOutcome::Updated {
            inputs: values.len(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{device, resources};
    use crate::types::DeviceId;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn average(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_average_written_to_owner_and_neighbour() {
        let shared = resources(3, 2);
        let a = device(0, &[(0, 10.0)], &shared);
        let b = device(1, &[(0, 20.0), (1, 5.0)], &shared);
        let c = device(2, &[(1, 7.0)], &shared);

        let neighbours = vec![Arc::clone(&b)];
        let outcome = Worker::new(&a, &average, LocationId(0), &neighbours)
            .run()
            .unwrap();

        assert_eq!(outcome, WorkerOutcome::Updated { inputs: 2, value: 15.0 });
        assert_relative_eq!(a.get_data(LocationId(0)).unwrap(), 15.0);
        assert_relative_eq!(b.get_data(LocationId(0)).unwrap(), 15.0);
        assert_relative_eq!(b.get_data(LocationId(1)).unwrap(), 5.0);
        assert_relative_eq!(c.get_data(LocationId(1)).unwrap(), 7.0);
        assert_eq!(c.get_data(LocationId(0)), None);
    }

    #[test]
    fn test_single_input_passes_through_and_owner_stays_absent() {
        let shared = resources(2, 1);
        let owner = device(0, &[], &shared);
        let neighbour = device(1, &[(0, 42.5)], &shared);

        let neighbours = vec![Arc::clone(&neighbour)];
        let outcome = Worker::new(&owner, &average, LocationId(0), &neighbours)
            .run()
            .unwrap();

        assert_eq!(outcome, WorkerOutcome::Updated { inputs: 1, value: 42.5 });
        assert_relative_eq!(neighbour.get_data(LocationId(0)).unwrap(), 42.5);
        assert_eq!(owner.get_data(LocationId(0)), None);
    }

    #[test]
    fn test_no_data_skips_script() {
        let shared = resources(2, 2);
        let owner = device(0, &[(1, 1.0)], &shared);
        let neighbour = device(1, &[(1, 2.0)], &shared);

        let calls = AtomicUsize::new(0);
        let counting = |values: &[f64]| {
            calls.fetch_add(1, Ordering::SeqCst);
            values[0]
        };

        let neighbours = vec![neighbour];
        let outcome = Worker::new(&owner, &counting, LocationId(0), &neighbours)
            .run()
            .unwrap();

        assert_eq!(outcome, WorkerOutcome::NoData);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_inputs_ordered_neighbours_then_owner() {
        let shared = resources(3, 1);
        let owner = device(0, &[(0, 3.0)], &shared);
        let first = device(1, &[(0, 1.0)], &shared);
        let second = device(2, &[(0, 2.0)], &shared);

        let first_input = |values: &[f64]| {
            assert_eq!(values, &[1.0, 2.0, 3.0]);
            values[0]
        };

        let neighbours = vec![first, second];
        Worker::new(&owner, &first_input, LocationId(0), &neighbours)
            .run()
            .unwrap();
        assert_relative_eq!(owner.get_data(LocationId(0)).unwrap(), 1.0);
    }

    #[test]
    fn test_unknown_location_is_an_error() {
        let shared = resources(1, 1);
        let owner = device(0, &[(0, 1.0)], &shared);

        let result = Worker::new(&owner, &average, LocationId(9), &[]).run();
        assert!(matches!(result, Err(CoreError::UnknownLocation { .. })));
    }

    /// Script that flags overlapping executions on the same location.
    struct OverlapDetector {
        busy: AtomicBool,
        overlaps: AtomicUsize,
    }

    impl Script for OverlapDetector {
        fn run(&self, values: &[f64]) -> f64 {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
            self.busy.store(false, Ordering::SeqCst);
            values.iter().cloned().fold(f64::MIN, f64::max) + 1.0
        }
    }

    #[test]
    fn test_same_location_never_interleaves() {
        const DEVICES: u32 = 4;
        const RUNS_PER_DEVICE: usize = 25;

        let shared = resources(DEVICES as usize, 1);
        let devices: Vec<_> = (0..DEVICES).map(|i| device(i, &[(0, 0.0)], &shared)).collect();
        let detector = OverlapDetector {
            busy: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
        };

        thread::scope(|scope| {
            for owner in &devices {
                let neighbours: Vec<_> = devices
                    .iter()
                    .filter(|d| d.id() != owner.id())
                    .cloned()
                    .collect();
                let detector = &detector;
                scope.spawn(move || {
                    for _ in 0..RUNS_PER_DEVICE {
                        Worker::new(owner, detector, LocationId(0), &neighbours)
                            .run()
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(detector.overlaps.load(Ordering::SeqCst), 0);
        // Every increment observed the previous one: no lost updates.
        let expected = (DEVICES as usize * RUNS_PER_DEVICE) as f64;
        for d in &devices {
            assert_relative_eq!(d.get_data(LocationId(0)).unwrap(), expected);
        }
    }

    #[test]
    fn test_lock_held_from_read_to_write() {
        const DEVICES: u32 = 4;
        const RUNS_PER_DEVICE: usize = 25;

        let shared = resources(DEVICES as usize, 1);
        let devices: Vec<_> = (0..DEVICES).map(|i| device(i, &[(0, 0.0)], &shared)).collect();
        let locks = shared.locks();
        let unguarded = AtomicUsize::new(0);
        let increment = |values: &[f64]| {
            if matches!(locks.try_lock(LocationId(0)), Ok(Some(_))) {
                unguarded.fetch_add(1, Ordering::SeqCst);
            }
            values.iter().cloned().fold(f64::MIN, f64::max) + 1.0
        };
        let done = AtomicBool::new(false);
        let torn = AtomicUsize::new(0);

        thread::scope(|scope| {
            // Fully connected, so every worker writes the same value to all
            // devices; under the lock they must always agree.
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let _guard = locks.lock(LocationId(0)).unwrap();
                    let first = devices[0].get_data(LocationId(0));
                    if devices.iter().any(|d| d.get_data(LocationId(0)) != first) {
                        torn.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });

            let workers: Vec<_> = devices
                .iter()
                .map(|owner| {
                    let neighbours: Vec<_> = devices
                        .iter()
                        .filter(|d| d.id() != owner.id())
                        .cloned()
                        .collect();
                    let increment = &increment;
                    scope.spawn(move || {
                        for _ in 0..RUNS_PER_DEVICE {
                            Worker::new(owner, increment, LocationId(0), &neighbours)
                                .run()
                                .unwrap();
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        assert_eq!(unguarded.load(Ordering::SeqCst), 0);
        assert_eq!(torn.load(Ordering::SeqCst), 0);
        let expected = (DEVICES as usize * RUNS_PER_DEVICE) as f64;
        assert_relative_eq!(devices[0].get_data(LocationId(0)).unwrap(), expected);
    }

    #[test]
    fn test_disjoint_locations_progress_concurrently() {
        let shared = resources(2, 2);
        let left = device(0, &[(0, 1.0)], &shared);
        let right = device(1, &[(1, 1.0)], &shared);

        // Hold location 0 for the whole test; location 1 must still be served.
        let _held = left.location_locks().lock(LocationId(0)).unwrap();

        let identity = |values: &[f64]| values[0];
        let right_ref = Arc::clone(&right);
        let outcome = thread::spawn(move || {
            Worker::new(&right_ref, &identity, LocationId(1), &[]).run()
        })
        .join()
        .unwrap()
        .unwrap();

        assert_eq!(outcome, WorkerOutcome::Updated { inputs: 1, value: 1.0 });
        assert_eq!(left.id(), DeviceId(0));
    }
}
