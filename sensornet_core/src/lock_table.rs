//! Per-location mutual exclusion shared by every device.

use crate::error::CoreError;
use crate::types::LocationId;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// Guard held while a worker owns a location.
pub type LocationGuard<'a> = MutexGuard<'a, ()>;

/// One lock per location id in `0..len`.
///
/// The table is sized once during fleet setup and never grows; every
/// device holds a reference to the same instance.
#[derive(Debug)]
pub struct LocationLockTable {
    locks: Box<[Mutex<()>]>,
}

impl LocationLockTable {
    /// Creates a table covering locations `0..locations`.
    pub fn new(locations: usize) -> Self {
        Self {
            locks: (0..locations).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Number of locations covered.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if the table covers no location.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Returns true if `location` has a lock in this table.
    pub fn covers(&self, location: LocationId) -> bool {
        location.index() < self.locks.len()
    }

    /// Blocks until the lock for `location` is acquired.
    ///
    /// A lock poisoned by a panicking worker is recovered: workers write
    /// only after their script returned, so a panic never leaves a
    /// location half-updated.
    pub fn lock(&self, location: LocationId) -> Result<LocationGuard<'_>, CoreError> {
        let lock = self.slot(location)?;
        Ok(lock.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Acquires the lock for `location` if nobody holds it.
    pub fn try_lock(&self, location: LocationId) -> Result<Option<LocationGuard<'_>>, CoreError> {
        let lock = self.slot(location)?;
        match lock.try_lock() {
            Ok(guard) => Ok(Some(guard)),
            Err(TryLockError::Poisoned(poisoned)) => Ok(Some(poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => Ok(None),
        }
    }

    fn slot(&self, location: LocationId) -> Result<&Mutex<()>, CoreError> {
        self.locks
            .get(location.index())
            .ok_or(CoreError::UnknownLocation {
                location,
                capacity: self.locks.len(),
            })
    }
}
