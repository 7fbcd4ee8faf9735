//! SensorNet Core - round-synchronized cooperative computation
//!
//! A fleet of devices each hold partial, location-tagged measurements. At
//! every timepoint a device receives scripts that aggregate one location's
//! values across its current neighbours and write the result back to all
//! of them.
//!
//! # Concurrency model
//!
//! - **Rounds**: one coordinator thread per device; all coordinators meet at
//!   a shared [`ReusableBarrier`] after each round
//! - **Workers**: one scoped thread per script, joined before the barrier
//! - **Locations**: a shared [`LocationLockTable`] serializes every
//!   read-compute-write on the same location, fleet-wide
//!
//! # Usage
//!
//! ```ignore
//! use sensornet_core::{DeviceId, Fleet, LocationId};
//!
//! let fleet = Fleet::builder()
//!     .with_device(DeviceId(0), [(LocationId(0), 10.0)])
//!     .with_device(DeviceId(1), [(LocationId(0), 20.0)])
//!     .build(supervisor)?;
//!
//! fleet.start()?;
//! let stats = fleet.shutdown()?;
//! ```

mod barrier;
mod device;
mod error;
mod fleet;
mod lock_table;
mod script;
mod signal;
mod supervisor;
mod types;
mod worker;

pub use barrier::ReusableBarrier;
pub use device::{Assignment, Device, DeviceStats};
pub use error::CoreError;
pub use fleet::{Fleet, FleetBuilder, FleetResources};
pub use lock_table::{LocationGuard, LocationLockTable};
pub use script::{Script, ScriptRef};
pub use supervisor::{Neighbours, Supervisor};
pub use types::{DeviceId, LocationId};
pub use worker::{Worker, WorkerOutcome};
