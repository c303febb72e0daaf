//! Remote mirror driver contract.
//!
//! # Responsibility
//! - Define the slow authoritative counterpart to the local driver.
//!
//! # Invariants
//! - Calls run on repository worker threads; once issued they run to
//!   completion and settle their operation's handle. There is no
//!   cancellation path.

use crate::driver::DriverResult;
use crate::model::{Record, RecordId};

/// Remote API driver mirroring local writes.
///
/// Implementations wrap whatever transport the deployment uses; faults
/// they return are captured into the operation's handle, never thrown.
pub trait RemoteDriver: Send + Sync {
    /// Stable driver name used in `driver:<name>` type keys.
    fn driver_name(&self) -> &str;

    fn create(&self, collection: &str, record: &Record) -> DriverResult<Record>;

    fn update(&self, collection: &str, record: &Record) -> DriverResult<Record>;

    /// Removes the remote record and returns its last known state.
    fn delete(&self, collection: &str, id: RecordId) -> DriverResult<Record>;
}
