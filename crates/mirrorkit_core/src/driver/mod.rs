//! Storage driver contracts and fault envelope.
//!
//! # Responsibility
//! - Define the synchronous local driver SPI and the remote mirror SPI.
//! - Give every driver failure one structured envelope shape.
//!
//! # Invariants
//! - Local drivers complete before an operation's handle is returned.
//! - Remote drivers may be called from worker threads; implementations
//!   must be `Send + Sync`.

use crate::model::{Record, RecordId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;
pub mod remote;
pub mod sqlite;

pub use memory::MemoryLocalDriver;
pub use remote::RemoteDriver;
pub use sqlite::SqliteLocalDriver;

pub type DriverResult<T> = Result<T, DriverFault>;

/// Which side of the dual-source pair produced a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Local,
    Remote,
}

impl DriverKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Structured driver failure.
///
/// Used for rejected deferred payloads, handle error slots and every
/// driver return path, so callers match on `code` instead of parsing
/// message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverFault {
    pub origin: DriverKind,
    pub driver: String,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl DriverFault {
    /// Builds a local-side fault. Local faults are never retryable; the
    /// write either happened or it did not.
    pub fn local(driver: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: DriverKind::Local,
            driver: driver.into(),
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Builds a remote-side fault.
    pub fn remote(
        driver: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            origin: DriverKind::Remote,
            driver: driver.into(),
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }
}

impl Display for DriverFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} driver `{}` failed with {}: {}",
            self.origin.as_str(),
            self.driver,
            self.code,
            self.message
        )
    }
}

impl Error for DriverFault {}

/// Synchronous storage driver backing the fast local leg.
///
/// One driver instance is shared by every repository of a store, so
/// implementations guard their connection state internally.
pub trait LocalDriver: Send + Sync {
    /// Stable driver name used in `driver:<name>` type keys.
    fn driver_name(&self) -> &str;

    /// Whether the driver can run in the current environment. Probed once
    /// at store bootstrap.
    fn is_supported(&self) -> bool;

    fn create(&self, collection: &str, record: &Record) -> DriverResult<Record>;

    fn update(&self, collection: &str, record: &Record) -> DriverResult<Record>;

    fn get(&self, collection: &str, id: RecordId) -> DriverResult<Option<Record>>;

    /// Removes the record and returns its last stored state.
    fn delete(&self, collection: &str, id: RecordId) -> DriverResult<Record>;

    fn list_ids(&self, collection: &str) -> DriverResult<Vec<RecordId>>;
}

/// Fault code for a write against an id that already exists.
pub const FAULT_RECORD_EXISTS: &str = "record_exists";
/// Fault code for operations against a missing record.
pub const FAULT_RECORD_NOT_FOUND: &str = "record_not_found";
/// Fault code for rows that cannot be decoded back into a record.
pub const FAULT_INVALID_DATA: &str = "invalid_data";
/// Fault code for storage backend errors.
pub const FAULT_BACKEND: &str = "backend_error";
/// Fault code for records that violate their collection schema.
pub const FAULT_SCHEMA: &str = "schema_violation";
