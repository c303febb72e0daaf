//! Record and collection domain model.
//!
//! # Responsibility
//! - Define the canonical record shape shared by every driver.
//! - Describe collections through explicit schemas instead of runtime
//!   reflection.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Schema validation runs before any driver write.

pub mod record;

pub use record::{CollectionSchema, Record, RecordId, SchemaError};
