//! Repository layer over the local/remote driver pair.
//!
//! # Responsibility
//! - Expose per-collection CRUD that returns reconciliation handles.
//! - Route operation instrumentation through the injected diagnostic
//!   policy.
//!
//! # Invariants
//! - The local write completes before an operation's handle is returned.
//! - Remote mirroring never blocks the caller and never raises; its
//!   outcome is only observable through the handle.

pub mod record_repo;

pub use record_repo::{RecordHandle, RecordRepository};
