//! Deferred operation outcomes and their reconciliation handles.
//!
//! # Responsibility
//! - Represent a local-now / remote-later result as one observable value.
//! - Let application code subscribe to value replacement without coupling
//!   to the driver that performs the remote leg.
//!
//! # Invariants
//! - A handle's `ok` flag is fixed at construction.
//! - At most one remote settlement is applied per handle; both outcomes
//!   are terminal.

pub mod deferred;
pub mod handle;

pub use deferred::{Deferred, Settler};
pub use handle::{ChangeListener, ListenerFault, ReconcileState, ResultHandle};
