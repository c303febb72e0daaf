//! Shared settling cell for eventually-available payloads.
//!
//! # Responsibility
//! - Hold a pending payload until it is resolved or rejected exactly once.
//! - Give readers blocking and non-blocking access to the settled outcome.
//!
//! # Invariants
//! - Settling is at-most-once; later attempts are ignored.
//! - Every clone observes the same cell.

use crate::driver::DriverFault;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

enum Cell<T> {
    Pending,
    Resolved(T),
    Rejected(DriverFault),
}

struct Shared<T> {
    cell: Mutex<Cell<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn settle(&self, next: Cell<T>) {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*cell, Cell::Pending) {
            *cell = next;
            self.ready.notify_all();
        }
    }
}

/// A payload that settles once, to a value or to a fault.
///
/// Cheap to clone; all clones share the cell. The write side is split off
/// into [`Settler`] so holders of a `Deferred` can only read.
pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Write half of a [`Deferred`]. Resolving or rejecting more than once is
/// a no-op.
pub struct Settler<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Settler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Settler<T> {
    /// Settles the cell with a value.
    pub fn resolve(&self, value: T) {
        self.shared.settle(Cell::Resolved(value));
    }

    /// Settles the cell with a fault.
    pub fn reject(&self, fault: DriverFault) {
        self.shared.settle(Cell::Rejected(fault));
    }
}

impl<T: Clone> Deferred<T> {
    /// Creates an unsettled cell plus its write half.
    pub fn pending() -> (Self, Settler<T>) {
        let shared = Arc::new(Shared {
            cell: Mutex::new(Cell::Pending),
            ready: Condvar::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Settler { shared },
        )
    }

    /// Creates an already-resolved cell.
    pub fn resolved(value: T) -> Self {
        let (deferred, settler) = Self::pending();
        settler.resolve(value);
        deferred
    }

    /// Creates an already-rejected cell.
    pub fn rejected(fault: DriverFault) -> Self {
        let (deferred, settler) = Self::pending();
        settler.reject(fault);
        deferred
    }

    /// Creates a cell settled by an initializer that receives the write
    /// half. The initializer may settle immediately or hand the settler to
    /// a worker.
    pub fn new(init: impl FnOnce(&Settler<T>)) -> Self {
        let (deferred, settler) = Self::pending();
        init(&settler);
        deferred
    }

    /// Non-blocking read of the settled outcome.
    pub fn try_get(&self) -> Option<Result<T, DriverFault>> {
        let cell = self
            .shared
            .cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &*cell {
            Cell::Pending => None,
            Cell::Resolved(value) => Some(Ok(value.clone())),
            Cell::Rejected(fault) => Some(Err(fault.clone())),
        }
    }

    /// Whether the cell has settled.
    pub fn is_settled(&self) -> bool {
        self.try_get().is_some()
    }

    /// Blocks until the cell settles.
    pub fn wait(&self) -> Result<T, DriverFault> {
        let mut cell = self
            .shared
            .cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*cell {
                Cell::Resolved(value) => return Ok(value.clone()),
                Cell::Rejected(fault) => return Err(fault.clone()),
                Cell::Pending => {
                    cell = self
                        .shared
                        .ready
                        .wait(cell)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Blocks until the cell settles or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, DriverFault>> {
        let deadline = Instant::now() + timeout;
        let mut cell = self
            .shared
            .cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*cell {
                Cell::Resolved(value) => return Some(Ok(value.clone())),
                Cell::Rejected(fault) => return Some(Err(fault.clone())),
                Cell::Pending => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    let (guard, waited) = self
                        .shared
                        .ready
                        .wait_timeout(cell, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    cell = guard;
                    if waited.timed_out() && matches!(*cell, Cell::Pending) {
                        return None;
                    }
                }
            }
        }
    }
}
