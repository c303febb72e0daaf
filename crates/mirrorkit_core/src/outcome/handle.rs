//! Reconciliation handle returned by data-mutating operations.
//!
//! # Responsibility
//! - Wrap the local outcome of an operation and expose it immediately.
//! - Accept at most one later remote settlement and make the change
//!   observable through ordered listener dispatch.
//!
//! # Invariants
//! - `ok` never changes after construction.
//! - A remote success replaces the value and notifies listeners once; a
//!   remote failure fills the error slot and leaves the value untouched.
//! - Listener failures are logged, never propagated into the mutator.

use crate::driver::DriverFault;
use crate::outcome::deferred::{Deferred, Settler};
use log::warn;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

/// Failure reported by a change listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFault {
    pub message: String,
}

impl ListenerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for ListenerFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "change listener failed: {}", self.message)
    }
}

impl Error for ListenerFault {}

/// Callback fired after the handle's value has been replaced.
///
/// Registered through [`ResultHandle::on_change`]; identity (the `Arc`
/// allocation) is what [`ResultHandle::off_change`] removes by.
pub type ChangeListener = Arc<dyn Fn() -> Result<(), ListenerFault> + Send + Sync>;

/// Where a handle stands in the local/remote reconciliation protocol.
///
/// `Reconciled` and `RemoteFailed` are terminal; a handle without a remote
/// counterpart stays `LocalOnly` for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    LocalOnly,
    Reconciled,
    RemoteFailed,
}

struct HandleInner<T> {
    ok: bool,
    value: Mutex<Deferred<T>>,
    error: OnceCell<DriverFault>,
    listeners: Mutex<Vec<ChangeListener>>,
    state: Mutex<ReconcileState>,
}

/// Observable outcome of a dual-source operation.
///
/// Created by a repository once its local write has completed. Cheap to
/// clone; all clones share state, which is how the remote worker settles a
/// handle the caller already holds.
pub struct ResultHandle<T> {
    inner: Arc<HandleInner<T>>,
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ResultHandle")
            .field("ok", &self.inner.ok)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl<T: Clone> ResultHandle<T> {
    /// Wraps an in-flight or settled payload.
    ///
    /// `ok` records whether the initiating operation started validly, not
    /// whether the payload is final.
    pub fn new(ok: bool, value: Deferred<T>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                ok,
                value: Mutex::new(value),
                error: OnceCell::new(),
                listeners: Mutex::new(Vec::new()),
                state: Mutex::new(ReconcileState::LocalOnly),
            }),
        }
    }

    /// Wraps a payload together with an error recorded at construction.
    /// The error is stored verbatim and does not block later value reads.
    pub fn with_error(ok: bool, value: Deferred<T>, fault: DriverFault) -> Self {
        let handle = Self::new(ok, value);
        // A freshly built cell cannot be occupied.
        let _ = handle.inner.error.set(fault);
        handle
    }

    /// Wraps a payload produced by a settler-receiving initializer.
    pub fn with_initializer(ok: bool, init: impl FnOnce(&Settler<T>)) -> Self {
        Self::new(ok, Deferred::new(init))
    }

    /// Whether the initiating operation started validly.
    pub fn ok(&self) -> bool {
        self.inner.ok
    }

    /// The current payload. Clones of the returned deferred keep observing
    /// that settlement even after the handle's value is replaced.
    pub fn value(&self) -> Deferred<T> {
        self.inner
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the payload and synchronously notifies every listener in
    /// registration order. Listener failures are logged and skipped.
    pub fn set_value(&self, next: Deferred<T>) {
        {
            let mut value = self
                .inner
                .value
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *value = next;
        }

        let listeners: Vec<ChangeListener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in listeners {
            if let Err(fault) = listener() {
                warn!("event=listener_dispatch module=outcome status=error error={fault}");
            }
        }
    }

    /// The recorded fault, from construction or from a remote failure.
    pub fn error(&self) -> Option<DriverFault> {
        self.inner.error.get().cloned()
    }

    /// Current reconciliation state.
    pub fn state(&self) -> ReconcileState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a listener. The same listener may be registered repeatedly
    /// and then fires once per registration.
    pub fn on_change(&self, listener: ChangeListener) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Removes the first registration of this listener, by identity.
    /// No-op when it was never registered.
    pub fn off_change(&self, listener: &ChangeListener) {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(idx) = listeners
            .iter()
            .position(|registered| Arc::ptr_eq(registered, listener))
        {
            listeners.remove(idx);
        }
    }

    /// Applies a successful remote settlement: the value is replaced with
    /// the remote outcome and listeners fire exactly once. Ignored with a
    /// warning when the handle already settled.
    pub fn settle_remote_success(&self, value: T) {
        if !self.transition(ReconcileState::Reconciled) {
            return;
        }
        self.set_value(Deferred::resolved(value));
    }

    /// Applies a failed remote settlement: the fault is recorded, the
    /// local value stays in place and no listener fires. Ignored with a
    /// warning when the handle already settled.
    pub fn settle_remote_failure(&self, fault: DriverFault) {
        if !self.transition(ReconcileState::RemoteFailed) {
            return;
        }
        if self.inner.error.set(fault).is_err() {
            warn!("event=remote_settle module=outcome status=error error_code=error_slot_occupied");
        }
    }

    fn transition(&self, next: ReconcileState) -> bool {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *state != ReconcileState::LocalOnly {
            warn!(
                "event=remote_settle module=outcome status=ignored reason=already_settled state={:?}",
                *state
            );
            return false;
        }
        *state = next;
        true
    }
}
