//! Per-collection record repository.
//!
//! # Responsibility
//! - Perform the fast local write synchronously and hand back a handle.
//! - Mirror the write to the remote driver on a worker thread that
//!   settles the handle when it completes.
//!
//! # Invariants
//! - Schema validation runs before any driver write.
//! - A hard-routed diagnostic is the only failure that propagates as
//!   `Err`; driver faults come back inside the handle.

use crate::diag::{DiagnosticPolicy, HardDiagnosticError, RuleQuery};
use crate::driver::{
    DriverFault, DriverResult, LocalDriver, RemoteDriver, FAULT_RECORD_NOT_FOUND, FAULT_SCHEMA,
};
use crate::model::{CollectionSchema, Record, RecordId};
use crate::outcome::{Deferred, ResultHandle};
use std::sync::Arc;
use std::thread;

/// Handle type returned by every data-mutating repository operation.
pub type RecordHandle = ResultHandle<Record>;

/// Data access for one collection, bound to its store's drivers.
pub struct RecordRepository {
    connection_name: String,
    schema: CollectionSchema,
    type_key: String,
    policy: DiagnosticPolicy,
    local: Arc<dyn LocalDriver>,
    remote: Option<Arc<dyn RemoteDriver>>,
}

impl RecordRepository {
    pub fn new(
        connection_name: impl Into<String>,
        schema: CollectionSchema,
        policy: DiagnosticPolicy,
        local: Arc<dyn LocalDriver>,
        remote: Option<Arc<dyn RemoteDriver>>,
    ) -> Self {
        let type_key = format!("db:{}", schema.name().to_lowercase());
        Self {
            connection_name: connection_name.into(),
            schema,
            type_key,
            policy,
            local,
            remote,
        }
    }

    /// Collection this repository serves.
    pub fn collection(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Creates a record: local write now, remote mirror later.
    ///
    /// On success the handle starts `LocalOnly` with the stored record as
    /// its value; a configured remote driver will settle it exactly once.
    pub fn create(&self, draft: Record) -> Result<RecordHandle, HardDiagnosticError> {
        if let Err(schema_err) = self.schema.validate_record(&draft) {
            let fault = DriverFault::local(
                self.local.driver_name(),
                FAULT_SCHEMA,
                schema_err.to_string(),
            );
            return self.local_failure("create", Deferred::resolved(draft), fault);
        }

        match self.local.create(self.schema.name(), &draft) {
            Ok(stored) => {
                self.policy.log(
                    &self.connection_name,
                    RuleQuery::Key(&self.type_key),
                    &format!("create `{}` applied locally", stored.uuid),
                );
                let handle = RecordHandle::new(true, Deferred::resolved(stored.clone()));
                let collection = self.schema.name().to_string();
                self.mirror("create", &handle, move |remote| {
                    remote.create(&collection, &stored)
                });
                Ok(handle)
            }
            Err(fault) => self.local_failure("create", Deferred::resolved(draft), fault),
        }
    }

    /// Updates a record: local write now, remote mirror later.
    pub fn update(&self, record: Record) -> Result<RecordHandle, HardDiagnosticError> {
        if let Err(schema_err) = self.schema.validate_record(&record) {
            let fault = DriverFault::local(
                self.local.driver_name(),
                FAULT_SCHEMA,
                schema_err.to_string(),
            );
            return self.local_failure("update", Deferred::resolved(record), fault);
        }

        match self.local.update(self.schema.name(), &record) {
            Ok(stored) => {
                self.policy.log(
                    &self.connection_name,
                    RuleQuery::Key(&self.type_key),
                    &format!("update `{}` applied locally", stored.uuid),
                );
                let handle = RecordHandle::new(true, Deferred::resolved(stored.clone()));
                let collection = self.schema.name().to_string();
                self.mirror("update", &handle, move |remote| {
                    remote.update(&collection, &stored)
                });
                Ok(handle)
            }
            Err(fault) => self.local_failure("update", Deferred::resolved(record), fault),
        }
    }

    /// Deletes a record: local removal now, remote mirror later. The
    /// handle's value is the removed record's last stored state.
    pub fn delete(&self, id: RecordId) -> Result<RecordHandle, HardDiagnosticError> {
        match self.local.delete(self.schema.name(), id) {
            Ok(removed) => {
                self.policy.log(
                    &self.connection_name,
                    RuleQuery::Key(&self.type_key),
                    &format!("delete `{id}` applied locally"),
                );
                let handle = RecordHandle::new(true, Deferred::resolved(removed));
                let collection = self.schema.name().to_string();
                self.mirror("delete", &handle, move |remote| {
                    remote.delete(&collection, id)
                });
                Ok(handle)
            }
            Err(fault) => {
                self.local_failure("delete", Deferred::rejected(fault.clone()), fault)
            }
        }
    }

    /// Reads a record from the local driver only; no remote leg.
    pub fn get(&self, id: RecordId) -> Result<RecordHandle, HardDiagnosticError> {
        match self.local.get(self.schema.name(), id) {
            Ok(Some(record)) => {
                self.policy.debug(
                    &self.connection_name,
                    RuleQuery::Key(&self.type_key),
                    &format!("get `{id}` served locally"),
                );
                Ok(RecordHandle::new(true, Deferred::resolved(record)))
            }
            Ok(None) => {
                self.policy.debug(
                    &self.connection_name,
                    RuleQuery::Key(&self.type_key),
                    &format!("get `{id}` found nothing"),
                );
                let fault = DriverFault::local(
                    self.local.driver_name(),
                    FAULT_RECORD_NOT_FOUND,
                    format!("record `{id}` not found in `{}`", self.schema.name()),
                );
                Ok(RecordHandle::with_error(
                    false,
                    Deferred::rejected(fault.clone()),
                    fault,
                ))
            }
            Err(fault) => self.local_failure("get", Deferred::rejected(fault.clone()), fault),
        }
    }

    /// Ids currently stored locally for this collection.
    pub fn list_ids(&self) -> DriverResult<Vec<RecordId>> {
        self.local.list_ids(self.schema.name())
    }

    /// Shared failure path for local driver and schema faults.
    ///
    /// Emits an error-level diagnostic first, so a `Hard` rule for this
    /// collection aborts the operation; otherwise the fault is wrapped
    /// into a non-ok handle exactly as the caller will observe it.
    fn local_failure(
        &self,
        op: &str,
        value: Deferred<Record>,
        fault: DriverFault,
    ) -> Result<RecordHandle, HardDiagnosticError> {
        self.policy.error(
            &self.connection_name,
            RuleQuery::Key(&self.type_key),
            &format!("local {op} failed: {fault}"),
        )?;
        Ok(RecordHandle::with_error(false, value, fault))
    }

    fn mirror<F>(&self, op: &'static str, handle: &RecordHandle, call: F)
    where
        F: FnOnce(&dyn RemoteDriver) -> DriverResult<Record> + Send + 'static,
    {
        let Some(remote) = self.remote.clone() else {
            return;
        };

        let handle = handle.clone();
        let policy = self.policy.clone();
        let connection = self.connection_name.clone();
        let type_key = self.type_key.clone();
        let driver_key = format!("driver:{}", remote.driver_name());

        thread::spawn(move || match call(remote.as_ref()) {
            Ok(settled) => {
                policy.log(
                    &connection,
                    RuleQuery::Key(&type_key),
                    &format!("remote {op} settled for `{}`", settled.uuid),
                );
                handle.settle_remote_success(settled);
            }
            Err(fault) => {
                policy.warn(
                    &connection,
                    RuleQuery::Key(&driver_key),
                    &format!("remote {op} failed: {fault}"),
                );
                handle.settle_remote_failure(fault);
            }
        });
    }
}
