//! In-memory local driver.
//!
//! Fallback when no other local driver is supported in the current
//! environment; also the storage of choice in tests.

use crate::driver::{
    DriverFault, DriverResult, LocalDriver, FAULT_RECORD_EXISTS, FAULT_RECORD_NOT_FOUND,
};
use crate::model::{Record, RecordId};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

const DRIVER_NAME: &str = "memory";

type Collections = BTreeMap<String, BTreeMap<RecordId, Record>>;

/// Local driver keeping records in process memory. Always supported.
#[derive(Default)]
pub struct MemoryLocalDriver {
    collections: Mutex<Collections>,
}

impl MemoryLocalDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalDriver for MemoryLocalDriver {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self, collection: &str, record: &Record) -> DriverResult<Record> {
        let mut collections = self.collections();
        let slot = collections.entry(collection.to_string()).or_default();

        if slot.contains_key(&record.uuid) {
            return Err(DriverFault::local(
                DRIVER_NAME,
                FAULT_RECORD_EXISTS,
                format!("record `{}` already exists in `{collection}`", record.uuid),
            ));
        }

        let stored = stamped(record);
        slot.insert(stored.uuid, stored.clone());
        Ok(stored)
    }

    fn update(&self, collection: &str, record: &Record) -> DriverResult<Record> {
        let mut collections = self.collections();
        let slot = collections.entry(collection.to_string()).or_default();

        if !slot.contains_key(&record.uuid) {
            return Err(not_found(collection, record.uuid));
        }

        let stored = stamped(record);
        slot.insert(stored.uuid, stored.clone());
        Ok(stored)
    }

    fn get(&self, collection: &str, id: RecordId) -> DriverResult<Option<Record>> {
        Ok(self
            .collections()
            .get(collection)
            .and_then(|slot| slot.get(&id))
            .cloned())
    }

    fn delete(&self, collection: &str, id: RecordId) -> DriverResult<Record> {
        self.collections()
            .get_mut(collection)
            .and_then(|slot| slot.remove(&id))
            .ok_or_else(|| not_found(collection, id))
    }

    fn list_ids(&self, collection: &str) -> DriverResult<Vec<RecordId>> {
        Ok(self
            .collections()
            .get(collection)
            .map(|slot| slot.keys().copied().collect())
            .unwrap_or_default())
    }
}

fn stamped(record: &Record) -> Record {
    let mut stored = record.clone();
    stored.updated_at_ms = Some(now_ms());
    stored
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

fn not_found(collection: &str, id: RecordId) -> DriverFault {
    DriverFault::local(
        DRIVER_NAME,
        FAULT_RECORD_NOT_FOUND,
        format!("record `{id}` not found in `{collection}`"),
    )
}

#[cfg(test)]
mod tests {
    use super::MemoryLocalDriver;
    use crate::driver::{LocalDriver, FAULT_RECORD_EXISTS, FAULT_RECORD_NOT_FOUND};
    use crate::model::Record;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn draft(name: &str) -> Record {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), json!(name));
        Record::new(fields)
    }

    #[test]
    fn create_get_update_delete_roundtrip() {
        let driver = MemoryLocalDriver::new();
        let mut record = draft("max");

        let stored = driver.create("users", &record).expect("create");
        assert!(stored.updated_at_ms.is_some());

        record.set_field("name", json!("maxim"));
        let updated = driver.update("users", &record).expect("update");
        assert_eq!(updated.field("name"), Some(&json!("maxim")));

        let loaded = driver
            .get("users", record.uuid)
            .expect("get")
            .expect("present");
        assert_eq!(loaded.field("name"), Some(&json!("maxim")));

        driver.delete("users", record.uuid).expect("delete");
        assert!(driver.get("users", record.uuid).expect("get").is_none());
    }

    #[test]
    fn duplicate_create_and_missing_update_fail_with_codes() {
        let driver = MemoryLocalDriver::new();
        let record = draft("max");
        driver.create("users", &record).expect("create");

        let dup = driver.create("users", &record).expect_err("duplicate");
        assert_eq!(dup.code, FAULT_RECORD_EXISTS);

        let ghost = draft("ghost");
        let missing = driver.update("users", &ghost).expect_err("missing");
        assert_eq!(missing.code, FAULT_RECORD_NOT_FOUND);
    }

    #[test]
    fn collections_are_isolated() {
        let driver = MemoryLocalDriver::new();
        let record = draft("max");
        driver.create("users", &record).expect("create");

        assert!(driver.get("orders", record.uuid).expect("get").is_none());
        assert!(driver.list_ids("orders").expect("list").is_empty());
        assert_eq!(driver.list_ids("users").expect("list"), vec![record.uuid]);
    }
}
