//! SQLite-backed local driver.
//!
//! # Responsibility
//! - Persist records as JSON documents in the `records` table.
//! - Keep SQL details inside the driver boundary.
//!
//! # Invariants
//! - Connections are accepted only with migrations fully applied.
//! - Read paths reject undecodable persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::driver::{
    DriverFault, DriverResult, LocalDriver, FAULT_BACKEND, FAULT_INVALID_DATA,
    FAULT_RECORD_EXISTS, FAULT_RECORD_NOT_FOUND,
};
use crate::model::{Record, RecordId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const DRIVER_NAME: &str = "sqlite";

const RECORD_SELECT_SQL: &str =
    "SELECT uuid, body, updated_at FROM records WHERE collection = ?1 AND uuid = ?2";

/// Local driver storing records in SQLite.
///
/// The connection sits behind a mutex so one driver instance can serve
/// every repository of a store.
pub struct SqliteLocalDriver {
    conn: Mutex<Connection>,
}

impl SqliteLocalDriver {
    /// Opens a database file and wraps it.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_db(path)?),
        })
    }

    /// Opens an in-memory database and wraps it.
    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_db_in_memory()?),
        })
    }

    /// Wraps an externally opened connection after checking that the
    /// expected schema is in place.
    pub fn try_new(conn: Connection) -> DriverResult<Self> {
        let version: u32 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .map_err(backend_fault)?;
        if version != latest_version() {
            return Err(DriverFault::local(
                DRIVER_NAME,
                FAULT_BACKEND,
                format!(
                    "connection reports schema version {version}, expected {}",
                    latest_version()
                ),
            ));
        }

        let has_records: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'records');",
                [],
                |row| row.get(0),
            )
            .map_err(backend_fault)?;
        if !has_records {
            return Err(DriverFault::local(
                DRIVER_NAME,
                FAULT_BACKEND,
                "connection is missing the `records` table",
            ));
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalDriver for SqliteLocalDriver {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self, collection: &str, record: &Record) -> DriverResult<Record> {
        let conn = self.conn();

        if read_record(&conn, collection, record.uuid)?.is_some() {
            return Err(DriverFault::local(
                DRIVER_NAME,
                FAULT_RECORD_EXISTS,
                format!("record `{}` already exists in `{collection}`", record.uuid),
            ));
        }

        let body = encode_fields(&record.fields)?;
        conn.execute(
            "INSERT INTO records (collection, uuid, body) VALUES (?1, ?2, ?3);",
            params![collection, record.uuid.to_string(), body],
        )
        .map_err(backend_fault)?;

        stored_record(&conn, collection, record.uuid)
    }

    fn update(&self, collection: &str, record: &Record) -> DriverResult<Record> {
        let conn = self.conn();

        let body = encode_fields(&record.fields)?;
        let changed = conn
            .execute(
                "UPDATE records
                 SET body = ?1, updated_at = (strftime('%s', 'now') * 1000)
                 WHERE collection = ?2 AND uuid = ?3;",
                params![body, collection, record.uuid.to_string()],
            )
            .map_err(backend_fault)?;

        if changed == 0 {
            return Err(not_found(collection, record.uuid));
        }

        stored_record(&conn, collection, record.uuid)
    }

    fn get(&self, collection: &str, id: RecordId) -> DriverResult<Option<Record>> {
        read_record(&self.conn(), collection, id)
    }

    fn delete(&self, collection: &str, id: RecordId) -> DriverResult<Record> {
        let conn = self.conn();

        let Some(record) = read_record(&conn, collection, id)? else {
            return Err(not_found(collection, id));
        };

        conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND uuid = ?2;",
            params![collection, id.to_string()],
        )
        .map_err(backend_fault)?;

        Ok(record)
    }

    fn list_ids(&self, collection: &str) -> DriverResult<Vec<RecordId>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT uuid FROM records WHERE collection = ?1 ORDER BY uuid ASC;")
            .map_err(backend_fault)?;

        let mut rows = stmt.query(params![collection]).map_err(backend_fault)?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().map_err(backend_fault)? {
            let uuid_text: String = row.get(0).map_err(backend_fault)?;
            ids.push(parse_uuid(&uuid_text)?);
        }

        Ok(ids)
    }
}

fn read_record(conn: &Connection, collection: &str, id: RecordId) -> DriverResult<Option<Record>> {
    conn.query_row(
        RECORD_SELECT_SQL,
        params![collection, id.to_string()],
        parse_record_row,
    )
    .optional()
    .map_err(backend_fault)?
    .transpose()
}

fn stored_record(conn: &Connection, collection: &str, id: RecordId) -> DriverResult<Record> {
    read_record(conn, collection, id)?.ok_or_else(|| {
        DriverFault::local(
            DRIVER_NAME,
            FAULT_INVALID_DATA,
            format!("record `{id}` in `{collection}` vanished during write"),
        )
    })
}

// The row-mapping closure must return rusqlite's error type; decode
// problems are carried out as an inner result instead.
fn parse_record_row(row: &Row<'_>) -> rusqlite::Result<DriverResult<Record>> {
    let uuid_text: String = row.get("uuid")?;
    let body: String = row.get("body")?;
    let updated_at: i64 = row.get("updated_at")?;

    Ok(decode_record(&uuid_text, &body, updated_at))
}

fn decode_record(uuid_text: &str, body: &str, updated_at: i64) -> DriverResult<Record> {
    let uuid = parse_uuid(uuid_text)?;
    let fields: BTreeMap<String, Value> = serde_json::from_str(body).map_err(|err| {
        DriverFault::local(
            DRIVER_NAME,
            FAULT_INVALID_DATA,
            format!("undecodable body for record `{uuid_text}`: {err}"),
        )
    })?;

    Ok(Record {
        uuid,
        fields,
        updated_at_ms: Some(updated_at),
    })
}

fn parse_uuid(value: &str) -> DriverResult<RecordId> {
    Uuid::parse_str(value).map_err(|_| {
        DriverFault::local(
            DRIVER_NAME,
            FAULT_INVALID_DATA,
            format!("invalid uuid value `{value}` in records.uuid"),
        )
    })
}

fn encode_fields(fields: &BTreeMap<String, Value>) -> DriverResult<String> {
    serde_json::to_string(fields).map_err(|err| {
        DriverFault::local(
            DRIVER_NAME,
            FAULT_INVALID_DATA,
            format!("record fields are not serializable: {err}"),
        )
    })
}

fn backend_fault(err: rusqlite::Error) -> DriverFault {
    DriverFault::local(DRIVER_NAME, FAULT_BACKEND, err.to_string())
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
    use super::SqliteLocalDriver;
    use crate::driver::{LocalDriver, FAULT_RECORD_EXISTS, FAULT_RECORD_NOT_FOUND};
    use crate::model::Record;
    use rusqlite::Connection;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn driver() -> SqliteLocalDriver {
        SqliteLocalDriver::open_in_memory().expect("in-memory db should open")
    }

    fn draft(name: &str) -> Record {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), json!(name));
        Record::new(fields)
    }

    #[test]
    fn create_stamps_timestamp_and_roundtrips_fields() {
        let driver = driver();
        let record = draft("max");

        let stored = driver.create("users", &record).expect("create succeeds");
        assert_eq!(stored.uuid, record.uuid);
        assert_eq!(stored.field("name"), Some(&json!("max")));
        assert!(stored.updated_at_ms.is_some());

        let loaded = driver
            .get("users", record.uuid)
            .expect("get succeeds")
            .expect("record present");
        assert_eq!(loaded, stored);
    }

    #[test]
    fn create_rejects_duplicate_ids_per_collection() {
        let driver = driver();
        let record = draft("max");
        driver.create("users", &record).expect("first create");

        let err = driver
            .create("users", &record)
            .expect_err("duplicate create must fail");
        assert_eq!(err.code, FAULT_RECORD_EXISTS);

        // Same id in another collection is a different record.
        driver
            .create("archive", &record)
            .expect("other collection accepts the id");
    }

    #[test]
    fn update_replaces_fields_or_reports_missing_record() {
        let driver = driver();
        let mut record = draft("draft");
        driver.create("users", &record).expect("create");

        record.set_field("name", json!("final"));
        let stored = driver.update("users", &record).expect("update succeeds");
        assert_eq!(stored.field("name"), Some(&json!("final")));

        let missing = draft("ghost");
        let err = driver
            .update("users", &missing)
            .expect_err("missing record must fail");
        assert_eq!(err.code, FAULT_RECORD_NOT_FOUND);
    }

    #[test]
    fn delete_returns_last_stored_state() {
        let driver = driver();
        let record = draft("max");
        driver.create("users", &record).expect("create");

        let removed = driver.delete("users", record.uuid).expect("delete");
        assert_eq!(removed.uuid, record.uuid);
        assert!(driver
            .get("users", record.uuid)
            .expect("get succeeds")
            .is_none());

        let err = driver
            .delete("users", record.uuid)
            .expect_err("second delete must fail");
        assert_eq!(err.code, FAULT_RECORD_NOT_FOUND);
    }

    #[test]
    fn list_ids_is_scoped_to_the_collection() {
        let driver = driver();
        let user = draft("max");
        let order = draft("order");
        driver.create("users", &user).expect("create user");
        driver.create("orders", &order).expect("create order");

        let ids = driver.list_ids("users").expect("list succeeds");
        assert_eq!(ids, vec![user.uuid]);
    }

    #[test]
    fn try_new_rejects_unmigrated_connections() {
        let conn = Connection::open_in_memory().expect("raw connection");
        assert!(SqliteLocalDriver::try_new(conn).is_err());
    }
}
