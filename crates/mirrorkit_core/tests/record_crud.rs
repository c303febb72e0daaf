use mirrorkit_core::{
    CollectionSchema, ConfigDirective, DiagnosticPolicy, LocalDriver, MemoryLocalDriver, Record,
    ReconcileState, Severity, SqliteLocalDriver, Store,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn users_schema() -> CollectionSchema {
    CollectionSchema::new("users", &["id", "name", "cart"], "id").unwrap()
}

fn draft(name: &str) -> Record {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), json!(name));
    Record::new(fields)
}

fn sqlite_store(policy: DiagnosticPolicy) -> Store {
    let driver = SqliteLocalDriver::open_in_memory().unwrap();
    Store::open(
        "shop",
        vec![Arc::new(driver) as Arc<dyn LocalDriver>],
        vec![users_schema()],
        None,
        policy,
    )
    .unwrap()
}

#[test]
fn crud_roundtrip_through_a_sqlite_backed_store() {
    let store = sqlite_store(DiagnosticPolicy::new());
    assert_eq!(store.local_driver_name(), "sqlite");
    let repo = store.repository("users").unwrap();

    let created = repo.create(draft("max")).unwrap();
    assert!(created.ok());
    assert_eq!(created.state(), ReconcileState::LocalOnly);
    let mut stored = created.value().wait().unwrap();
    assert!(stored.updated_at_ms.is_some());

    stored.set_field("cart", json!(["podguznik"]));
    let updated = repo.update(stored.clone()).unwrap();
    let loaded = repo.get(stored.uuid).unwrap().value().wait().unwrap();
    assert_eq!(loaded.field("cart"), Some(&json!(["podguznik"])));
    assert_eq!(
        updated.value().wait().unwrap().field("cart"),
        Some(&json!(["podguznik"]))
    );

    let removed = repo.delete(stored.uuid).unwrap();
    assert_eq!(removed.value().wait().unwrap().uuid, stored.uuid);
    assert!(repo.list_ids().unwrap().is_empty());

    let miss = repo.get(stored.uuid).unwrap();
    assert!(!miss.ok());
    assert!(miss.error().is_some());
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    let record = draft("max");

    {
        let driver = SqliteLocalDriver::open(&path).unwrap();
        let stored = driver.create("users", &record).unwrap();
        assert_eq!(stored.uuid, record.uuid);
    }

    let driver = SqliteLocalDriver::open(&path).unwrap();
    let loaded = driver.get("users", record.uuid).unwrap().unwrap();
    assert_eq!(loaded.field("name"), Some(&json!("max")));
}

#[test]
fn schema_violations_surface_in_the_handle_not_as_errors() {
    let store = sqlite_store(DiagnosticPolicy::new());
    let repo = store.repository("users").unwrap();

    let mut record = draft("max");
    record.set_field("password", json!("hunter2"));

    let handle = repo.create(record).unwrap();
    assert!(!handle.ok());
    let fault = handle.error().unwrap();
    assert_eq!(fault.code, "schema_violation");
    assert!(fault.message.contains("password"));
}

#[test]
fn a_hard_db_rule_aborts_failing_operations_store_wide() {
    let policy = DiagnosticPolicy::new();
    // Coarse `db` rule: covers `db:users` emissions from every repository.
    policy.configure(ConfigDirective::ExactRule {
        key: "db".to_string(),
        severity: Some(Severity::Hard),
    });

    let store = sqlite_store(policy);
    let repo = store.repository("users").unwrap();

    let mut record = draft("max");
    record.set_field("password", json!("hunter2"));

    let err = repo.create(record).unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("shop"));
    assert!(rendered.contains("db:users"));

    // Valid writes are unaffected by the hard rule.
    repo.create(draft("ok")).unwrap();
}

#[test]
fn disabling_diagnostics_turns_hard_rules_off_entirely() {
    let policy = DiagnosticPolicy::new();
    policy.configure(ConfigDirective::ExactRule {
        key: "db".to_string(),
        severity: Some(Severity::Hard),
    });
    policy.configure(ConfigDirective::GlobalToggle(false));

    let store = sqlite_store(policy);
    let repo = store.repository("users").unwrap();

    let mut record = draft("max");
    record.set_field("password", json!("hunter2"));

    // Same failing operation, but the policy is disabled: the fault comes
    // back inside the handle instead of escalating.
    let handle = repo.create(record).unwrap();
    assert!(!handle.ok());
    assert!(handle.error().is_some());
}

#[test]
fn memory_store_behaves_like_the_sqlite_store() {
    let store = Store::open(
        "shop",
        vec![Arc::new(MemoryLocalDriver::new()) as Arc<dyn LocalDriver>],
        vec![users_schema()],
        None,
        DiagnosticPolicy::new(),
    )
    .unwrap();

    let repo = store.repository("users").unwrap();
    let handle = repo.create(draft("max")).unwrap();
    let stored = handle.value().wait().unwrap();

    let loaded = repo.get(stored.uuid).unwrap().value().wait().unwrap();
    assert_eq!(loaded, stored);
}
