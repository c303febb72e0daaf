//! Canonical record shape and collection schemas.
//!
//! # Responsibility
//! - Keep one storage-agnostic record shape for every driver.
//! - Validate records against their collection's declared columns.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another record.
//! - A record may only carry fields its collection declares.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every stored record.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type RecordId = Uuid;

/// One stored document: a stable id plus named JSON field values.
///
/// `updated_at_ms` is stamped by the local driver on every write; a draft
/// that has never been stored carries `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub uuid: RecordId,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    pub updated_at_ms: Option<i64>,
}

impl Record {
    /// Creates a draft record with a generated stable id.
    pub fn new(fields: BTreeMap<String, Value>) -> Self {
        Self::with_id(Uuid::new_v4(), fields)
    }

    /// Creates a draft record with a caller-provided stable id. Used by
    /// import paths where identity already exists externally.
    pub fn with_id(uuid: RecordId, fields: BTreeMap<String, Value>) -> Self {
        Self {
            uuid,
            fields,
            updated_at_ms: None,
        }
    }

    /// Reads one field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets one field value, replacing any previous one.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

/// Declared shape of one collection.
///
/// The explicit column list replaces per-instance introspection: a
/// repository looks the schema up instead of inspecting record values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    name: String,
    columns: Vec<String>,
    primary_key: String,
}

impl CollectionSchema {
    /// Builds a schema after validating its own consistency.
    pub fn new(
        name: impl Into<String>,
        columns: &[&str],
        primary_key: &str,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchemaError::EmptyCollectionName);
        }

        let mut seen: Vec<&str> = Vec::with_capacity(columns.len());
        for &column in columns {
            if column.trim().is_empty() {
                return Err(SchemaError::EmptyColumn {
                    collection: name,
                });
            }
            if seen.contains(&column) {
                return Err(SchemaError::DuplicateColumn {
                    collection: name,
                    column: column.to_string(),
                });
            }
            seen.push(column);
        }

        if !seen.contains(&primary_key) {
            return Err(SchemaError::UnknownPrimaryKey {
                collection: name,
                column: primary_key.to_string(),
            });
        }

        Ok(Self {
            name,
            columns: seen.into_iter().map(ToString::to_string).collect(),
            primary_key: primary_key.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|declared| declared == column)
    }

    /// Rejects records carrying fields this collection never declared.
    /// Missing declared fields are allowed; columns are nullable.
    pub fn validate_record(&self, record: &Record) -> Result<(), SchemaError> {
        for field in record.fields.keys() {
            if !self.has_column(field) {
                return Err(SchemaError::UnknownColumn {
                    collection: self.name.clone(),
                    column: field.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Schema construction and validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    EmptyCollectionName,
    EmptyColumn {
        collection: String,
    },
    DuplicateColumn {
        collection: String,
        column: String,
    },
    UnknownPrimaryKey {
        collection: String,
        column: String,
    },
    UnknownColumn {
        collection: String,
        column: String,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCollectionName => write!(f, "collection name must not be empty"),
            Self::EmptyColumn { collection } => {
                write!(f, "collection `{collection}` declares an empty column name")
            }
            Self::DuplicateColumn { collection, column } => {
                write!(f, "collection `{collection}` declares column `{column}` twice")
            }
            Self::UnknownPrimaryKey { collection, column } => write!(
                f,
                "collection `{collection}` names `{column}` as primary key but does not declare it"
            ),
            Self::UnknownColumn { collection, column } => write!(
                f,
                "record carries column `{column}` not declared by collection `{collection}`"
            ),
        }
    }
}

impl Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::{CollectionSchema, Record, SchemaError};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn users_schema() -> CollectionSchema {
        CollectionSchema::new("users", &["id", "name", "cart"], "id")
            .expect("schema should build")
    }

    #[test]
    fn new_record_starts_without_store_timestamp() {
        let record = Record::new(BTreeMap::new());
        assert!(record.updated_at_ms.is_none());
        assert!(record.fields.is_empty());
    }

    #[test]
    fn field_accessors_roundtrip() {
        let mut record = Record::new(BTreeMap::new());
        record.set_field("name", json!("max"));
        assert_eq!(record.field("name"), Some(&json!("max")));
        assert!(record.field("missing").is_none());
    }

    #[test]
    fn schema_accepts_declared_fields_and_allows_partial_records() {
        let schema = users_schema();
        let mut record = Record::new(BTreeMap::new());
        record.set_field("name", json!("max"));

        schema
            .validate_record(&record)
            .expect("partial record with declared fields is valid");
    }

    #[test]
    fn schema_rejects_undeclared_fields() {
        let schema = users_schema();
        let mut record = Record::new(BTreeMap::new());
        record.set_field("password", json!("hunter2"));

        let err = schema
            .validate_record(&record)
            .expect_err("undeclared field must fail");
        assert_eq!(
            err,
            SchemaError::UnknownColumn {
                collection: "users".to_string(),
                column: "password".to_string(),
            }
        );
    }

    #[test]
    fn schema_rejects_unknown_primary_key() {
        let err = CollectionSchema::new("users", &["name"], "id")
            .expect_err("primary key outside columns must fail");
        assert!(matches!(err, SchemaError::UnknownPrimaryKey { .. }));
    }

    #[test]
    fn schema_rejects_duplicate_columns_and_empty_names() {
        assert!(matches!(
            CollectionSchema::new("users", &["id", "id"], "id"),
            Err(SchemaError::DuplicateColumn { .. })
        ));
        assert!(matches!(
            CollectionSchema::new("  ", &["id"], "id"),
            Err(SchemaError::EmptyCollectionName)
        ));
        assert!(matches!(
            CollectionSchema::new("users", &["id", " "], "id"),
            Err(SchemaError::EmptyColumn { .. })
        ));
    }
}
