//! Store bootstrap: local driver selection and repository registry.
//!
//! # Responsibility
//! - Pick the first supported local driver from the configured candidates.
//! - Bind one repository per collection schema against the shared drivers.
//!
//! # Invariants
//! - Driver selection happens once at bootstrap; there is no teardown.
//! - Every repository of a store shares the same policy and drivers.

use crate::diag::{DiagnosticPolicy, RuleQuery};
use crate::driver::{LocalDriver, MemoryLocalDriver, RemoteDriver};
use crate::model::CollectionSchema;
use crate::repo::RecordRepository;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Store bootstrap errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    DuplicateCollection(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateCollection(collection) => {
                write!(f, "collection registered twice: {collection}")
            }
        }
    }
}

impl Error for StoreError {}

/// A named connection: selected local driver, optional remote mirror and
/// the repositories bound to them.
pub struct Store {
    name: String,
    policy: DiagnosticPolicy,
    local_driver_name: String,
    repositories: BTreeMap<String, RecordRepository>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("local_driver_name", &self.local_driver_name)
            .field("repositories", &self.repositories.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Opens a store.
    ///
    /// The first supported candidate becomes the local driver; with no
    /// supported candidate the in-memory driver steps in, with a warning
    /// routed through the policy under the `connection` type key.
    pub fn open(
        name: impl Into<String>,
        candidates: Vec<Arc<dyn LocalDriver>>,
        schemas: Vec<CollectionSchema>,
        remote: Option<Arc<dyn RemoteDriver>>,
        policy: DiagnosticPolicy,
    ) -> Result<Self, StoreError> {
        let name = name.into();

        let local: Arc<dyn LocalDriver> =
            match candidates.into_iter().find(|driver| driver.is_supported()) {
                Some(driver) => {
                    policy.log(
                        &name,
                        RuleQuery::Key("connection"),
                        &format!(
                            "using local driver `{}` as the first supported candidate",
                            driver.driver_name()
                        ),
                    );
                    driver
                }
                None => {
                    policy.warn(
                        &name,
                        RuleQuery::Key("connection"),
                        "no supported local driver configured; falling back to in-memory storage",
                    );
                    Arc::new(MemoryLocalDriver::new())
                }
            };

        let mut repositories = BTreeMap::new();
        for schema in schemas {
            let collection = schema.name().to_string();
            if repositories.contains_key(&collection) {
                return Err(StoreError::DuplicateCollection(collection));
            }

            policy.debug(
                &name,
                RuleQuery::Key(&format!("db:{}", collection.to_lowercase())),
                "repository registered",
            );
            repositories.insert(
                collection,
                RecordRepository::new(
                    name.clone(),
                    schema,
                    policy.clone(),
                    Arc::clone(&local),
                    remote.clone(),
                ),
            );
        }

        Ok(Self {
            name,
            policy,
            local_driver_name: local.driver_name().to_string(),
            repositories,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The policy every repository of this store emits through.
    pub fn policy(&self) -> &DiagnosticPolicy {
        &self.policy
    }

    /// Name of the selected local driver.
    pub fn local_driver_name(&self) -> &str {
        &self.local_driver_name
    }

    /// Looks one repository up by collection name.
    pub fn repository(&self, collection: &str) -> Option<&RecordRepository> {
        self.repositories.get(collection)
    }

    /// Registered collection names, sorted.
    pub fn collections(&self) -> Vec<&str> {
        self.repositories.keys().map(String::as_str).collect()
    }
}
