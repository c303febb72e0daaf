//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `mirrorkit_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

use mirrorkit_core::{
    CollectionSchema, DiagnosticPolicy, LocalDriver, MemoryLocalDriver, Store,
};
use std::sync::Arc;

fn main() {
    println!("mirrorkit_core version={}", mirrorkit_core::core_version());

    let schema = match CollectionSchema::new("probe", &["id"], "id") {
        Ok(schema) => schema,
        Err(err) => {
            eprintln!("mirrorkit_core schema bootstrap failed: {err}");
            std::process::exit(1);
        }
    };

    let store = match Store::open(
        "smoke",
        vec![Arc::new(MemoryLocalDriver::new()) as Arc<dyn LocalDriver>],
        vec![schema],
        None,
        DiagnosticPolicy::new(),
    ) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("mirrorkit_core store bootstrap failed: {err}");
            std::process::exit(1);
        }
    };

    println!("mirrorkit_core driver={}", store.local_driver_name());
}
