//! Diagnostic routing for store, driver and repository instrumentation.
//!
//! # Responsibility
//! - Decide per call site whether an instrumentation event is suppressed,
//!   logged, or escalated into a synchronous failure.
//! - Keep routing rules injectable so tests never share process state.
//!
//! # Invariants
//! - A disabled policy never logs and never fails, whatever the rules say.
//! - Hard escalation applies to error-level emissions only.
//!
//! # Type keys
//! Hierarchical, colon-separated: `*`, `connection`, `driver`,
//! `driver:<name>`, `db`, `db:<name>`, `db:<name>:entity`.

pub mod policy;

pub use policy::{
    ConfigDirective, DiagLevel, DiagMode, DiagnosticPolicy, HardDiagnosticError, RuleQuery,
    Severity, WILDCARD_KEY,
};
