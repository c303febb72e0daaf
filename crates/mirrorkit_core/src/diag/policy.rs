//! Diagnostic policy: rule storage, resolution and emission.
//!
//! # Responsibility
//! - Hold the enablement mode and the ordered severity rules.
//! - Resolve the effective severity for key and pattern queries.
//! - Emit events through the `log` facade or escalate them.
//!
//! # Invariants
//! - Rule order is insertion order; updating a key keeps its slot.
//! - `resolve` never writes; `configure`/`reset` are the only writers.
//! - An empty rule key never participates in matching.

use log::Level;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock};

/// The wildcard rule key. A truthy wildcard severity wins over every
/// specific rule.
pub const WILDCARD_KEY: &str = "*";

/// Global enablement state of the policy.
///
/// - `Disabled` - every emission is suppressed.
/// - `Enabled` - emissions are routed through the rules.
/// - `Custom` - same routing as `Enabled`; entered automatically when a
///   per-key rule is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagMode {
    Disabled,
    Enabled,
    Custom,
}

/// Severity assigned to a rule key.
///
/// - `Off` - the rule is parked; matching it suppresses the event.
/// - `Soft` - informative, only logs.
/// - `Hard` - error-level emissions become failures the caller must handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Off,
    Soft,
    Hard,
}

impl Severity {
    /// Whether this severity lets an event manifest at all.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Stable string form used in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Soft => "soft",
            Self::Hard => "hard",
        }
    }
}

/// Emission level, mapped onto the `log` facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Log,
    Debug,
    Warn,
    Error,
}

impl DiagLevel {
    fn log_level(self) -> Level {
        match self {
            Self::Log => Level::Info,
            Self::Debug => Level::Debug,
            Self::Warn => Level::Warn,
            Self::Error => Level::Error,
        }
    }
}

/// One configuration instruction for the policy.
///
/// `ExactRule` with `severity: None` toggles the key: an absent or `Off`
/// rule becomes `Soft`, an active rule becomes `Off`.
#[derive(Debug, Clone)]
pub enum ConfigDirective {
    GlobalToggle(bool),
    ExactRule {
        key: String,
        severity: Option<Severity>,
    },
}

/// A severity lookup: either a literal type key or a pattern tested
/// against the registered rule keys.
///
/// The two forms match in opposite directions: a key query matches a rule
/// whose key occurs inside the query (so a coarse `db` rule covers a
/// `db:users` emission) and skips parked rules, while a pattern query is
/// tested against each rule key and takes the first match as-is.
#[derive(Debug, Clone, Copy)]
pub enum RuleQuery<'a> {
    Key(&'a str),
    Pattern(&'a Regex),
}

impl Display for RuleQuery<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Pattern(pattern) => write!(f, "{}", pattern.as_str()),
        }
    }
}

/// Failure produced when a hard-routed error-level event is emitted.
///
/// Carries the emitting instance, the queried type key and the original
/// message; all three appear in the rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardDiagnosticError {
    pub instance: String,
    pub type_key: String,
    pub message: String,
}

impl Display for HardDiagnosticError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            render_line(&self.instance, &self.type_key, &self.message)
        )
    }
}

impl Error for HardDiagnosticError {}

fn log_prefix(instance: &str) -> String {
    if instance.is_empty() {
        "[mirrorkit]".to_string()
    } else {
        format!("[mirrorkit:{instance}]")
    }
}

fn render_line(instance: &str, type_key: &str, message: &str) -> String {
    format!("{}:{type_key} - {message}", log_prefix(instance))
}

#[derive(Debug)]
struct PolicyState {
    mode: DiagMode,
    rules: Vec<(String, Severity)>,
}

impl PolicyState {
    fn pristine() -> Self {
        Self {
            mode: DiagMode::Disabled,
            rules: Vec::new(),
        }
    }

    fn severity_of(&self, key: &str) -> Option<Severity> {
        self.rules
            .iter()
            .find(|(rule_key, _)| rule_key == key)
            .map(|(_, severity)| *severity)
    }

    fn resolve(&self, query: RuleQuery<'_>) -> Severity {
        if let Some(severity) = self.severity_of(WILDCARD_KEY) {
            if severity.is_active() {
                return severity;
            }
        }

        match query {
            RuleQuery::Key(key) => {
                if let Some(severity) = self.severity_of(key) {
                    if severity.is_active() {
                        return severity;
                    }
                }
                self.rules
                    .iter()
                    .find(|(rule_key, severity)| {
                        !rule_key.is_empty() && key.contains(rule_key.as_str()) && severity.is_active()
                    })
                    .map_or(Severity::Off, |(_, severity)| *severity)
            }
            RuleQuery::Pattern(pattern) => self
                .rules
                .iter()
                .find(|(rule_key, _)| pattern.is_match(rule_key))
                .map_or(Severity::Off, |(_, severity)| *severity),
        }
    }
}

/// Shared diagnostic policy handle.
///
/// Cloning is cheap and every clone observes the same state. Consumers
/// receive a clone at construction instead of reaching for process-global
/// state; `reset` restores the pristine state for test isolation.
#[derive(Debug, Clone)]
pub struct DiagnosticPolicy {
    state: Arc<RwLock<PolicyState>>,
}

impl Default for DiagnosticPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticPolicy {
    /// Creates a disabled policy with no rules.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PolicyState::pristine())),
        }
    }

    /// Applies one configuration directive.
    ///
    /// Boolean toggles are idempotent. Any rule directive switches the
    /// mode to `Custom`.
    pub fn configure(&self, directive: ConfigDirective) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match directive {
            ConfigDirective::GlobalToggle(enabled) => {
                state.mode = if enabled {
                    DiagMode::Enabled
                } else {
                    DiagMode::Disabled
                };
            }
            ConfigDirective::ExactRule { key, severity } => {
                state.mode = DiagMode::Custom;
                let next = match severity {
                    Some(severity) => severity,
                    None => match state.severity_of(&key) {
                        Some(current) if current.is_active() => Severity::Off,
                        _ => Severity::Soft,
                    },
                };
                match state.rules.iter().position(|(rule_key, _)| *rule_key == key) {
                    Some(idx) => state.rules[idx].1 = next,
                    None => state.rules.push((key, next)),
                }
            }
        }
    }

    /// Restores the pristine state: disabled, no rules.
    pub fn reset(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *state = PolicyState::pristine();
    }

    /// Current enablement mode.
    pub fn mode(&self) -> DiagMode {
        self.read().mode
    }

    /// Whether any routing happens at all.
    pub fn is_enabled(&self) -> bool {
        self.read().mode != DiagMode::Disabled
    }

    /// Effective severity for a query, per the routing rules.
    ///
    /// A truthy wildcard rule wins outright. Key queries then try an exact
    /// active rule, then the first active rule whose key occurs inside the
    /// query, in insertion order. Pattern queries take the severity of the
    /// first rule key the pattern matches, active or not.
    pub fn resolve(&self, query: RuleQuery<'_>) -> Severity {
        self.read().resolve(query)
    }

    /// Routes one event.
    ///
    /// Suppressed when the policy is disabled, and in custom mode also
    /// when the resolved severity is `Off`. In plain enabled mode an
    /// unmatched event still logs softly. A `Hard` severity combined
    /// with `DiagLevel::Error` fails instead of logging; everything else
    /// logs at the mapped level and returns `Ok`.
    pub fn emit(
        &self,
        instance: &str,
        query: RuleQuery<'_>,
        message: &str,
        level: DiagLevel,
    ) -> Result<(), HardDiagnosticError> {
        let (mode, resolved) = {
            let state = self.read();
            if state.mode == DiagMode::Disabled {
                return Ok(());
            }
            (state.mode, state.resolve(query))
        };

        let severity = if resolved.is_active() {
            resolved
        } else if mode == DiagMode::Enabled {
            Severity::Soft
        } else {
            return Ok(());
        };

        if severity == Severity::Hard && level == DiagLevel::Error {
            return Err(HardDiagnosticError {
                instance: instance.to_string(),
                type_key: query.to_string(),
                message: message.to_string(),
            });
        }

        log::log!(
            level.log_level(),
            "{}",
            render_line(instance, &query.to_string(), message)
        );
        Ok(())
    }

    /// Emits at informational level. Never escalates.
    pub fn log(&self, instance: &str, query: RuleQuery<'_>, message: &str) {
        // Only error-level emissions can fail.
        let _ = self.emit(instance, query, message, DiagLevel::Log);
    }

    /// Emits at debug level. Never escalates.
    pub fn debug(&self, instance: &str, query: RuleQuery<'_>, message: &str) {
        let _ = self.emit(instance, query, message, DiagLevel::Debug);
    }

    /// Emits at warn level. Never escalates.
    pub fn warn(&self, instance: &str, query: RuleQuery<'_>, message: &str) {
        let _ = self.emit(instance, query, message, DiagLevel::Warn);
    }

    /// Emits at error level. Fails when a hard rule matches.
    pub fn error(
        &self,
        instance: &str,
        query: RuleQuery<'_>,
        message: &str,
    ) -> Result<(), HardDiagnosticError> {
        self.emit(instance, query, message, DiagLevel::Error)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PolicyState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}
