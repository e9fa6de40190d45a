//! Diagnostics collected during a run.
//!
//! Diagnostics are values, never panics or early returns across module
//! boundaries: each module's processing appends to its own list, and the run
//! driver merges them. The driver decides whether a non-empty list is fatal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Compact reference to a fix rule, embedded in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRef {
    pub id: usize,
    pub selector: String,
    pub operation: String,
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule #{} ({} {})", self.id, self.operation, self.selector)
    }
}

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A module could not be parsed and was emitted unchanged.
    ParseError {
        module: String,
        line: u32,
        col: u32,
        message: String,
    },
    /// Two rules claim the same slot with incompatible operations.
    ConflictError {
        first: RuleRef,
        second: RuleRef,
        message: String,
    },
    /// A non-wildcard rule matched nothing across the whole run.
    DanglingRuleWarning { rule: RuleRef },
    /// A rule matched a symbol but could not be applied to it.
    UnsupportedOperation {
        module: String,
        symbol: String,
        rule: RuleRef,
        reason: String,
    },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::ParseError { .. } | Diagnostic::ConflictError { .. } => Severity::Error,
            Diagnostic::DanglingRuleWarning { .. } | Diagnostic::UnsupportedOperation { .. } => {
                Severity::Warning
            }
        }
    }

    /// Module the diagnostic belongs to, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            Diagnostic::ParseError { module, .. }
            | Diagnostic::UnsupportedOperation { module, .. } => Some(module),
            Diagnostic::ConflictError { .. } | Diagnostic::DanglingRuleWarning { .. } => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ParseError {
                module,
                line,
                col,
                message,
            } => write!(f, "{}:{}:{}: {}", module, line, col, message),
            Diagnostic::ConflictError {
                first,
                second,
                message,
            } => write!(f, "{} conflicts with {}: {}", first, second, message),
            Diagnostic::DanglingRuleWarning { rule } => {
                write!(f, "fix was not applied: {} matched nothing", rule)
            }
            Diagnostic::UnsupportedOperation {
                module,
                symbol,
                rule,
                reason,
            } => write!(f, "{}: {} skipped on {}: {}", module, rule, symbol, reason),
        }
    }
}
