//! JSON output types and serialization for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Status first:** Every response has `status` as first field
//! 2. **Deterministic:** Same input -> same output (field order, array ordering)
//! 3. **Versioned:** Schema version in response enables forward compatibility

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::error::{OutputErrorCode, StubfixError};
use crate::hash::ContentHash;
use crate::rules::FixRule;

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Errors
// ============================================================================

/// Error information for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code, also the process exit code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    /// Error-specific structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// Create from a StubfixError.
    pub fn from_error(err: &StubfixError) -> Self {
        let code = OutputErrorCode::from(err).code();
        let message = err.to_string();

        let details = match err {
            StubfixError::InvalidArguments { details, .. } => details.clone(),
            StubfixError::RuleConflict { conflicts } => serde_json::to_value(conflicts).ok(),
            StubfixError::ApplyError {
                file: Some(file), ..
            } => Some(serde_json::json!({ "file": file })),
            _ => None,
        };

        ErrorInfo {
            code,
            message,
            details,
        }
    }
}

/// Response for any failed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Error information.
    pub error: ErrorInfo,
    /// Diagnostics gathered before the failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ErrorResponse {
    pub fn from_error(err: &StubfixError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

// ============================================================================
// fix
// ============================================================================

/// Per-module result line of the `fix` report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub module: String,
    pub changed: bool,
    pub before_hash: ContentHash,
    pub after_hash: ContentHash,
    /// Number of rule applications that changed something.
    pub rules_applied: usize,
}

/// Response for `stubfix fix`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixResponse {
    /// Status: "ok".
    pub status: String,
    pub schema_version: String,
    /// True when nothing was written.
    pub dry_run: bool,
    pub modules: Vec<ModuleSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FixResponse {
    pub fn new(dry_run: bool, modules: Vec<ModuleSummary>, diagnostics: Vec<Diagnostic>) -> Self {
        FixResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            dry_run,
            modules,
            diagnostics,
        }
    }

    pub fn changed_count(&self) -> usize {
        self.modules.iter().filter(|m| m.changed).count()
    }
}

// ============================================================================
// rules
// ============================================================================

/// One rule as listed by `stubfix rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleInfo {
    pub id: usize,
    pub selector: String,
    pub priority: i32,
    pub specificity: usize,
    pub operation: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RuleInfo {
    pub fn from_rule(rule: &FixRule) -> Self {
        RuleInfo {
            id: rule.id.0,
            selector: rule.selector.to_string(),
            priority: rule.priority,
            specificity: rule.selector.specificity(),
            operation: serde_json::to_value(&rule.operation).unwrap_or(serde_json::Value::Null),
            description: rule.description.clone(),
        }
    }
}

/// Response for `stubfix rules`: rules in precedence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesResponse {
    pub status: String,
    pub schema_version: String,
    pub rules: Vec<RuleInfo>,
}

impl RulesResponse {
    pub fn new(rules: Vec<RuleInfo>) -> Self {
        RulesResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            rules,
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
