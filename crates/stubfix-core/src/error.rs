//! Error types and error code constants for stubfix.
//!
//! This module provides a unified error type (`StubfixError`) that bridges
//! domain-specific errors from different subsystems (rule loading, registry
//! construction, configuration) into a common format suitable for JSON output.
//!
//! ## Error Code Mapping
//!
//! Exit codes:
//! - `2`: Invalid arguments (bad rule tables, bad configuration, bad CLI input)
//! - `3`: Resolution errors (input directory or rule file not found)
//! - `4`: Apply errors (failed to write rewritten stubs)
//! - `5`: Diagnostics reported while running in strict mode
//! - `6`: Rule conflicts detected while building the registry
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! ## Design
//!
//! - **Unified type**: `StubfixError` is the single error type for CLI output
//! - **Bridging**: `impl From<X> for StubfixError` bridges domain errors
//! - **Code mapping**: `OutputErrorCode` provides stable integer codes for JSON

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::{Conflict, ConflictError};
use crate::rules::RuleLoadError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad rule table, malformed config).
    InvalidArguments = 2,
    /// Resolution errors (input or rule file not found).
    ResolutionError = 3,
    /// Apply errors (failed to write rewritten stubs).
    ApplyError = 4,
    /// Diagnostics were produced and strict mode is on.
    DiagnosticsReported = 5,
    /// Two rules claim the same slot with incompatible operations.
    RuleConflict = 6,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
///
/// Every subsystem error is converted to this type before being rendered as
/// JSON output.
#[derive(Debug, Error)]
pub enum StubfixError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// A rule table could not be loaded.
    #[error("invalid rule table {source_name}: {message}")]
    InvalidRules {
        source_name: String,
        message: String,
    },

    /// File or directory not found.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// The rule registry rejected conflicting rules.
    #[error("{} conflicting rule pair(s)", .conflicts.len())]
    RuleConflict { conflicts: Vec<Conflict> },

    /// Failed to write output.
    #[error("apply error: {message}")]
    ApplyError {
        message: String,
        file: Option<String>,
    },

    /// Strict mode turned diagnostics into a failure.
    #[error("{count} diagnostic(s) reported in strict mode")]
    DiagnosticsReported { count: usize },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&StubfixError> for OutputErrorCode {
    fn from(err: &StubfixError) -> Self {
        match err {
            StubfixError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            StubfixError::InvalidRules { .. } => OutputErrorCode::InvalidArguments,
            StubfixError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            StubfixError::RuleConflict { .. } => OutputErrorCode::RuleConflict,
            StubfixError::ApplyError { .. } => OutputErrorCode::ApplyError,
            StubfixError::DiagnosticsReported { .. } => OutputErrorCode::DiagnosticsReported,
            StubfixError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<StubfixError> for OutputErrorCode {
    fn from(err: StubfixError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<ConflictError> for StubfixError {
    fn from(err: ConflictError) -> Self {
        StubfixError::RuleConflict {
            conflicts: err.conflicts,
        }
    }
}

impl From<RuleLoadError> for StubfixError {
    fn from(err: RuleLoadError) -> Self {
        match err {
            RuleLoadError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                StubfixError::FileNotFound {
                    path: path.display().to_string(),
                }
            }
            RuleLoadError::Io { path, source } => StubfixError::InternalError {
                message: format!("failed to read {}: {}", path.display(), source),
            },
            RuleLoadError::Toml {
                source_name,
                message,
            } => StubfixError::InvalidRules {
                source_name,
                message,
            },
            RuleLoadError::InvalidRule {
                source_name,
                index,
                message,
            } => StubfixError::InvalidRules {
                source_name,
                message: format!("rule #{}: {}", index + 1, message),
            },
        }
    }
}

impl From<ConfigError> for StubfixError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => StubfixError::FileNotFound {
                path: path.display().to_string(),
            },
            ConfigError::Io { path, source } => StubfixError::InternalError {
                message: format!("failed to read {}: {}", path.display(), source),
            },
            ConfigError::Parse { path, message } => StubfixError::InvalidArguments {
                message: format!("invalid config {}: {}", path.display(), message),
                details: None,
            },
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl StubfixError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        StubfixError::InvalidArguments {
            message: message.into(),
            details: None,
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        StubfixError::FileNotFound { path: path.into() }
    }

    /// Create an apply error for a specific file.
    pub fn apply(message: impl Into<String>, file: impl Into<String>) -> Self {
        StubfixError::ApplyError {
            message: message.into(),
            file: Some(file.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        StubfixError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
