//! Error types for stub parsing.

use thiserror::Error;

/// A module could not be parsed.
///
/// Positions are 1-indexed; `expected` describes the declaration shape the
/// parser was looking for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {col}: expected {expected}, found {found}")]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub expected: String,
    pub found: String,
}

impl ParseError {
    pub fn new(line: u32, col: u32, expected: impl Into<String>, found: impl Into<String>) -> Self {
        ParseError {
            line,
            col,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// A rule payload (signature, call arguments) could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {what} '{text}' at offset {offset}")]
pub struct SignatureError {
    pub what: &'static str,
    pub text: String,
    pub offset: usize,
}
