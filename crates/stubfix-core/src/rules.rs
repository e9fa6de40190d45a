//! Fix rules: selector, priority and a structural operation.
//!
//! Rules are declared in TOML tables:
//!
//! ```toml
//! [[rule]]
//! module = "QtWidgets"
//! class = "QLineEdit"
//! member = "setText"
//! priority = 10
//! [rule.operation]
//! kind = "replace_signature"
//! signature = "(self, a0: typing.Optional[str]) -> None"
//! ```
//!
//! Rule ids are assigned in declaration order across every table loaded
//! into one [`RuleSet`]; that order is the final tie-breaker of precedence.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::RuleRef;
use crate::selector::Selector;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable identifier of a rule within one run (its declaration index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub usize);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Operation payload helpers
// ============================================================================

/// Which annotation `RemoveAnnotation` clears.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AnnotationTarget {
    #[default]
    Return,
    Param(String),
    All,
}

impl TryFrom<String> for AnnotationTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "return" => Ok(AnnotationTarget::Return),
            "all" => Ok(AnnotationTarget::All),
            other => match other.strip_prefix("param:") {
                Some(name) if !name.trim().is_empty() => {
                    Ok(AnnotationTarget::Param(name.trim().to_string()))
                }
                _ => Err(format!(
                    "invalid annotation target '{}' (expected return, all or param:<name>)",
                    other
                )),
            },
        }
    }
}

impl fmt::Display for AnnotationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationTarget::Return => f.write_str("return"),
            AnnotationTarget::Param(name) => write!(f, "param:{}", name),
            AnnotationTarget::All => f.write_str("all"),
        }
    }
}

impl Serialize for AnnotationTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AnnotationTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        AnnotationTarget::try_from(String::deserialize(deserializer)?)
            .map_err(serde::de::Error::custom)
    }
}

/// Where `InsertMember` places new declarations in the owning container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum InsertPosition {
    Start,
    #[default]
    End,
    Before(String),
    After(String),
}

impl TryFrom<String> for InsertPosition {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "start" => Ok(InsertPosition::Start),
            "end" => Ok(InsertPosition::End),
            other => {
                if let Some(name) = other.strip_prefix("before:") {
                    Ok(InsertPosition::Before(name.trim().to_string()))
                } else if let Some(name) = other.strip_prefix("after:") {
                    Ok(InsertPosition::After(name.trim().to_string()))
                } else {
                    Err(format!(
                        "invalid insert position '{}' (expected start, end, before:<name> or after:<name>)",
                        other
                    ))
                }
            }
        }
    }
}

impl fmt::Display for InsertPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertPosition::Start => f.write_str("start"),
            InsertPosition::End => f.write_str("end"),
            InsertPosition::Before(name) => write!(f, "before:{}", name),
            InsertPosition::After(name) => write!(f, "after:{}", name),
        }
    }
}

impl Serialize for InsertPosition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InsertPosition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        InsertPosition::try_from(String::deserialize(deserializer)?)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Operation
// ============================================================================

/// The closed set of structural patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Merge `# type: ignore[code]` into the declaration's trailing comment.
    AddAnnotationSuppression { code: String },
    /// Clear a return annotation, one parameter annotation, or all of them.
    RemoveAnnotation {
        #[serde(default)]
        target: AnnotationTarget,
    },
    /// Substitute the parameter/return shape, optionally guarded by the
    /// currently expected shape.
    ReplaceSignature {
        signature: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<String>,
    },
    /// Edit a signal's variants: remove first, then add.
    RewriteSignalVariants {
        #[serde(default)]
        add: Vec<Vec<String>>,
        #[serde(default)]
        remove: Vec<Vec<String>>,
    },
    /// Parse `code` as declarations and insert them into the container.
    /// With `replace`, a same-named member of a different shape is swapped
    /// out and the new declarations take its place.
    InsertMember {
        code: String,
        #[serde(default)]
        position: InsertPosition,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        replace: bool,
    },
    /// Remove a member, or only the overload whose signature matches.
    DeleteMember {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Replace the stub body.
    ReplaceBody { body: String },
}

/// The part of a declaration an operation writes.
///
/// Within one symbol the first rule to claim a slot wins; later rules for the
/// same slot are shadowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Suppression(String),
    Annotation(AnnotationTarget),
    /// Keyed by the `expect` guard so distinct overloads can be rewritten.
    Signature(Option<String>),
    SignalVariants,
    Insert(String),
    /// `None` is the whole member, `Some` one overload.
    Existence(Option<String>),
    Body,
}

impl Operation {
    /// Stable snake_case name, identical to the TOML `kind`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operation::AddAnnotationSuppression { .. } => "add_annotation_suppression",
            Operation::RemoveAnnotation { .. } => "remove_annotation",
            Operation::ReplaceSignature { .. } => "replace_signature",
            Operation::RewriteSignalVariants { .. } => "rewrite_signal_variants",
            Operation::InsertMember { .. } => "insert_member",
            Operation::DeleteMember { .. } => "delete_member",
            Operation::ReplaceBody { .. } => "replace_body",
        }
    }

    pub fn slot(&self) -> Slot {
        match self {
            Operation::AddAnnotationSuppression { code } => Slot::Suppression(code.clone()),
            Operation::RemoveAnnotation { target } => Slot::Annotation(target.clone()),
            Operation::ReplaceSignature { expect, .. } => Slot::Signature(expect.clone()),
            Operation::RewriteSignalVariants { .. } => Slot::SignalVariants,
            Operation::InsertMember { code, .. } => Slot::Insert(code.clone()),
            Operation::DeleteMember { signature } => Slot::Existence(signature.clone()),
            Operation::ReplaceBody { .. } => Slot::Body,
        }
    }

    /// Whether two operations may both apply to the same symbol.
    ///
    /// Identical operations are compatible. `DeleteMember` of the whole
    /// member is incompatible with anything else touching it, and signature
    /// replacement is incompatible with annotation removal. Otherwise two
    /// operations conflict when they write the same slot with different
    /// payloads.
    pub fn compatible_with(&self, other: &Operation) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (
                Operation::DeleteMember { signature: Some(_) },
                Operation::DeleteMember { signature: Some(_) },
            ) => true,
            (Operation::DeleteMember { .. }, _) | (_, Operation::DeleteMember { .. }) => false,
            (Operation::ReplaceSignature { .. }, Operation::RemoveAnnotation { .. })
            | (Operation::RemoveAnnotation { .. }, Operation::ReplaceSignature { .. }) => false,
            _ => self.slot() != other.slot(),
        }
    }
}

// ============================================================================
// Fix Rule
// ============================================================================

/// A declarative fix: where it applies, how strongly, and what it does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixRule {
    pub id: RuleId,
    pub selector: Selector,
    pub priority: i32,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FixRule {
    pub fn to_ref(&self) -> RuleRef {
        RuleRef {
            id: self.id.0,
            selector: self.selector.to_string(),
            operation: self.operation.kind_name().to_string(),
        }
    }
}

// ============================================================================
// Rule tables
// ============================================================================

/// Errors raised while loading rule tables.
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{source_name}: {message}")]
    Toml {
        source_name: String,
        message: String,
    },

    #[error("{source_name}: rule #{}: {message}", .index + 1)]
    InvalidRule {
        source_name: String,
        index: usize,
        message: String,
    },
}

/// Top level of a rule table file.
#[derive(Debug, Deserialize)]
struct RuleTable {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleEntry>,
}

/// One `[[rule]]` entry as written in TOML.
#[derive(Debug, Deserialize)]
struct RuleEntry {
    module: String,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    member: Option<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    description: Option<String>,
    operation: Operation,
}

/// Ordered collection of rules gathered from one or more tables.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<FixRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, assigning the next id.
    pub fn push(&mut self, selector: Selector, priority: i32, operation: Operation) -> RuleId {
        let id = RuleId(self.rules.len());
        self.rules.push(FixRule {
            id,
            selector,
            priority,
            operation,
            description: None,
        });
        id
    }

    /// Parse a TOML rule table and append its rules. Returns how many were added.
    pub fn extend_from_toml(&mut self, source_name: &str, text: &str) -> Result<usize, RuleLoadError> {
        let table: RuleTable = toml::from_str(text).map_err(|e| RuleLoadError::Toml {
            source_name: source_name.to_string(),
            message: e.message().to_string(),
        })?;

        let count = table.rules.len();
        for (index, entry) in table.rules.into_iter().enumerate() {
            let selector = Selector::new(
                &entry.module,
                entry.class.as_deref(),
                entry.member.as_deref(),
            )
            .map_err(|e| RuleLoadError::InvalidRule {
                source_name: source_name.to_string(),
                index,
                message: e.to_string(),
            })?;
            let id = RuleId(self.rules.len());
            self.rules.push(FixRule {
                id,
                selector,
                priority: entry.priority,
                operation: entry.operation,
                description: entry.description,
            });
        }
        tracing::debug!(source = source_name, count, "loaded rule table");
        Ok(count)
    }

    /// Read and append a rule table file.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize, RuleLoadError> {
        let text = fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.extend_from_toml(&path.display().to_string(), &text)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn into_rules(self) -> Vec<FixRule> {
        self.rules
    }
}

// ============================================================================
// Tests
// ============================================================================
