//! Qualified-name selectors used to target fix rules.
//!
//! A [`Selector`] is a `(module, class?, member?)` triple of name patterns.
//! Each pattern is either a literal name, a glob, or the full wildcard `*`.
//! Nested classes are addressed by their dotted class path (`Outer.Inner`),
//! so a class pattern is matched against the whole path.
//!
//! Absent components are structural: a selector without a class component
//! only matches module-level symbols, and a selector without a member
//! component only matches the container itself (module or class).

use std::fmt;

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building selectors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// A pattern component was empty.
    #[error("empty {component} pattern")]
    Empty { component: &'static str },

    /// The glob syntax was rejected.
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
}

// ============================================================================
// Pattern
// ============================================================================

/// A single name pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// `*`: matches every name.
    Any,
    /// Exact name.
    Literal(String),
    /// Any other glob (`set*`, `Q?Widget`, `{a,b}`).
    Glob { text: String, matcher: GlobMatcher },
}

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

impl Pattern {
    /// Parse a pattern, classifying it as wildcard, literal or glob.
    pub fn parse(text: &str) -> Result<Pattern, SelectorError> {
        Self::parse_component(text, "name")
    }

    fn parse_component(text: &str, component: &'static str) -> Result<Pattern, SelectorError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SelectorError::Empty { component });
        }
        if text == "*" {
            return Ok(Pattern::Any);
        }
        if !text.contains(GLOB_META) {
            return Ok(Pattern::Literal(text.to_string()));
        }
        let glob = Glob::new(text).map_err(|e| SelectorError::InvalidGlob {
            pattern: text.to_string(),
            message: e.kind().to_string(),
        })?;
        Ok(Pattern::Glob {
            text: text.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// Whether `name` is matched by this pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Literal(lit) => lit == name,
            Pattern::Glob { matcher, .. } => matcher.is_match(name),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Pattern::Literal(_))
    }

    /// The literal name, if this pattern is one.
    pub fn literal(&self) -> Option<&str> {
        match self {
            Pattern::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Any => "*",
            Pattern::Literal(lit) => lit,
            Pattern::Glob { text, .. } => text,
        }
    }

    /// Static overlap test.
    ///
    /// Literal/literal overlap when equal, glob/literal when the glob matches
    /// the literal, glob/glob when either is the full wildcard or both are the
    /// same pattern.
    pub fn overlaps(&self, other: &Pattern) -> bool {
        match (self, other) {
            (Pattern::Any, _) | (_, Pattern::Any) => true,
            (Pattern::Literal(a), Pattern::Literal(b)) => a == b,
            (Pattern::Glob { matcher, .. }, Pattern::Literal(lit))
            | (Pattern::Literal(lit), Pattern::Glob { matcher, .. }) => matcher.is_match(lit),
            (Pattern::Glob { text: a, .. }, Pattern::Glob { text: b, .. }) => a == b,
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Pattern {
    type Error = SelectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Pattern::parse(&value)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.as_str().to_string()
    }
}

impl Serialize for Pattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Pattern::try_from(text).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Symbol Path
// ============================================================================

/// Qualified location of a declaration inside a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolPath {
    pub module: String,
    /// Enclosing classes, outermost first.
    pub classes: Vec<String>,
    pub member: Option<String>,
}

impl SymbolPath {
    /// Path of the module container itself.
    pub fn module(module: impl Into<String>) -> Self {
        SymbolPath {
            module: module.into(),
            classes: Vec::new(),
            member: None,
        }
    }

    /// Path of a member inside the container addressed by `self`.
    pub fn child(&self, member: impl Into<String>) -> Self {
        SymbolPath {
            module: self.module.clone(),
            classes: self.classes.clone(),
            member: Some(member.into()),
        }
    }

    /// Path of a nested class container inside the container addressed by `self`.
    pub fn class(&self, class: impl Into<String>) -> Self {
        let mut classes = self.classes.clone();
        classes.push(class.into());
        SymbolPath {
            module: self.module.clone(),
            classes,
            member: None,
        }
    }

    /// Dotted class path (`Outer.Inner`), if the symbol is inside a class.
    pub fn class_path(&self) -> Option<String> {
        if self.classes.is_empty() {
            None
        } else {
            Some(self.classes.join("."))
        }
    }
}

impl fmt::Display for SymbolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.module)?;
        for class in &self.classes {
            write!(f, ".{}", class)?;
        }
        if let Some(member) = &self.member {
            write!(f, ".{}", member)?;
        }
        Ok(())
    }
}

// ============================================================================
// Selector
// ============================================================================

/// `(module, class?, member?)` pattern triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub module: Pattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Pattern>,
}

impl Selector {
    /// Build a selector from raw pattern strings.
    pub fn new(module: &str, class: Option<&str>, member: Option<&str>) -> Result<Self, SelectorError> {
        Ok(Selector {
            module: Pattern::parse_component(module, "module")?,
            class: class
                .map(|c| Pattern::parse_component(c, "class"))
                .transpose()?,
            member: member
                .map(|m| Pattern::parse_component(m, "member"))
                .transpose()?,
        })
    }

    /// Whether the selector addresses `path`.
    pub fn matches(&self, path: &SymbolPath) -> bool {
        if !self.module.matches(&path.module) {
            return false;
        }
        let class_ok = match (&self.class, path.class_path()) {
            (None, None) => true,
            (Some(pattern), Some(class_path)) => pattern.matches(&class_path),
            _ => false,
        };
        if !class_ok {
            return false;
        }
        match (&self.member, &path.member) {
            (None, None) => true,
            (Some(pattern), Some(member)) => pattern.matches(member),
            _ => false,
        }
    }

    /// Number of literal components; higher outranks lower.
    pub fn specificity(&self) -> usize {
        self.components().filter(|p| p.is_literal()).count()
    }

    /// True if any present component is a glob.
    pub fn is_wildcard(&self) -> bool {
        self.components().any(|p| !p.is_literal())
    }

    /// True for container-level selectors (no member component).
    pub fn is_container(&self) -> bool {
        self.member.is_none()
    }

    /// Static overlap: could some path be matched by both selectors?
    pub fn overlaps(&self, other: &Selector) -> bool {
        fn component(a: &Option<Pattern>, b: &Option<Pattern>) -> bool {
            match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a.overlaps(b),
                _ => false,
            }
        }
        self.module.overlaps(&other.module)
            && component(&self.class, &other.class)
            && component(&self.member, &other.member)
    }

    fn components(&self) -> impl Iterator<Item = &Pattern> {
        std::iter::once(&self.module)
            .chain(self.class.as_ref())
            .chain(self.member.as_ref())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module={}", self.module)?;
        if let Some(class) = &self.class {
            write!(f, " class={}", class)?;
        }
        if let Some(member) = &self.member {
            write!(f, " member={}", member)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(module: &str, class: Option<&str>, member: Option<&str>) -> Selector {
        Selector::new(module, class, member).unwrap()
    }

    fn member_path(module: &str, classes: &[&str], member: &str) -> SymbolPath {
        SymbolPath {
            module: module.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            member: Some(member.to_string()),
        }
    }

    mod pattern_tests {
        use super::*;

        #[test]
        fn classifies_patterns() {
            assert!(matches!(Pattern::parse("*").unwrap(), Pattern::Any));
            assert!(Pattern::parse("setText").unwrap().is_literal());
            assert!(matches!(
                Pattern::parse("set*").unwrap(),
                Pattern::Glob { .. }
            ));
        }

        #[test]
        fn empty_pattern_is_rejected() {
            assert_eq!(
                Pattern::parse("  ").unwrap_err(),
                SelectorError::Empty { component: "name" }
            );
        }

        #[test]
        fn bad_glob_is_rejected() {
            let err = Pattern::parse("a[").unwrap_err();
            assert!(matches!(err, SelectorError::InvalidGlob { .. }));
        }

        #[test]
        fn glob_matches_names() {
            let p = Pattern::parse("set*").unwrap();
            assert!(p.matches("setText"));
            assert!(!p.matches("text"));
        }

        #[test]
        fn overlap_rules() {
            let lit = Pattern::parse("setText").unwrap();
            let other = Pattern::parse("text").unwrap();
            let glob = Pattern::parse("set*").unwrap();
            let glob2 = Pattern::parse("*Text").unwrap();
            assert!(lit.overlaps(&lit.clone()));
            assert!(!lit.overlaps(&other));
            assert!(glob.overlaps(&lit));
            assert!(lit.overlaps(&glob));
            assert!(!glob.overlaps(&other));
            assert!(Pattern::Any.overlaps(&glob));
            // Distinct globs are treated as disjoint even if some name could match both.
            assert!(!glob.overlaps(&glob2));
        }

        #[test]
        fn serde_uses_plain_strings() {
            let p: Pattern = serde_json::from_str("\"Q*\"").unwrap();
            assert_eq!(p.as_str(), "Q*");
            assert_eq!(serde_json::to_string(&p).unwrap(), "\"Q*\"");
        }
    }

    mod selector_tests {
        use super::*;

        #[test]
        fn member_selector_matches_member_only() {
            let s = sel("QtWidgets", Some("QLineEdit"), Some("setText"));
            assert!(s.matches(&member_path("QtWidgets", &["QLineEdit"], "setText")));
            assert!(!s.matches(&SymbolPath::module("QtWidgets").class("QLineEdit")));
            assert!(!s.matches(&member_path("QtWidgets", &[], "setText")));
        }

        #[test]
        fn container_selectors() {
            let module_sel = sel("QtCore", None, None);
            assert!(module_sel.matches(&SymbolPath::module("QtCore")));
            assert!(!module_sel.matches(&member_path("QtCore", &[], "pyqtSlot")));

            let class_sel = sel("QtCore", Some("QObject"), None);
            assert!(class_sel.matches(&SymbolPath::module("QtCore").class("QObject")));
            assert!(!class_sel.matches(&SymbolPath::module("QtCore")));
        }

        #[test]
        fn nested_class_uses_dotted_path() {
            let s = sel("m", Some("Outer.Inner"), Some("f"));
            assert!(s.matches(&member_path("m", &["Outer", "Inner"], "f")));
            assert!(!s.matches(&member_path("m", &["Inner"], "f")));
            let glob = sel("m", Some("Outer.*"), Some("f"));
            assert!(glob.matches(&member_path("m", &["Outer", "Inner"], "f")));
        }

        #[test]
        fn specificity_counts_literals() {
            assert_eq!(sel("m", Some("C"), Some("f")).specificity(), 3);
            assert_eq!(sel("m", Some("C"), Some("*")).specificity(), 2);
            assert_eq!(sel("*", None, Some("f")).specificity(), 1);
            assert!(sel("m", Some("C"), Some("*")).is_wildcard());
            assert!(!sel("m", Some("C"), Some("f")).is_wildcard());
        }

        #[test]
        fn absent_and_present_components_never_overlap() {
            let a = sel("m", Some("C"), None);
            let b = sel("m", Some("C"), Some("*"));
            assert!(!a.overlaps(&b));
            let c = sel("m", None, Some("f"));
            let d = sel("m", Some("*"), Some("f"));
            assert!(!c.overlaps(&d));
        }

        #[test]
        fn wildcard_member_overlaps_literal() {
            let a = sel("m", Some("ClassX"), Some("*"));
            let b = sel("m", Some("ClassX"), Some("methodY"));
            assert!(a.overlaps(&b));
            assert!(b.overlaps(&a));
        }

        #[test]
        fn display_is_readable() {
            let s = sel("QtWidgets", Some("QLineEdit"), Some("setText"));
            assert_eq!(
                s.to_string(),
                "module=QtWidgets class=QLineEdit member=setText"
            );
            let path = member_path("QtWidgets", &["QLineEdit"], "setText");
            assert_eq!(path.to_string(), "QtWidgets.QLineEdit.setText");
        }
    }
}
