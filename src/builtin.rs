//! The embedded PyQt6 rule table.

use stubfix_core::rules::{RuleLoadError, RuleSet};

/// Name reported for the embedded table in diagnostics and errors.
pub const BUILTIN_RULES_NAME: &str = "<builtin:pyqt6>";

/// TOML text of the embedded table.
pub const BUILTIN_RULES: &str = include_str!("../rules/pyqt6.toml");

/// Append the embedded rules to `set`, returning how many were added.
pub fn load_builtin(set: &mut RuleSet) -> Result<usize, RuleLoadError> {
    set.extend_from_toml(BUILTIN_RULES_NAME, BUILTIN_RULES)
}
