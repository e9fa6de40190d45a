//! Immutable, precedence-ordered rule registry.
//!
//! The registry is built once per run, rejects conflicting rules up front,
//! and is shared read-only by every module worker afterwards.
//!
//! ## Precedence
//!
//! Rules matching a symbol are returned ordered by:
//! 1. priority, descending
//! 2. selector specificity (number of literal components), descending
//! 3. declaration order, ascending
//!
//! Two rules conflict when they share priority and specificity, their
//! selectors overlap, and their operations are incompatible. Equal priority
//! with different specificity is resolved by specificity and is not a conflict.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, RuleRef};
use crate::rules::{FixRule, RuleId};
use crate::selector::SymbolPath;

/// A pair of rules the registry refused to order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub first: RuleRef,
    pub second: RuleRef,
    pub message: String,
}

/// Registry build failure listing every conflict found.
#[derive(Debug, Error)]
#[error("{} rule conflict(s)", .conflicts.len())]
pub struct ConflictError {
    pub conflicts: Vec<Conflict>,
}

impl ConflictError {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.conflicts
            .iter()
            .map(|c| Diagnostic::ConflictError {
                first: c.first.clone(),
                second: c.second.clone(),
                message: c.message.clone(),
            })
            .collect()
    }
}

/// Read-only rule table indexed by literal module name.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    /// Rules in declaration order.
    rules: Vec<FixRule>,
    /// `rank[i]` is the precedence position of `rules[i]`.
    rank: Vec<usize>,
    by_module: HashMap<String, Vec<usize>>,
    any_module: Vec<usize>,
}

impl RuleRegistry {
    /// Validate and index `rules`.
    pub fn build(rules: Vec<FixRule>) -> Result<Self, ConflictError> {
        let conflicts = find_conflicts(&rules);
        if !conflicts.is_empty() {
            for conflict in &conflicts {
                tracing::warn!(
                    first = %conflict.first,
                    second = %conflict.second,
                    "{}",
                    conflict.message
                );
            }
            return Err(ConflictError { conflicts });
        }

        let mut order: Vec<usize> = (0..rules.len()).collect();
        order.sort_by_key(|&i| {
            let rule = &rules[i];
            (
                Reverse(rule.priority),
                Reverse(rule.selector.specificity()),
                i,
            )
        });
        let mut rank = vec![0; rules.len()];
        for (position, &i) in order.iter().enumerate() {
            rank[i] = position;
        }

        let mut by_module: HashMap<String, Vec<usize>> = HashMap::new();
        let mut any_module = Vec::new();
        for (i, rule) in rules.iter().enumerate() {
            match rule.selector.module.literal() {
                Some(module) => by_module.entry(module.to_string()).or_default().push(i),
                None => any_module.push(i),
            }
        }

        tracing::debug!(
            rules = rules.len(),
            modules = by_module.len(),
            "built rule registry"
        );

        Ok(RuleRegistry {
            rules,
            rank,
            by_module,
            any_module,
        })
    }

    /// Every rule matching `path`, in precedence order.
    pub fn rules_for(&self, path: &SymbolPath) -> Vec<&FixRule> {
        let literal = self
            .by_module
            .get(&path.module)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut hits: Vec<usize> = literal
            .iter()
            .chain(self.any_module.iter())
            .copied()
            .filter(|&i| self.rules[i].selector.matches(path))
            .collect();
        hits.sort_by_key(|&i| self.rank[i]);
        hits.into_iter().map(|i| &self.rules[i]).collect()
    }

    /// Whether any rule could apply inside `module`.
    pub fn has_rules_for_module(&self, module: &str) -> bool {
        !self.any_module.is_empty() || self.by_module.contains_key(module)
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[FixRule] {
        &self.rules
    }

    /// Rules in precedence order.
    pub fn ordered(&self) -> Vec<&FixRule> {
        let mut order: Vec<usize> = (0..self.rules.len()).collect();
        order.sort_by_key(|&i| self.rank[i]);
        order.into_iter().map(|i| &self.rules[i]).collect()
    }

    pub fn get(&self, id: RuleId) -> Option<&FixRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Non-wildcard rules whose id is absent from `matched`.
    pub fn dangling(&self, matched: &BTreeSet<RuleId>) -> Vec<&FixRule> {
        self.rules
            .iter()
            .filter(|r| !r.selector.is_wildcard() && !matched.contains(&r.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn find_conflicts(rules: &[FixRule]) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for (i, a) in rules.iter().enumerate() {
        for b in &rules[i + 1..] {
            if a.priority != b.priority
                || a.selector.specificity() != b.selector.specificity()
                || !a.selector.overlaps(&b.selector)
                || a.operation.compatible_with(&b.operation)
            {
                continue;
            }
            conflicts.push(Conflict {
                first: a.to_ref(),
                second: b.to_ref(),
                message: format!(
                    "incompatible {} and {} at priority {}",
                    a.operation.kind_name(),
                    b.operation.kind_name(),
                    a.priority
                ),
            });
        }
    }
    conflicts
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{AnnotationTarget, Operation, RuleSet};
    use crate::selector::Selector;

    fn sel(module: &str, class: Option<&str>, member: Option<&str>) -> Selector {
        Selector::new(module, class, member).unwrap()
    }

    fn member_path(module: &str, class: &str, member: &str) -> SymbolPath {
        SymbolPath::module(module).class(class).child(member)
    }

    fn replace(sig: &str) -> Operation {
        Operation::ReplaceSignature {
            signature: sig.to_string(),
            expect: None,
        }
    }

    mod ordering_tests {
        use super::*;

        #[test]
        fn higher_priority_comes_first() {
            let mut set = RuleSet::new();
            set.push(sel("m", Some("ClassX"), Some("*")), 1, replace("(self) -> A"));
            set.push(
                sel("m", Some("ClassX"), Some("methodY")),
                2,
                replace("(self) -> B"),
            );
            let registry = RuleRegistry::build(set.into_rules()).unwrap();
            let hits = registry.rules_for(&member_path("m", "ClassX", "methodY"));
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].id, RuleId(1));
            assert_eq!(hits[1].id, RuleId(0));
        }

        #[test]
        fn specificity_breaks_priority_ties() {
            let mut set = RuleSet::new();
            set.push(sel("m", Some("C"), Some("*")), 0, replace("(self) -> A"));
            set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> B"));
            let registry = RuleRegistry::build(set.into_rules()).unwrap();
            let hits = registry.rules_for(&member_path("m", "C", "f"));
            assert_eq!(hits[0].id, RuleId(1));
        }

        #[test]
        fn declaration_order_breaks_remaining_ties() {
            let mut set = RuleSet::new();
            set.push(
                sel("m", Some("C"), Some("f")),
                0,
                Operation::AddAnnotationSuppression {
                    code: "misc".to_string(),
                },
            );
            set.push(
                sel("m", Some("C"), Some("f")),
                0,
                Operation::AddAnnotationSuppression {
                    code: "override".to_string(),
                },
            );
            let registry = RuleRegistry::build(set.into_rules()).unwrap();
            let hits = registry.rules_for(&member_path("m", "C", "f"));
            assert_eq!(
                hits.iter().map(|r| r.id).collect::<Vec<_>>(),
                vec![RuleId(0), RuleId(1)]
            );
        }

        #[test]
        fn wildcard_module_rules_are_consulted() {
            let mut set = RuleSet::new();
            set.push(
                sel("*", Some("QObject"), Some("destroyed")),
                0,
                Operation::RemoveAnnotation {
                    target: AnnotationTarget::Return,
                },
            );
            let registry = RuleRegistry::build(set.into_rules()).unwrap();
            assert!(registry.has_rules_for_module("QtGui"));
            assert_eq!(
                registry
                    .rules_for(&member_path("QtGui", "QObject", "destroyed"))
                    .len(),
                1
            );
            assert!(registry
                .rules_for(&member_path("QtGui", "QObject", "other"))
                .is_empty());
        }

        #[test]
        fn ordered_lists_full_precedence() {
            let mut set = RuleSet::new();
            set.push(sel("a", None, Some("f")), 0, replace("() -> None"));
            set.push(sel("b", None, Some("g")), 5, replace("() -> None"));
            let registry = RuleRegistry::build(set.into_rules()).unwrap();
            let ids: Vec<_> = registry.ordered().iter().map(|r| r.id).collect();
            assert_eq!(ids, vec![RuleId(1), RuleId(0)]);
            assert_eq!(registry.get(RuleId(1)).map(|r| r.priority), Some(5));
        }
    }

    mod conflict_tests {
        use super::*;

        #[test]
        fn same_priority_same_specificity_incompatible_conflicts() {
            let mut set = RuleSet::new();
            set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> A"));
            set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> B"));
            let err = RuleRegistry::build(set.into_rules()).unwrap_err();
            assert_eq!(err.conflicts.len(), 1);
            assert_eq!(err.conflicts[0].first.id, 0);
            assert_eq!(err.conflicts[0].second.id, 1);
            assert!(matches!(
                err.diagnostics()[0],
                Diagnostic::ConflictError { .. }
            ));
        }

        #[test]
        fn all_conflicts_are_reported() {
            let mut set = RuleSet::new();
            set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> A"));
            set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> B"));
            set.push(
                sel("m", Some("C"), Some("f")),
                0,
                Operation::DeleteMember { signature: None },
            );
            let err = RuleRegistry::build(set.into_rules()).unwrap_err();
            assert_eq!(err.conflicts.len(), 3);
        }

        #[test]
        fn different_priority_is_not_a_conflict() {
            let mut set = RuleSet::new();
            set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> A"));
            set.push(sel("m", Some("C"), Some("f")), 1, replace("(self) -> B"));
            assert!(RuleRegistry::build(set.into_rules()).is_ok());
        }

        #[test]
        fn different_specificity_is_not_a_conflict() {
            let mut set = RuleSet::new();
            set.push(sel("m", Some("C"), Some("*")), 0, replace("(self) -> A"));
            set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> B"));
            assert!(RuleRegistry::build(set.into_rules()).is_ok());
        }

        #[test]
        fn different_slots_at_same_priority_coexist() {
            let mut set = RuleSet::new();
            set.push(
                sel("m", Some("C"), Some("f")),
                0,
                Operation::AddAnnotationSuppression {
                    code: "override".to_string(),
                },
            );
            set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> A"));
            let registry = RuleRegistry::build(set.into_rules()).unwrap();
            let path = SymbolPath::module("m").class("C").child("f");
            assert_eq!(registry.rules_for(&path).len(), 2);
        }

        #[test]
        fn disjoint_selectors_never_conflict() {
            let mut set = RuleSet::new();
            set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> A"));
            set.push(sel("m", Some("D"), Some("f")), 0, replace("(self) -> B"));
            assert!(RuleRegistry::build(set.into_rules()).is_ok());
        }

        #[test]
        fn wildcard_pairs_conflict_when_overlapping() {
            let mut set = RuleSet::new();
            set.push(
                sel("m", Some("*"), Some("f")),
                0,
                Operation::ReplaceBody {
                    body: "...".to_string(),
                },
            );
            set.push(
                sel("m", Some("C*"), Some("f")),
                0,
                Operation::ReplaceBody {
                    body: "pass".to_string(),
                },
            );
            let err = RuleRegistry::build(set.into_rules()).unwrap_err();
            assert_eq!(err.conflicts.len(), 1);
        }
    }

    mod dangling_tests {
        use super::*;

        #[test]
        fn unmatched_literal_rules_are_dangling() {
            let mut set = RuleSet::new();
            let hit = set.push(sel("m", Some("C"), Some("f")), 0, replace("(self) -> A"));
            let miss = set.push(sel("m", Some("C"), Some("g")), 0, replace("(self) -> A"));
            set.push(
                sel("m", Some("C"), Some("*")),
                0,
                Operation::AddAnnotationSuppression {
                    code: "misc".to_string(),
                },
            );
            let registry = RuleRegistry::build(set.into_rules()).unwrap();
            let matched: BTreeSet<RuleId> = [hit].into_iter().collect();
            let dangling: Vec<_> = registry.dangling(&matched).iter().map(|r| r.id).collect();
            assert_eq!(dangling, vec![miss]);
        }
    }
}
