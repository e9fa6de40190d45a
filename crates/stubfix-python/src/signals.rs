//! Signal variant normalization.
//!
//! A signal's variants are deduplicated by their normalized type lists and
//! ordered most specific first: longer argument lists before shorter ones,
//! and among equal lengths, more concrete types before `Any`. The sort is
//! stable, so variants that tie keep their declared order.

use std::cmp::Reverse;
use std::collections::HashSet;

use thiserror::Error;

use crate::model::{normalize_type, Signal, SignalVariant};

/// Variants to add to and remove from a signal before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantEdit {
    pub add: Vec<SignalVariant>,
    pub remove: Vec<SignalVariant>,
}

impl VariantEdit {
    pub fn new(add: &[Vec<String>], remove: &[Vec<String>]) -> Self {
        VariantEdit {
            add: add.iter().map(|v| SignalVariant::new(v)).collect(),
            remove: remove.iter().map(|v| SignalVariant::new(v)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signal '{signal}' would have no variants left")]
pub struct EmptySignalError {
    pub signal: String,
}

/// Structural key of a variant.
fn variant_key(variant: &SignalVariant) -> Vec<String> {
    variant
        .types
        .iter()
        .map(|t| t.as_deref().map(normalize_type).unwrap_or_default())
        .collect()
}

fn is_any(ty: &Option<String>) -> bool {
    match ty {
        None => true,
        Some(t) => matches!(normalize_type(t).as_str(), "Any" | "typing.Any"),
    }
}

fn specificity(variant: &SignalVariant) -> (usize, usize) {
    let typed = variant.types.iter().filter(|t| !is_any(t)).count();
    (variant.types.len(), typed)
}

/// Apply `edit` (if any) and normalize the variant list in place.
///
/// Returns whether the signal changed; a changed signal is marked for
/// regeneration. The signal is left untouched on error.
pub fn normalize_signal(
    signal: &mut Signal,
    edit: Option<&VariantEdit>,
) -> Result<bool, EmptySignalError> {
    let mut variants = signal.variants.clone();

    if let Some(edit) = edit {
        let removed: HashSet<Vec<String>> = edit.remove.iter().map(variant_key).collect();
        variants.retain(|v| !removed.contains(&variant_key(v)));
        variants.extend(edit.add.iter().cloned());
    }

    let mut seen = HashSet::new();
    variants.retain(|v| seen.insert(variant_key(v)));
    variants.sort_by_key(|v| {
        let (len, typed) = specificity(v);
        (Reverse(len), Reverse(typed))
    });

    if variants.is_empty() {
        return Err(EmptySignalError {
            signal: signal.name.clone(),
        });
    }
    if variants == signal.variants {
        return Ok(false);
    }
    signal.variants = variants;
    signal.meta.touch();
    Ok(true)
}
