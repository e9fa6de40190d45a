//! Rewrite engine: applies registry rules to a parsed module.
//!
//! Traversal is depth first. A container's own rules (selectors without a
//! member component) run before its members are visited, so members a rule
//! inserts are visited in the same pass. Per symbol, rules apply in registry
//! order and the first rule to successfully claim an operation slot wins.

use std::collections::{BTreeSet, HashSet};

use stubfix_core::diagnostics::Diagnostic;
use stubfix_core::registry::RuleRegistry;
use stubfix_core::rules::{AnnotationTarget, FixRule, InsertPosition, Operation, RuleId, Slot};
use stubfix_core::selector::SymbolPath;

use crate::model::{
    Body, Class, Import, ImportDecl, ImportName, Member, Meta, Method, Module, OverloadGroup,
    Signature,
};
use crate::parser::{parse_fragment, ParseOptions};
use crate::signals::{normalize_signal, VariantEdit};
use crate::signature::parse_signature;

/// What one rewrite pass did to a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    /// Rules that matched at least one symbol, applied or not.
    pub matched: BTreeSet<RuleId>,
    /// Rules that changed something, in application order.
    pub applied: Vec<RuleId>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of applying one operation to one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Unchanged,
    Changed,
    /// The whole symbol must be removed from its container.
    Removed,
}

type Applied = Result<Change, String>;

fn changed(flag: bool) -> Change {
    if flag {
        Change::Changed
    } else {
        Change::Unchanged
    }
}

pub struct RewriteEngine<'r> {
    registry: &'r RuleRegistry,
    parse: ParseOptions,
}

struct Context<'m> {
    module: &'m str,
    report: RewriteReport,
}

impl Context<'_> {
    fn applied(&mut self, rule: &FixRule, path: &SymbolPath) {
        tracing::debug!(rule = %rule.to_ref(), symbol = %path, "applied");
        self.report.applied.push(rule.id);
    }

    /// Wildcard rules routinely reach members they cannot apply to; only
    /// literal selectors produce a diagnostic.
    fn unsupported(&mut self, rule: &FixRule, path: &SymbolPath, reason: String) {
        if rule.selector.is_wildcard() {
            tracing::debug!(rule = %rule.to_ref(), symbol = %path, "skipped: {}", reason);
            return;
        }
        tracing::warn!(rule = %rule.to_ref(), symbol = %path, "{}", reason);
        self.report.diagnostics.push(Diagnostic::UnsupportedOperation {
            module: self.module.to_string(),
            symbol: path.to_string(),
            rule: rule.to_ref(),
            reason,
        });
    }
}

impl<'r> RewriteEngine<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        RewriteEngine {
            registry,
            parse: ParseOptions::default(),
        }
    }

    /// Options used to parse `insert_member` payloads.
    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse = options;
        self
    }

    /// Apply every matching rule to `module` in place.
    pub fn rewrite(&self, module: &mut Module) -> RewriteReport {
        let name = module.name.clone();
        let mut cx = Context {
            module: &name,
            report: RewriteReport::default(),
        };
        let path = SymbolPath::module(name.as_str());

        for rule in self.registry.rules_for(&path) {
            cx.report.matched.insert(rule.id);
            let result = match &rule.operation {
                Operation::InsertMember {
                    code,
                    position,
                    replace,
                } => self.insert_members(&mut module.body, code, position, *replace, true),
                other => Err(format!(
                    "{} does not apply to a module",
                    other.kind_name()
                )),
            };
            self.record(&mut cx, rule, &path, result);
        }

        self.visit_body(&path, &mut module.body, &mut cx);
        if ensure_typing_import(&mut module.body) {
            tracing::debug!(module = %name, "added `import typing` for regenerated overloads");
        }
        cx.report
    }

    fn record(&self, cx: &mut Context<'_>, rule: &FixRule, path: &SymbolPath, result: Applied) {
        match result {
            Ok(Change::Changed) | Ok(Change::Removed) => cx.applied(rule, path),
            Ok(Change::Unchanged) => {}
            Err(reason) => cx.unsupported(rule, path, reason),
        }
    }

    // ------------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------------

    fn visit_body(&self, container: &SymbolPath, body: &mut Vec<Member>, cx: &mut Context<'_>) {
        let mut i = 0;
        while i < body.len() {
            let Some(name) = body[i].name().map(str::to_string) else {
                i += 1;
                continue;
            };
            let path = container.child(name.as_str());
            let mut remove = self.visit_member(&path, &mut body[i], cx);
            if !remove {
                if let Member::Class(class) = &mut body[i] {
                    remove = self.visit_class(&container.class(name.as_str()), class, cx);
                }
            }
            if remove {
                body.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Class-level rules, then the class body. Returns true if the class
    /// itself was deleted.
    fn visit_class(&self, path: &SymbolPath, class: &mut Class, cx: &mut Context<'_>) -> bool {
        let mut claimed: HashSet<Slot> = HashSet::new();
        for rule in self.registry.rules_for(path) {
            cx.report.matched.insert(rule.id);
            let slot = rule.operation.slot();
            if claimed.contains(&slot) {
                tracing::debug!(rule = %rule.to_ref(), symbol = %path, "shadowed");
                continue;
            }
            let result = match &rule.operation {
                Operation::AddAnnotationSuppression { code } => {
                    let flag = add_suppression(class.header_comment_mut(), code);
                    if flag {
                        class.meta.touch();
                    }
                    Ok(changed(flag))
                }
                Operation::InsertMember {
                    code,
                    position,
                    replace,
                } => self
                    .insert_members(&mut class.body, code, position, *replace, false)
                    .map(|change| {
                        if change == Change::Changed && class.inline_body.take().is_some() {
                            class.meta.touch();
                        }
                        change
                    }),
                Operation::DeleteMember { signature: None } => Ok(Change::Removed),
                other => Err(format!("{} does not apply to a class", other.kind_name())),
            };
            if result == Ok(Change::Removed) {
                cx.applied(rule, path);
                return true;
            }
            if result.is_ok() {
                claimed.insert(slot);
            }
            self.record(cx, rule, path, result);
        }

        self.visit_body(path, &mut class.body, cx);
        if class.body.is_empty() && class.inline_body.is_none() {
            class.inline_body = Some("...".to_string());
            class.meta.touch();
        }
        false
    }

    /// Member-level rules. Returns true if the member was deleted.
    fn visit_member(&self, path: &SymbolPath, member: &mut Member, cx: &mut Context<'_>) -> bool {
        let mut rules = self.registry.rules_for(path);
        for rule in &rules {
            cx.report.matched.insert(rule.id);
        }

        if let Member::Signal(signal) = member {
            let (edits, rest): (Vec<&FixRule>, Vec<&FixRule>) = rules
                .into_iter()
                .partition(|r| matches!(r.operation, Operation::RewriteSignalVariants { .. }));
            rules = rest;

            let mut edit: Option<(&FixRule, VariantEdit)> = None;
            for rule in edits {
                if edit.is_some() {
                    tracing::debug!(rule = %rule.to_ref(), symbol = %path, "shadowed");
                    continue;
                }
                if let Operation::RewriteSignalVariants { add, remove } = &rule.operation {
                    edit = Some((rule, VariantEdit::new(add, remove)));
                }
            }
            match normalize_signal(signal, edit.as_ref().map(|(_, e)| e)) {
                Ok(true) => {
                    if let Some((rule, _)) = &edit {
                        cx.applied(rule, path);
                    }
                }
                Ok(false) => {}
                Err(err) => {
                    if let Some((rule, _)) = &edit {
                        cx.unsupported(rule, path, err.to_string());
                    }
                    let _ = normalize_signal(signal, None);
                }
            }
        }

        let mut claimed: HashSet<Slot> = HashSet::new();
        for rule in rules {
            let slot = rule.operation.slot();
            if claimed.contains(&slot) {
                tracing::debug!(rule = %rule.to_ref(), symbol = %path, "shadowed");
                continue;
            }
            let result = self.apply(&rule.operation, member);
            if result == Ok(Change::Removed) {
                cx.applied(rule, path);
                return true;
            }
            if result.is_ok() {
                claimed.insert(slot);
            }
            self.record(cx, rule, path, result);
        }
        false
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    fn apply(&self, operation: &Operation, member: &mut Member) -> Applied {
        match operation {
            Operation::AddAnnotationSuppression { code } => Ok(suppress(member, code)),
            Operation::RemoveAnnotation { target } => remove_annotation(member, target),
            Operation::ReplaceSignature { signature, expect } => {
                replace_signature(member, signature, expect.as_deref())
            }
            Operation::RewriteSignalVariants { .. } => Err(format!(
                "{} '{}' is not a signal",
                member.kind_name(),
                member.name().unwrap_or_default()
            )),
            Operation::InsertMember { .. } => {
                Err("insert_member needs a container selector (no member)".to_string())
            }
            Operation::DeleteMember { signature: None } => Ok(Change::Removed),
            Operation::DeleteMember {
                signature: Some(signature),
            } => delete_overload(member, signature),
            Operation::ReplaceBody { body } => replace_body(member, body),
        }
    }

    fn insert_members(
        &self,
        body: &mut Vec<Member>,
        code: &str,
        position: &InsertPosition,
        replace: bool,
        module_level: bool,
    ) -> Applied {
        let members = parse_fragment(code, &self.parse)
            .map_err(|e| format!("inserted code does not parse: {}", e))?;

        // Validate everything before touching the body.
        let mut replaced: Vec<usize> = Vec::new();
        for new in &members {
            let Some(name) = new.name() else {
                continue;
            };
            let Some(index) = body.iter().position(|m| m.name() == Some(name)) else {
                continue;
            };
            if body[index].same_shape(new) {
                continue;
            }
            if !replace {
                return Err(format!(
                    "'{}' already exists as a different {}",
                    name,
                    body[index].kind_name()
                ));
            }
            if !replaced.contains(&index) {
                replaced.push(index);
            }
        }
        let anchor = match position {
            InsertPosition::Before(name) | InsertPosition::After(name) => Some(
                body.iter()
                    .position(|m| m.name() == Some(name.as_str()))
                    .ok_or_else(|| format!("no member named '{}' for position {}", name, position))?,
            ),
            _ => None,
        };

        // Replaced members give up their slot and leading trivia to the
        // first inserted declaration.
        replaced.sort_unstable();
        let mut change = Change::Unchanged;
        let mut cursor: Option<usize> = None;
        let mut leading: Vec<String> = Vec::new();
        if let Some(&first) = replaced.first() {
            for &index in replaced.iter().rev() {
                let old = body.remove(index);
                if index == first {
                    leading = old.meta().leading.clone();
                }
            }
            cursor = Some(first);
            change = Change::Changed;
        }

        for mut new in members {
            if module_level && merge_from_import(body, &new) {
                change = Change::Changed;
                continue;
            }
            if body.iter().any(|m| m.same_shape(&new)) {
                continue;
            }
            let index = match (cursor, position, anchor) {
                (Some(i), _, _) => i,
                (None, InsertPosition::Start, _) => 0,
                (None, InsertPosition::Before(_), Some(i)) => i,
                (None, InsertPosition::After(_), Some(i)) => i + 1,
                (None, _, _) => end_index(body, &new, module_level),
            };
            if !leading.is_empty() {
                new.meta_mut().leading = std::mem::take(&mut leading);
            }
            body.insert(index, new);
            cursor = Some(index + 1);
            change = Change::Changed;
        }
        Ok(change)
    }
}

/// Whether any regenerated signal in `body` will be written with
/// `@typing.overload`.
fn regenerates_overloaded_signal(body: &[Member]) -> bool {
    body.iter().any(|member| match member {
        Member::Signal(signal) => signal.meta.is_touched() && signal.variants.len() > 1,
        Member::Class(class) => regenerates_overloaded_signal(&class.body),
        _ => false,
    })
}

fn imports_typing(member: &Member) -> bool {
    matches!(
        member,
        Member::Import(ImportDecl {
            import: Import::Plain(names),
            ..
        }) if names.iter().any(|n| n.name == "typing" && n.alias.is_none())
    )
}

/// Add a module-level `import typing` when regenerated signals need it.
/// Returns true if the import was added.
fn ensure_typing_import(body: &mut Vec<Member>) -> bool {
    if !regenerates_overloaded_signal(body) || body.iter().any(imports_typing) {
        return false;
    }
    let mut import = Member::Import(ImportDecl {
        import: Import::Plain(vec![ImportName {
            name: "typing".to_string(),
            alias: None,
        }]),
        meta: Meta::default(),
    });
    let index = match body.iter().rposition(|m| matches!(m, Member::Import(_))) {
        Some(last) => last + 1,
        None => {
            // The module header stays above the new import.
            if let Some(first) = body.first_mut() {
                import.meta_mut().leading = std::mem::take(&mut first.meta_mut().leading);
            }
            0
        }
    };
    body.insert(index, import);
    true
}

/// Where an `end` insertion lands: after the last import for imports at
/// module level, after the last member otherwise.
fn end_index(body: &[Member], new: &Member, module_level: bool) -> usize {
    if module_level && matches!(new, Member::Import(_)) {
        if let Some(last) = body.iter().rposition(|m| matches!(m, Member::Import(_))) {
            return last + 1;
        }
    }
    body.len()
}

/// Merge a `from X import ...` into an existing import of the same module.
/// Returns true if names were added.
fn merge_from_import(body: &mut [Member], new: &Member) -> bool {
    let Member::Import(ImportDecl {
        import: Import::From {
            module: new_module,
            names: new_names,
        },
        ..
    }) = new
    else {
        return false;
    };
    let existing = body.iter_mut().find_map(|m| match m {
        Member::Import(decl) => match &mut decl.import {
            Import::From { module, names } if module.as_str() == new_module.as_str() => {
                Some((names, &mut decl.meta))
            }
            _ => None,
        },
        _ => None,
    });
    let Some((names, meta)) = existing else {
        return false;
    };
    let mut added = false;
    for name in new_names {
        if !names.contains(name) {
            names.push(name.clone());
            added = true;
        }
    }
    if added {
        names.sort_by(|a, b| a.name.cmp(&b.name));
        meta.touch();
    }
    // An already-present import counts as merged so it is not inserted again.
    true
}

// ============================================================================
// Per-member operations
// ============================================================================

/// Merge `code` into a `# type: ignore[...]` comment. A bare
/// `type: ignore` already covers every code.
fn add_suppression(comment: &mut Option<String>, code: &str) -> bool {
    const IGNORE: &str = "type: ignore";
    let existing = comment.as_deref().unwrap_or_default();
    if let Some(idx) = existing.find(IGNORE) {
        let after = &existing[idx + IGNORE.len()..];
        let Some(inner) = after.strip_prefix('[') else {
            return false;
        };
        let Some(close) = inner.find(']') else {
            return false;
        };
        let mut codes: Vec<&str> = inner[..close]
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if codes.contains(&code) {
            return false;
        }
        codes.push(code);
        let merged = format!(
            "{}{}[{}]{}",
            &existing[..idx],
            IGNORE,
            codes.join(", "),
            &inner[close + 1..]
        );
        *comment = Some(merged);
        return true;
    }
    *comment = Some(match comment.take() {
        Some(other) => format!("# {}[{}]  {}", IGNORE, code, other),
        None => format!("# {}[{}]", IGNORE, code),
    });
    true
}

fn suppress(member: &mut Member, code: &str) -> Change {
    let flag = match member {
        Member::Method(method) => suppress_method(method, code),
        Member::Overloads(group) => group
            .methods
            .iter_mut()
            .fold(false, |acc, m| suppress_method(m, code) | acc),
        Member::Class(class) => {
            let flag = add_suppression(class.header_comment_mut(), code);
            if flag {
                class.meta.touch();
            }
            flag
        }
        other => {
            let meta = other.meta_mut();
            let flag = add_suppression(&mut meta.comment, code);
            if flag {
                meta.touch();
            }
            flag
        }
    };
    changed(flag)
}

fn suppress_method(method: &mut Method, code: &str) -> bool {
    let flag = add_suppression(method.header_comment_mut(), code);
    if flag {
        method.meta.touch();
    }
    flag
}

fn strip_annotations(signature: &mut Signature, target: &AnnotationTarget) -> Result<bool, String> {
    match target {
        AnnotationTarget::Return => Ok(signature.returns.take().is_some()),
        AnnotationTarget::Param(name) => {
            let param = signature
                .params
                .iter_mut()
                .find(|p| &p.name == name && !p.is_marker())
                .ok_or_else(|| format!("no parameter named '{}'", name))?;
            Ok(param.annotation.take().is_some())
        }
        AnnotationTarget::All => {
            let mut flag = signature.returns.take().is_some();
            for param in &mut signature.params {
                flag |= param.annotation.take().is_some();
            }
            Ok(flag)
        }
    }
}

fn remove_annotation(member: &mut Member, target: &AnnotationTarget) -> Applied {
    match member {
        Member::Method(method) => {
            let flag = strip_annotations(&mut method.signature, target)?;
            if flag {
                method.meta.touch();
            }
            Ok(changed(flag))
        }
        Member::Overloads(group) => {
            let mut flag = false;
            let mut found = false;
            for method in &mut group.methods {
                match strip_annotations(&mut method.signature, target) {
                    Ok(true) => {
                        method.meta.touch();
                        flag = true;
                        found = true;
                    }
                    Ok(false) => found = true,
                    Err(_) => {}
                }
            }
            match target {
                AnnotationTarget::Param(name) if !found => {
                    Err(format!("no overload has a parameter named '{}'", name))
                }
                _ => Ok(changed(flag)),
            }
        }
        Member::Signal(signal) => match target {
            AnnotationTarget::Return => {
                let flag = signal.returns.take().is_some();
                if flag {
                    signal.meta.touch();
                }
                Ok(changed(flag))
            }
            _ => Err(format!(
                "signal parameters are edited with rewrite_signal_variants, not remove_annotation {}",
                target
            )),
        },
        Member::Attribute(attribute) => {
            if let AnnotationTarget::Param(_) = target {
                return Err(format!("attribute '{}' has no parameters", attribute.name));
            }
            if attribute.annotation.is_none() {
                return Ok(Change::Unchanged);
            }
            if attribute.value.is_none() {
                return Err(format!(
                    "attribute '{}' has no value and cannot lose its annotation",
                    attribute.name
                ));
            }
            attribute.annotation = None;
            attribute.meta.touch();
            Ok(Change::Changed)
        }
        other => Err(format!(
            "remove_annotation does not apply to a {}",
            other.kind_name()
        )),
    }
}

fn replace_signature(member: &mut Member, payload: &str, expect: Option<&str>) -> Applied {
    let new = parse_signature(payload).map_err(|e| e.to_string())?;
    let expect = expect
        .map(parse_signature)
        .transpose()
        .map_err(|e| e.to_string())?;

    match member {
        Member::Method(method) => {
            if method.signature.same_shape(&new) {
                return Ok(Change::Unchanged);
            }
            if let Some(expect) = &expect {
                if !method.signature.same_shape(expect) {
                    return Err(format!(
                        "current signature {} does not match the expected {}",
                        method.signature, expect
                    ));
                }
            }
            if method.signature.arity() != new.arity() {
                return Err(format!(
                    "arity mismatch: current {} has {} parameters, replacement has {}",
                    method.signature,
                    method.signature.arity(),
                    new.arity()
                ));
            }
            method.signature = new;
            method.meta.touch();
            Ok(Change::Changed)
        }
        Member::Overloads(group) => {
            if group.methods.iter().any(|m| m.signature.same_shape(&new)) {
                return Ok(Change::Unchanged);
            }
            let target = group.methods.iter_mut().find(|m| {
                m.signature.arity() == new.arity()
                    && expect
                        .as_ref()
                        .is_none_or(|expect| m.signature.same_shape(expect))
            });
            match target {
                Some(method) => {
                    method.signature = new;
                    method.meta.touch();
                    Ok(Change::Changed)
                }
                None => Err(format!(
                    "no overload of '{}' matches arity {}{}",
                    group.name,
                    new.arity(),
                    if expect.is_some() { " and the expected signature" } else { "" }
                )),
            }
        }
        Member::Signal(_) => {
            Err("signals are rewritten with rewrite_signal_variants".to_string())
        }
        other => Err(format!(
            "replace_signature does not apply to a {}",
            other.kind_name()
        )),
    }
}

/// Remove the overload matching `signature`; a group left with a single
/// overload collapses to a plain method.
fn delete_overload(member: &mut Member, signature: &str) -> Applied {
    let target = parse_signature(signature).map_err(|e| e.to_string())?;
    match member {
        Member::Method(method) => Ok(if method.signature.same_shape(&target) {
            Change::Removed
        } else {
            Change::Unchanged
        }),
        Member::Overloads(group) => {
            let Some(index) = group
                .methods
                .iter()
                .position(|m| m.signature.same_shape(&target))
            else {
                return Ok(Change::Unchanged);
            };
            let removed = group.methods.remove(index);
            if let Some(next) = group.methods.get_mut(index) {
                let mut leading = removed.meta.leading;
                leading.append(&mut next.meta.leading);
                next.meta.leading = leading;
            }
            if group.methods.len() == 1 {
                collapse(member);
            }
            Ok(Change::Changed)
        }
        other => Err(format!(
            "delete_member with a signature needs overloads, found a {}",
            other.kind_name()
        )),
    }
}

fn collapse(member: &mut Member) {
    if let Member::Overloads(OverloadGroup { methods, .. }) = member {
        if let Some(mut method) = methods.pop() {
            method.decorators.retain(|d| !d.is_overload());
            method.meta.touch();
            *member = Member::Method(method);
        }
    }
}

fn parse_body(text: &str) -> Body {
    let lines: Vec<&str> = text
        .trim_matches('\n')
        .lines()
        .map(|l| l.trim_end())
        .collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let lines: Vec<String> = lines
        .iter()
        .map(|l| l.get(indent..).unwrap_or_default().to_string())
        .collect();
    match lines.as_slice() {
        [] => Body::default(),
        [only] => Body::Inline(only.clone()),
        _ => Body::Block(lines),
    }
}

fn replace_body(member: &mut Member, text: &str) -> Applied {
    let body = parse_body(text);
    let set = |method: &mut Method| {
        if method.body == body {
            return false;
        }
        method.body = body.clone();
        method.meta.touch();
        true
    };
    match member {
        Member::Method(method) => Ok(changed(set(method))),
        Member::Overloads(group) => Ok(changed(
            group.methods.iter_mut().fold(false, |acc, m| set(m) | acc),
        )),
        other => Err(format!(
            "replace_body does not apply to a {}",
            other.kind_name()
        )),
    }
}
