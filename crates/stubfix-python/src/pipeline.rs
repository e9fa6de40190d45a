//! Run driver: parse, rewrite and write every module in parallel.
//!
//! Modules share nothing but the read-only registry. A module that fails to
//! parse is passed through unchanged with a diagnostic; it never stops the
//! others.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use stubfix_core::config::StubfixConfig;
use stubfix_core::diagnostics::Diagnostic;
use stubfix_core::registry::RuleRegistry;
use stubfix_core::rules::RuleId;

use crate::engine::{RewriteEngine, RewriteReport};
use crate::parser::{parse_module, ParseOptions};
use crate::writer::{write_module, WriterOptions};

/// Input text of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSource {
    pub name: String,
    pub text: String,
}

impl ModuleSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        ModuleSource {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub parse: ParseOptions,
    pub writer: WriterOptions,
}

impl From<&StubfixConfig> for PipelineOptions {
    fn from(config: &StubfixConfig) -> Self {
        PipelineOptions {
            parse: ParseOptions {
                signal_markers: config.signal_markers.clone(),
            },
            writer: WriterOptions {
                indent: config.indent.clone(),
            },
        }
    }
}

/// Result for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutcome {
    pub name: String,
    /// Output text; the input text when parsing failed.
    pub text: String,
    pub changed: bool,
    pub report: RewriteReport,
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// One entry per input, in input order.
    pub modules: Vec<ModuleOutcome>,
    /// Per-module diagnostics in module order, then dangling-rule warnings.
    pub diagnostics: Vec<Diagnostic>,
}

impl RunOutcome {
    pub fn changed_count(&self) -> usize {
        self.modules.iter().filter(|m| m.changed).count()
    }
}

pub struct Pipeline<'r> {
    registry: &'r RuleRegistry,
    options: PipelineOptions,
}

impl<'r> Pipeline<'r> {
    pub fn new(registry: &'r RuleRegistry, options: PipelineOptions) -> Self {
        Pipeline { registry, options }
    }

    /// Process a single module.
    pub fn process(&self, source: &ModuleSource) -> ModuleOutcome {
        let mut module = match parse_module(&source.name, &source.text, &self.options.parse) {
            Ok(module) => module,
            Err(err) => {
                tracing::warn!(module = %source.name, "parse failed, emitting unchanged: {}", err);
                return ModuleOutcome {
                    name: source.name.clone(),
                    text: source.text.clone(),
                    changed: false,
                    report: RewriteReport {
                        diagnostics: vec![Diagnostic::ParseError {
                            module: source.name.clone(),
                            line: err.line,
                            col: err.col,
                            message: format!("expected {}, found {}", err.expected, err.found),
                        }],
                        ..RewriteReport::default()
                    },
                };
            }
        };

        let report = RewriteEngine::new(self.registry)
            .with_parse_options(self.options.parse.clone())
            .rewrite(&mut module);
        let text = write_module(&module, &self.options.writer);
        let changed = text != source.text;
        tracing::debug!(
            module = %source.name,
            changed,
            applied = report.applied.len(),
            "processed module"
        );
        ModuleOutcome {
            name: source.name.clone(),
            text,
            changed,
            report,
        }
    }

    /// Process every module and report rules that matched nothing anywhere.
    pub fn run(&self, sources: &[ModuleSource]) -> RunOutcome {
        let modules: Vec<ModuleOutcome> = sources.par_iter().map(|s| self.process(s)).collect();

        let mut matched: BTreeSet<RuleId> = BTreeSet::new();
        let mut diagnostics = Vec::new();
        for outcome in &modules {
            matched.extend(outcome.report.matched.iter().copied());
            diagnostics.extend(outcome.report.diagnostics.iter().cloned());
        }
        for rule in self.registry.dangling(&matched) {
            tracing::warn!(rule = %rule.to_ref(), "rule matched nothing");
            diagnostics.push(Diagnostic::DanglingRuleWarning {
                rule: rule.to_ref(),
            });
        }

        let outcome = RunOutcome {
            modules,
            diagnostics,
        };
        tracing::info!(
            modules = outcome.modules.len(),
            changed = outcome.changed_count(),
            diagnostics = outcome.diagnostics.len(),
            "stub run complete"
        );
        outcome
    }
}
