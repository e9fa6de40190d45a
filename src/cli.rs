//! Command implementations behind the `stubfix` binary.
//!
//! The driver only wires things together: it finds `.pyi` files, builds the
//! rule registry, hands the text to the pipeline and persists the result.
//! Everything it returns is ready to be emitted as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use stubfix_core::config::{Config, StubfixConfig};
use stubfix_core::diagnostics::Diagnostic;
use stubfix_core::error::StubfixError;
use stubfix_core::hash::ContentHash;
use stubfix_core::output::{ErrorResponse, FixResponse, ModuleSummary, RuleInfo, RulesResponse};
use stubfix_core::registry::RuleRegistry;
use stubfix_core::rules::{FixRule, Operation, RuleSet};
use stubfix_python::signature::parse_signature;
use stubfix_python::{parse_fragment, ModuleSource, ParseOptions, Pipeline, PipelineOptions};

use crate::builtin::load_builtin;

// ============================================================================
// Failures
// ============================================================================

/// A failed command together with the diagnostics gathered before it failed.
#[derive(Debug)]
pub struct CommandFailure {
    pub error: StubfixError,
    pub diagnostics: Vec<Diagnostic>,
}

impl CommandFailure {
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::from_error(&self.error).with_diagnostics(self.diagnostics.clone())
    }
}

impl From<StubfixError> for CommandFailure {
    fn from(error: StubfixError) -> Self {
        CommandFailure {
            error,
            diagnostics: Vec::new(),
        }
    }
}

// ============================================================================
// Discovery and loading
// ============================================================================

/// A stub file found under the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubFile {
    pub path: PathBuf,
    /// Path relative to the input directory.
    pub relative: PathBuf,
    /// Module name (the file stem).
    pub module: String,
}

fn is_dunder(stem: &str) -> bool {
    stem.len() > 4 && stem.starts_with("__") && stem.ends_with("__")
}

/// Collect `*.pyi` files under `root` in a stable order.
pub fn discover_stubs(root: &Path, skip_dunder: bool) -> Result<Vec<StubFile>, StubfixError> {
    if !root.is_dir() {
        return Err(StubfixError::file_not_found(root.display().to_string()));
    }
    let mut stubs = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| StubfixError::internal(e.to_string()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("pyi")
        {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if skip_dunder && is_dunder(stem) {
            tracing::debug!(path = %path.display(), "skipping dunder module");
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .map_err(|e| StubfixError::internal(e.to_string()))?
            .to_path_buf();
        stubs.push(StubFile {
            path: path.to_path_buf(),
            relative,
            module: stem.to_string(),
        });
    }
    Ok(stubs)
}

/// Load the config named on the command line, or `stubfix.toml` in `dir`.
pub fn load_config(explicit: Option<&Path>, dir: &Path) -> Result<Config, StubfixError> {
    let config = match explicit {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(dir)?,
    };
    Ok(config)
}

/// Reject rule payloads that cannot parse before any module is touched.
fn validate_payloads(rules: &[FixRule], options: &ParseOptions) -> Result<(), StubfixError> {
    for rule in rules {
        let result = match &rule.operation {
            Operation::ReplaceSignature { signature, expect } => parse_signature(signature)
                .and_then(|_| expect.as_deref().map(parse_signature).transpose())
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Operation::DeleteMember {
                signature: Some(signature),
            } => parse_signature(signature)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Operation::InsertMember { code, .. } => parse_fragment(code, options)
                .map(|_| ())
                .map_err(|e| format!("code does not parse: {}", e)),
            _ => Ok(()),
        };
        result.map_err(|message| StubfixError::InvalidRules {
            source_name: rule.to_ref().to_string(),
            message,
        })?;
    }
    Ok(())
}

/// Build the registry from the built-in table, the configured tables and
/// `extra` tables, in that order.
pub fn load_registry(
    config: &StubfixConfig,
    extra: &[PathBuf],
) -> Result<RuleRegistry, CommandFailure> {
    let mut set = RuleSet::new();
    if config.builtin_rules {
        load_builtin(&mut set).map_err(StubfixError::from)?;
    }
    for path in config.rules.iter().chain(extra) {
        set.extend_from_file(path).map_err(StubfixError::from)?;
    }
    let rules = set.into_rules();
    let parse = ParseOptions {
        signal_markers: config.signal_markers.clone(),
    };
    validate_payloads(&rules, &parse)?;
    RuleRegistry::build(rules).map_err(|err| CommandFailure {
        diagnostics: err.diagnostics(),
        error: err.into(),
    })
}

// ============================================================================
// Commands
// ============================================================================

/// Arguments of `stubfix fix`.
#[derive(Debug, Clone, Default)]
pub struct FixOptions {
    pub dir: PathBuf,
    /// Write every module here instead of rewriting changed files in place.
    pub out: Option<PathBuf>,
    pub rules: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub dry_run: bool,
    pub strict: bool,
}

/// Fix every stub under `options.dir`.
pub fn run_fix(options: &FixOptions) -> Result<FixResponse, CommandFailure> {
    let config = load_config(options.config.as_deref(), &options.dir)?.stubfix;
    let registry = load_registry(&config, &options.rules)?;
    let stubs = discover_stubs(&options.dir, config.skip_dunder)?;

    let sources = stubs
        .iter()
        .map(|stub| {
            fs::read_to_string(&stub.path)
                .map(|text| ModuleSource::new(stub.module.as_str(), text))
                .map_err(|e| {
                    StubfixError::internal(format!("failed to read {}: {}", stub.path.display(), e))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pipeline = Pipeline::new(&registry, PipelineOptions::from(&config));
    let outcome = pipeline.run(&sources);

    let mut summaries = Vec::with_capacity(stubs.len());
    for ((stub, source), module) in stubs.iter().zip(&sources).zip(&outcome.modules) {
        if !options.dry_run {
            let target = match &options.out {
                Some(out) => Some(out.join(&stub.relative)),
                None if module.changed => Some(stub.path.clone()),
                None => None,
            };
            if let Some(target) = target {
                write_stub(&target, &module.text)?;
            }
        }
        summaries.push(ModuleSummary {
            module: module.name.clone(),
            changed: module.changed,
            before_hash: ContentHash::compute(source.text.as_bytes()),
            after_hash: ContentHash::compute(module.text.as_bytes()),
            rules_applied: module.report.applied.len(),
        });
    }

    let response = FixResponse::new(options.dry_run, summaries, outcome.diagnostics);
    if (options.strict || config.strict) && !response.diagnostics.is_empty() {
        return Err(CommandFailure {
            error: StubfixError::DiagnosticsReported {
                count: response.diagnostics.len(),
            },
            diagnostics: response.diagnostics,
        });
    }
    Ok(response)
}

fn write_stub(target: &Path, text: &str) -> Result<(), StubfixError> {
    let file = target.display().to_string();
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| StubfixError::apply(e.to_string(), &file))?;
    }
    fs::write(target, text).map_err(|e| StubfixError::apply(e.to_string(), &file))?;
    tracing::debug!(path = %file, "wrote stub");
    Ok(())
}

/// List the registry in precedence order.
pub fn run_rules(
    rules: &[PathBuf],
    config: Option<&Path>,
    dir: &Path,
) -> Result<RulesResponse, CommandFailure> {
    let config = load_config(config, dir)?.stubfix;
    let registry = load_registry(&config, rules)?;
    Ok(RulesResponse::new(
        registry.ordered().into_iter().map(RuleInfo::from_rule).collect(),
    ))
}
