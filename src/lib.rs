//! stubfix: rule-driven fixer for PyQt6 `.pyi` type stubs.
//!
//! Parses the toolkit's shipped stubs, applies declarative fix rules by
//! qualified-name selectors, and writes checker-clean stubs back out.
//!
//! ## Modules
//!
//! - `builtin` - The embedded PyQt6 rule table
//! - `cli` - Command implementations behind the `stubfix` binary

pub mod builtin;
pub mod cli;

// Core infrastructure - re-exported from stubfix-core
pub use stubfix_core::config;
pub use stubfix_core::diagnostics;
pub use stubfix_core::error;
pub use stubfix_core::output;
pub use stubfix_core::registry;
pub use stubfix_core::rules;
pub use stubfix_core::selector;

// Stub pipeline
pub use stubfix_python::{
    parse_module, write_module, ModuleOutcome, ModuleSource, ParseOptions, Pipeline,
    PipelineOptions, RewriteEngine, RunOutcome, WriterOptions,
};
