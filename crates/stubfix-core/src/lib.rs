//! Core infrastructure for stubfix.
//!
//! This crate provides language-agnostic infrastructure:
//! - Selectors over qualified symbol paths
//! - Fix rules and rule tables
//! - The precedence-ordered rule registry with conflict detection
//! - Diagnostics, unified errors and JSON output types
//! - Configuration loading, text positions and content hashing

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod hash;
pub mod output;
pub mod registry;
pub mod rules;
pub mod selector;
pub mod text;
