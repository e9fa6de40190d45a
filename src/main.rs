//! Binary entry point for the stubfix CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Fix the stubs of an extracted PyQt6 wheel in place
//! stubfix fix path/to/PyQt6
//!
//! # Write fixed copies elsewhere, with an extra rule table
//! stubfix fix path/to/PyQt6 --out stubs/PyQt6 --rules local.toml
//!
//! # Show the rule registry in precedence order
//! stubfix rules
//! ```
//!
//! Reports go to stdout as JSON; logs go to stderr.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use stubfix::cli::{run_fix, run_rules, CommandFailure, FixOptions};
use stubfix_core::error::{OutputErrorCode, StubfixError};
use stubfix_core::output::emit_response;

// ============================================================================
// CLI Structure
// ============================================================================

/// Rule-driven fixer for PyQt6 `.pyi` stubs.
#[derive(Parser, Debug)]
#[command(name = "stubfix", version, about = "Rule-driven fixer for PyQt6 .pyi stubs")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Config file (default: stubfix.toml in the stub directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for tracing output (RUST_LOG overrides).
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fix every `.pyi` stub under a directory.
    Fix {
        /// Directory containing the stubs.
        dir: PathBuf,

        /// Write all modules under this directory instead of in place.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Extra rule table (repeatable).
        #[arg(long = "rules")]
        rules: Vec<PathBuf>,

        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,

        /// Fail when any diagnostic is reported.
        #[arg(long)]
        strict: bool,
    },

    /// List the rule registry in precedence order.
    Rules {
        /// Extra rule table (repeatable).
        #[arg(long = "rules")]
        rules: Vec<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level, cli.global.log_json);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            let error_code = OutputErrorCode::from(&failure.error);
            // Errors go to stdout as JSON, like every other report.
            let _ = emit_response(&failure.to_response(), &mut io::stdout());
            let _ = io::stdout().flush();
            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber on stderr.
fn init_tracing(level: LogLevel, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn execute(cli: Cli) -> Result<(), CommandFailure> {
    let mut stdout = io::stdout();
    let emitted = match cli.command {
        Command::Fix {
            dir,
            out,
            rules,
            dry_run,
            strict,
        } => {
            let options = FixOptions {
                dir,
                out,
                rules,
                config: cli.global.config,
                dry_run,
                strict,
            };
            emit_response(&run_fix(&options)?, &mut stdout)
        }
        Command::Rules { rules } => {
            let dir = std::env::current_dir()
                .map_err(|e| StubfixError::internal(format!("no current directory: {}", e)))?;
            emit_response(
                &run_rules(&rules, cli.global.config.as_deref(), &dir)?,
                &mut stdout,
            )
        }
    };
    emitted.map_err(|e| StubfixError::internal(format!("failed to write report: {}", e)))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn parse_fix_with_options() {
            let args = [
                "stubfix", "fix", "stubs", "--out", "out", "--rules", "a.toml", "--rules",
                "b.toml", "--dry-run",
            ];
            let cli = Cli::try_parse_from(args).unwrap();
            match cli.command {
                Command::Fix {
                    dir,
                    out,
                    rules,
                    dry_run,
                    strict,
                } => {
                    assert_eq!(dir, PathBuf::from("stubs"));
                    assert_eq!(out, Some(PathBuf::from("out")));
                    assert_eq!(rules.len(), 2);
                    assert!(dry_run);
                    assert!(!strict);
                }
                other => panic!("expected fix, got {:?}", other),
            }
        }

        #[test]
        fn fix_requires_dir() {
            assert!(Cli::try_parse_from(["stubfix", "fix"]).is_err());
        }

        #[test]
        fn global_args_after_subcommand() {
            let args = ["stubfix", "rules", "--log-level", "debug", "--config", "c.toml"];
            let cli = Cli::try_parse_from(args).unwrap();
            assert!(matches!(cli.global.log_level, LogLevel::Debug));
            assert_eq!(cli.global.config, Some(PathBuf::from("c.toml")));
        }

        #[test]
        fn default_log_level_is_warn() {
            let cli = Cli::try_parse_from(["stubfix", "rules"]).unwrap();
            assert!(matches!(cli.global.log_level, LogLevel::Warn));
            assert!(!cli.global.log_json);
        }
    }

    mod log_level {
        use super::*;

        #[test]
        fn maps_to_tracing_levels() {
            assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
            assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        }
    }
}
