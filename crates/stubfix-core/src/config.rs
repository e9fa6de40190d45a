//! Configuration handling for stubfix.
//!
//! Configuration lives in a `stubfix.toml` file with a single `[stubfix]`
//! table. Every field has a default, so a missing file or an empty table is
//! valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "stubfix.toml";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

/// Stubfix configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub stubfix: StubfixConfig,
}

/// Core stubfix settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StubfixConfig {
    /// Indentation unit for regenerated declarations
    #[serde(default = "default_indent")]
    pub indent: String,

    /// Decorator / call names that mark a signal declaration
    #[serde(default = "default_signal_markers")]
    pub signal_markers: Vec<String>,

    /// Extra rule tables, loaded after the built-in table
    #[serde(default)]
    pub rules: Vec<PathBuf>,

    /// Load the embedded PyQt6 rule table
    #[serde(default = "default_builtin_rules")]
    pub builtin_rules: bool,

    /// Fail the run when any diagnostic is reported
    #[serde(default)]
    pub strict: bool,

    /// Skip `__init__.pyi`-style dunder modules
    #[serde(default = "default_skip_dunder")]
    pub skip_dunder: bool,
}

fn default_indent() -> String {
    "    ".to_string()
}

/// Signal marker names recognised when nothing is configured.
pub fn default_signal_markers() -> Vec<String> {
    ["pyqtSignal", "QtCore.pyqtSignal", "PyQt6.QtCore.pyqtSignal"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_builtin_rules() -> bool {
    true
}

fn default_skip_dunder() -> bool {
    true
}

impl Default for StubfixConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
            signal_markers: default_signal_markers(),
            rules: Vec::new(),
            builtin_rules: default_builtin_rules(),
            strict: false,
            skip_dunder: default_skip_dunder(),
        }
    }
}

impl Config {
    /// Parse configuration text; `path` is only used for error messages.
    pub fn from_toml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    /// Load configuration from a file that must exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_toml(path, &content)
    }

    /// Load `stubfix.toml` from `dir`, or defaults if there is none.
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Config::default())
        }
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let indent = &self.stubfix.indent;
        if indent.is_empty() || !indent.chars().all(|c| c == ' ' || c == '\t') {
            return Err(ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("indent must be spaces or tabs, got {:?}", indent),
            });
        }
        if self.stubfix.signal_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::Parse {
                path: path.to_path_buf(),
                message: "signal_markers must not contain empty names".to_string(),
            });
        }
        Ok(())
    }
}
