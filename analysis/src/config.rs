//! Review configuration.
//!
//! Loaded from YAML, typically `.pyreview.yml` at the project root. Every
//! field has a default, so an empty file is a valid configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! jobs: 4
//! timeout_secs: 60
//! paths:
//!   case_sensitivity: insensitive
//!   unify_separators: true
//!   resolve_symlinks: true
//! search_paths:
//!   - src
//! exclude_dirs:
//!   - __pycache__
//!   - migrations
//! python: python3.12
//! tools:
//!   pylint:
//!     args: ["--disable=C0114"]
//!   scalene:
//!     enabled: false
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::builtin_tool_names;
use crate::paths::PathOptions;

/// File name looked up at the project root.
pub const DEFAULT_CONFIG_FILE: &str = ".pyreview.yml";

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("unknown tool '{0}' in configuration")]
    UnknownTool(String),
}

/// Per-tool overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOverride {
    pub enabled: bool,
    /// Executable replacing the built-in default.
    pub program: Option<String>,
    /// Appended after the built-in arguments.
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl Default for ToolOverride {
    fn default() -> Self {
        Self {
            enabled: true,
            program: None,
            args: Vec::new(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub version: String,
    /// Worker pool size. `None` or 0 picks an adaptive default.
    pub jobs: Option<usize>,
    /// Per adapter invocation.
    pub timeout_secs: u64,
    pub paths: PathOptions,
    /// Extra module search path entries for profiled modules. Relative
    /// entries are resolved against the project root.
    pub search_paths: Vec<PathBuf>,
    /// Directory names skipped while walking the project.
    pub exclude_dirs: Vec<String>,
    /// Interpreter used by the profiling tools.
    pub python: String,
    pub tools: BTreeMap<String, ToolOverride>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            jobs: None,
            timeout_secs: 120,
            paths: PathOptions::default(),
            search_paths: Vec::new(),
            exclude_dirs: ["__pycache__", "venv", "env", "build", "dist", "node_modules"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            python: "python3".to_string(),
            tools: BTreeMap::new(),
        }
    }
}

impl ReviewConfig {
    /// Loads and validates configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `root/.pyreview.yml` when present, else the defaults.
    pub fn load_or_default(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let candidate = root.as_ref().join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be greater than 0".into()));
        }
        if self.python.trim().is_empty() {
            return Err(ConfigError::Invalid("python must not be empty".into()));
        }

        let known = builtin_tool_names();
        for (name, tool) in &self.tools {
            if !known.contains(&name.as_str()) {
                return Err(ConfigError::UnknownTool(name.clone()));
            }
            if tool.timeout_secs == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "tools.{name}.timeout_secs must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Search paths with relative entries resolved against `root`.
    pub fn resolved_search_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.search_paths
            .iter()
            .map(|entry| {
                if entry.is_absolute() {
                    entry.clone()
                } else {
                    root.join(entry)
                }
            })
            .collect()
    }
}
