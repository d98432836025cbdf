//! Configuration loading and validation for the supervised pair
//!
//! This module parses a TOML configuration into the two [`ChildSpec`]s the
//! supervisor launches, applies defaults matching the stock container image
//! (a Python keepalive HTTP service plus a Python worker), and performs
//! strict validation with field-path error messages.

use crate::{Result, SupervisorError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default grace period before a surviving child is force-killed
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// How to launch one child process
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChildSpec {
    /// Executable to run (must be in PATH or an absolute path)
    pub command: String,
    /// Command line arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, merged over the supervisor's own
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Working directory for the child; inherits the supervisor's when unset
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

impl ChildSpec {
    /// Create a spec with just a command and arguments
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|s| (*s).to_string()).collect(),
            environment: HashMap::new(),
            working_directory: None,
        }
    }

    fn validate(&self, field: &str) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(SupervisorError::Validation(format!(
                "{field}.command cannot be empty"
            )));
        }
        for key in self.environment.keys() {
            if key.trim().is_empty() {
                return Err(SupervisorError::Validation(format!(
                    "{field}.environment contains an empty variable name"
                )));
            }
        }
        Ok(())
    }
}

/// Top-level supervisor configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TandemConfig {
    /// The detached keepalive service, started first
    #[serde(default = "TandemConfig::default_background")]
    pub background: ChildSpec,
    /// The foreground worker whose exit status the supervisor mirrors
    #[serde(default = "TandemConfig::default_foreground")]
    pub foreground: ChildSpec,
    /// Seconds to wait for graceful termination before SIGKILL
    #[serde(default = "TandemConfig::default_grace_period")]
    pub grace_period_secs: u64,
}

impl TandemConfig {
    fn default_background() -> ChildSpec {
        ChildSpec::new("python3", &["dtek_api.py"])
    }

    fn default_foreground() -> ChildSpec {
        ChildSpec::new("python3", &["main.py"])
    }

    fn default_grace_period() -> u64 {
        DEFAULT_GRACE_PERIOD_SECS
    }

    /// Load configuration from a TOML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            SupervisorError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: TandemConfig = toml::from_str(&contents).map_err(|e| {
            SupervisorError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.background.validate("background")?;
        self.foreground.validate("foreground")?;
        if self.grace_period_secs == 0 {
            return Err(SupervisorError::Validation(
                "gracePeriodSecs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TandemConfig {
    fn default() -> Self {
        Self {
            background: Self::default_background(),
            foreground: Self::default_foreground(),
            grace_period_secs: Self::default_grace_period(),
        }
    }
}
