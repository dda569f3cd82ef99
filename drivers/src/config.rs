//! Driver configuration
//!
//! Describes how to launch the external benchmark binary and which runtime
//! label its results carry.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// A required configuration field is missing.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A timeout value is out of acceptable range.
    #[error("invalid timeout: {0:?}")]
    InvalidTimeout(Duration),
}

/// How to launch the external driver binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Driver executable
    pub program: PathBuf,

    /// Runtime label reported in results; defaults to the backend id
    #[serde(default)]
    pub runtime: Option<String>,

    /// Backend shared library passed as `--lib_path`
    #[serde(default)]
    pub lib_path: Option<PathBuf>,

    /// Arguments placed before the generated ones
    #[serde(default)]
    pub prefix_args: Vec<String>,

    /// Kill the driver after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl DriverConfig {
    /// Create a config for the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            runtime: None,
            lib_path: None,
            prefix_args: Vec::new(),
            timeout_secs: None,
        }
    }

    /// Set the runtime label.
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    /// Set the backend library.
    pub fn with_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lib_path = Some(path.into());
        self
    }

    /// Add an argument before the generated ones.
    pub fn with_prefix_arg(mut self, arg: impl Into<String>) -> Self {
        self.prefix_args.push(arg.into());
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.program.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField("program"));
        }
        if let Some(timeout) = self.timeout() {
            if timeout.is_zero() {
                return Err(ConfigValidationError::InvalidTimeout(timeout));
            }
        }
        Ok(())
    }
}
