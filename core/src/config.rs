//! Session configuration types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::run::RunMode;
use crate::scheduler::BenchmarkSelection;

/// Default pause between performance runs, in minutes
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 5;

/// Default age after which saved results may be discarded
pub const DEFAULT_MAX_RESULTS_AGE_DAYS: u64 = 90;

/// Minimum device memory required to run benchmarks
pub const DEFAULT_MIN_MEMORY_GB: u64 = 2;

/// Session configuration
///
/// Defines what a benchmarking session runs and where it reads and writes
/// its files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backend whose settings are used
    pub backend: String,

    /// Run mode when `submission` is off
    pub run_mode: RunMode,

    /// Submission flag; overrides `run_mode`
    pub submission: bool,

    /// Cooldown between performance runs; falls back to the `cooldown`
    /// common setting when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<bool>,

    /// Cooldown length in minutes
    pub cooldown_minutes: u64,

    /// Benchmarks excluded from the session
    pub disabled_benchmarks: Vec<String>,

    /// Explicit catalog path or URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_override: Option<String>,

    /// Side-loaded catalog, used when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_local: Option<PathBuf>,

    /// Default catalog path or URL
    pub catalog_default: String,

    /// Default backend settings document, seeded on first use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_settings: Option<PathBuf>,

    /// Cache for downloaded and extracted assets
    pub cache_dir: PathBuf,

    /// Results file and driver logs
    pub results_dir: PathBuf,

    /// Persisted settings blobs
    pub settings_dir: PathBuf,

    /// Application version stamped on saved sessions
    pub app_version: String,

    /// Saved-session age limit in days
    pub max_results_age_days: u64,

    /// Minimum device memory in GB
    pub min_memory_gb: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: "tflite".to_string(),
            run_mode: RunMode::default(),
            submission: false,
            cooldown: None,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            disabled_benchmarks: Vec::new(),
            catalog_override: None,
            catalog_local: None,
            catalog_default: "tasks.json".to_string(),
            default_settings: None,
            cache_dir: PathBuf::from("cache"),
            results_dir: PathBuf::from("results"),
            settings_dir: PathBuf::from("settings"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            max_results_age_days: DEFAULT_MAX_RESULTS_AGE_DAYS,
            min_memory_gb: DEFAULT_MIN_MEMORY_GB,
        }
    }
}

impl SessionConfig {
    /// Create a config for the given backend
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..Default::default()
        }
    }

    /// Load a config from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Set the run mode
    pub fn with_run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = mode;
        self
    }

    /// Set the submission flag
    pub fn with_submission(mut self, submission: bool) -> Self {
        self.submission = submission;
        self
    }

    /// Force cooldown on or off
    pub fn with_cooldown(mut self, enabled: bool) -> Self {
        self.cooldown = Some(enabled);
        self
    }

    /// Set the cooldown length
    pub fn with_cooldown_minutes(mut self, minutes: u64) -> Self {
        self.cooldown_minutes = minutes;
        self
    }

    /// Exclude a benchmark
    pub fn with_disabled(mut self, benchmark_id: impl Into<String>) -> Self {
        self.disabled_benchmarks.push(benchmark_id.into());
        self
    }

    /// Set the explicit catalog path
    pub fn with_catalog(mut self, path: impl Into<String>) -> Self {
        self.catalog_override = Some(path.into());
        self
    }

    /// Put cache, results and settings under one root
    pub fn with_root(mut self, root: &Path) -> Self {
        self.cache_dir = root.join("cache");
        self.results_dir = root.join("results");
        self.settings_dir = root.join("settings");
        self
    }

    /// Mode actually run: submission wins over the configured mode
    pub fn effective_mode(&self) -> RunMode {
        if self.submission {
            RunMode::Submission
        } else {
            self.run_mode
        }
    }

    /// Cooldown pause
    pub fn cooldown_pause(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes.saturating_mul(60))
    }

    /// Benchmarks enabled for the session
    pub fn selection(&self) -> BenchmarkSelection {
        self.disabled_benchmarks
            .iter()
            .fold(BenchmarkSelection::all(), |selection, id| {
                selection.disable(id)
            })
    }

    /// Catalog path after override/local/default resolution
    pub fn catalog_path(&self) -> String {
        crate::catalog::resolve_catalog_path(
            self.catalog_override.as_deref(),
            self.catalog_local.as_deref(),
            &self.catalog_default,
        )
    }

    /// Path of the results file
    pub fn results_file(&self) -> PathBuf {
        self.results_dir.join("results.json")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.trim().is_empty() {
            return Err(ConfigError::InvalidBackend(
                "backend id must not be empty".into(),
            ));
        }

        if self.catalog_path().trim().is_empty() {
            return Err(ConfigError::InvalidCatalog(
                "no catalog path configured".into(),
            ));
        }

        if self.max_results_age_days == 0 {
            return Err(ConfigError::InvalidRetention(
                "max results age must be at least 1 day".into(),
            ));
        }

        if self.cooldown_minutes > 24 * 60 {
            return Err(ConfigError::InvalidCooldown(format!(
                "{} minutes exceeds one day",
                self.cooldown_minutes
            )));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read config: {0}")]
    Read(String),

    /// Config file is not valid JSON
    #[error("Cannot parse config: {0}")]
    Parse(String),

    /// Invalid backend id
    #[error("Invalid backend: {0}")]
    InvalidBackend(String),

    /// Invalid catalog location
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Invalid retention period
    #[error("Invalid results age: {0}")]
    InvalidRetention(String),

    /// Invalid cooldown
    #[error("Invalid cooldown: {0}")]
    InvalidCooldown(String),
}
