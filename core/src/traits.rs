//! Core traits for drivers, persistence and asset acquisition
//!
//! These traits are defined in core to avoid circular dependencies.
//! Implementations live in their respective crates (drivers/, storage/, report/).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::assets::AssetRequirement;
use crate::catalog::{DatasetType, Scenario};
use crate::error::Result;
use crate::result::{ResultRecord, SavedSession};
use crate::run::{DriverMode, RunMode};
use crate::settings::SettingList;

// ============================================================================
// Inference Driver Trait
// ============================================================================

/// Everything the driver needs for one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRequest {
    /// Benchmark id
    pub benchmark_id: String,
    /// Backend id
    pub backend: String,
    /// Local model file
    pub model_path: PathBuf,
    /// Common settings plus this benchmark's setting
    pub settings: SettingList,
    /// Dataset kind
    pub dataset_type: DatasetType,
    /// Local dataset path
    pub dataset_path: PathBuf,
    /// Local groundtruth path, if any
    pub groundtruth_path: Option<PathBuf>,
    /// Dataset label offset
    pub offset: i32,
    /// Number of output classes
    pub num_classes: u32,
    /// Input image width
    pub image_width: u32,
    /// Input image height
    pub image_height: u32,
    /// Load scenario
    pub scenario: Scenario,
    /// Batch size
    pub batch_size: u32,
    /// Driver mode
    pub mode: DriverMode,
    /// Minimum query count
    pub min_query_count: u64,
    /// Minimum duration in milliseconds
    pub min_duration_ms: u64,
    /// Single-stream latency bound in nanoseconds
    pub single_stream_expected_latency_ns: u64,
    /// Directory for driver logs and results
    pub output_dir: PathBuf,
}

/// Measurements returned by the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverOutput {
    /// Latency in milliseconds (throughput for offline runs)
    pub latency_ms: f64,
    /// Formatted accuracy, absent in performance-only runs
    #[serde(default)]
    pub accuracy: Option<String>,
    /// Number of samples processed
    pub num_samples: u64,
    /// Total run time in milliseconds
    pub duration_ms: f64,
}

/// Driver-specific errors
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The driver could not be started
    #[error("failed to launch driver: {0}")]
    Launch(String),

    /// The driver ran but reported failure
    #[error("driver exited with {code:?}: {message}")]
    Failed {
        /// Exit code, if any
        code: Option<i32>,
        /// Captured error output
        message: String,
    },

    /// The driver produced no usable measurements
    #[error("invalid driver output: {0}")]
    InvalidOutput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blocking, single-shot inference driver
///
/// `run` is called from a blocking thread, one benchmark at a time.
pub trait InferenceDriver: Send + Sync {
    /// Runtime label reported in results (e.g. "tflite")
    fn name(&self) -> &str;

    /// Run one benchmark to completion
    fn run(&self, request: &DriverRequest) -> std::result::Result<DriverOutput, DriverError>;
}

// ============================================================================
// Persistence Traits
// ============================================================================

/// Keyed text blob storage
pub trait BlobStore: Send + Sync {
    /// Read a blob, `None` if never written
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write a blob atomically
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// Results file and session history
pub trait ResultsStore: Send + Sync {
    /// Overwrite the results file with `results`
    fn persist(&self, results: &[ResultRecord], mode: RunMode) -> Result<()>;

    /// Save the completed session
    fn save_session(&self, session: &SavedSession) -> Result<()>;

    /// Load the last completed session
    fn load_session(&self) -> Result<Option<SavedSession>>;

    /// Forget the last completed session
    fn clear_session(&self) -> Result<()>;
}

// ============================================================================
// Asset Acquisition
// ============================================================================

/// Receives whole-percent acquisition progress
pub trait ProgressSink: Send + Sync {
    /// Called when the percentage changes
    fn percent(&self, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn percent(&self, percent: u8) {
        self(percent)
    }
}

/// Downloads and extracts assets into the local cache
#[async_trait]
pub trait AssetProvider: Send + Sync {
    /// Whether `path` is remote and not yet present locally
    fn needs_acquire(&self, path: &str) -> bool;

    /// Whether the requirement is already satisfied on disk
    fn is_satisfied(&self, requirement: &AssetRequirement) -> bool;

    /// Acquire every unsatisfied requirement
    async fn acquire_all(
        &self,
        requirements: &[AssetRequirement],
        sink: Arc<dyn ProgressSink>,
    ) -> Result<()>;
}
