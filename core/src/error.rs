//! Error types for mlbench-core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// The task catalog or another configuration document could not be found
    #[error("configuration not found: {0}")]
    ConfigNotFound(String),

    /// A setting value outside the setting's acceptable-value domain
    #[error("value '{value}' is not acceptable for setting '{id}'")]
    UnacceptableValue {
        /// Setting id
        id: String,
        /// Rejected value
        value: String,
    },

    /// Input that could not be parsed or violates a structural invariant
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A benchmark, setting or task id that does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up (e.g. "benchmark", "setting")
        kind: &'static str,
        /// The missing id
        id: String,
    },

    /// A remote fetch was attempted without network connectivity
    #[error("no network connection: {0}")]
    NetworkUnavailable(String),

    /// Submission runs require groundtruth for every selected task
    #[error("groundtruth file is missing for task {task}")]
    MissingGroundtruth {
        /// Display name of the offending task
        task: String,
    },

    /// A dataset (or other local asset) is absent and cannot be acquired
    #[error("dataset is unavailable: {0}")]
    MissingDataset(String),

    /// The external inference driver failed for one benchmark
    #[error("benchmark {benchmark_id} failed: {message}")]
    DriverFailure {
        /// Benchmark that failed
        benchmark_id: String,
        /// Driver error detail
        message: String,
    },

    /// No backend supports this device
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    /// The device has less memory than the benchmarks require
    #[error("insufficient memory: {total_gb} GB available, at least {required_gb} GB required")]
    InsufficientMemory {
        /// Minimum required memory in GB
        required_gb: u64,
        /// Detected memory in GB
        total_gb: u64,
    },

    /// Download or extraction of an asset failed
    #[error("failed to acquire {path}: {message}")]
    Acquire {
        /// Source path of the asset
        path: String,
        /// Failure detail
        message: String,
    },

    /// Invalid component wiring or session configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Requested state change is not allowed from the current state
    #[error("cannot {action} while {state}")]
    InvalidState {
        /// Attempted action
        action: &'static str,
        /// Current state name
        state: &'static str,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a not-found error for a benchmark id
    pub fn benchmark_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "benchmark",
            id: id.into(),
        }
    }

    /// Create a not-found error for a common setting id
    pub fn setting_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "setting",
            id: id.into(),
        }
    }

    /// Create a missing-component error for builders
    pub fn missing_component(name: &str) -> Self {
        Self::InvalidConfig(format!("missing required component: {name}"))
    }

    /// Create a driver failure error
    pub fn driver(benchmark_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DriverFailure {
            benchmark_id: benchmark_id.into(),
            message: message.into(),
        }
    }

    /// Create an acquisition error
    pub fn acquire(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Acquire {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigNotFound(_) => ErrorKind::ConfigNotFound,
            Error::UnacceptableValue { .. } => ErrorKind::UnacceptableValue,
            Error::MalformedInput(_) => ErrorKind::MalformedInput,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            Error::MissingGroundtruth { .. } => ErrorKind::MissingGroundtruth,
            Error::MissingDataset(_) => ErrorKind::MissingDataset,
            Error::DriverFailure { .. } => ErrorKind::DriverFailure,
            Error::UnsupportedDevice(_) => ErrorKind::UnsupportedDevice,
            Error::InsufficientMemory { .. } => ErrorKind::InsufficientMemory,
            Error::Acquire { .. } => ErrorKind::AcquireFailed,
            Error::InvalidConfig(_) | Error::InvalidState { .. } => ErrorKind::InvalidConfig,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the user may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NetworkUnavailable(_))
    }

    /// Whether the error ends the session at startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedDevice(_) | Error::InsufficientMemory { .. }
        )
    }
}

/// Error classification surfaced to the control path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Configuration document missing
    ConfigNotFound,
    /// Setting value rejected
    UnacceptableValue,
    /// Unparseable input
    MalformedInput,
    /// Unknown id
    NotFound,
    /// No network
    NetworkUnavailable,
    /// Groundtruth missing in submission mode
    MissingGroundtruth,
    /// Dataset missing
    MissingDataset,
    /// Driver failed
    DriverFailure,
    /// Device not supported
    UnsupportedDevice,
    /// Not enough memory
    InsufficientMemory,
    /// Download or extraction failed
    AcquireFailed,
    /// Bad wiring or state
    InvalidConfig,
    /// Filesystem error
    Io,
}
