//! Orchestration states and device facts

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// Where the session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrchestrationState {
    /// Checking the device and acquiring assets
    Loading,
    /// Ready to run
    Idle,
    /// A benchmark session is in progress
    Running,
    /// A completed session is on display
    Results,
    /// A recoverable failure waiting for the user
    Error(StateError),
    /// Terminal
    Exiting {
        /// Why the session ended
        reason: String,
    },
}

impl OrchestrationState {
    /// Short state name
    pub fn name(&self) -> &'static str {
        match self {
            OrchestrationState::Loading => "loading",
            OrchestrationState::Idle => "idle",
            OrchestrationState::Running => "running",
            OrchestrationState::Results => "showing results",
            OrchestrationState::Error(_) => "in error",
            OrchestrationState::Exiting { .. } => "exiting",
        }
    }

    /// Whether the session has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestrationState::Exiting { .. })
    }

    /// Whether moving to `next` is a legal transition
    pub(crate) fn can_transition_to(&self, next: &OrchestrationState) -> bool {
        use OrchestrationState::*;
        match (self, next) {
            (Exiting { .. }, _) => false,
            (_, Exiting { .. }) => true,
            (Loading, Idle | Results | Error(_)) => true,
            (Idle, Running | Error(_)) => true,
            (Running, Results | Idle) => true,
            (Results, Running | Idle | Error(_)) => true,
            (Error(_), Loading | Idle) => true,
            _ => false,
        }
    }
}

/// Failure shown in the error state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateError {
    /// Error class
    pub kind: ErrorKind,
    /// Human-readable detail
    pub detail: String,
    /// Whether `retry` reloads
    pub retryable: bool,
}

impl From<&Error> for StateError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            detail: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Facts about the device checked before loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Total memory in bytes
    pub total_memory_bytes: u64,
    /// Whether a backend supports the device
    pub supported: bool,
    /// Free-form description used in error messages
    pub description: String,
}

impl DeviceInfo {
    /// Total memory in whole GB, rounded up
    pub fn total_memory_gb(&self) -> u64 {
        const GB: u64 = 1_000_000_000;
        self.total_memory_bytes.div_ceil(GB)
    }
}
