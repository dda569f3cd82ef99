//! Run modes and run descriptors

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::DatasetDescriptor;
use crate::error::Error;

/// Which measurement a session performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// Performance on the lite dataset, no accuracy
    #[default]
    #[serde(rename = "performance_lite_mode")]
    PerformanceLite,
    /// Accuracy only
    #[serde(rename = "accuracy_mode")]
    Accuracy,
    /// Performance followed by accuracy for every benchmark
    #[serde(rename = "submission_mode")]
    Submission,
    /// Performance on the full dataset
    #[serde(rename = "performance_mode")]
    Performance,
    /// Short smoke run on the test dataset
    #[serde(rename = "testing")]
    Testing,
}

impl RunMode {
    /// All modes, in declaration order
    pub const ALL: [RunMode; 5] = [
        RunMode::PerformanceLite,
        RunMode::Accuracy,
        RunMode::Submission,
        RunMode::Performance,
        RunMode::Testing,
    ];

    /// Persisted identifier of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::PerformanceLite => "performance_lite_mode",
            RunMode::Accuracy => "accuracy_mode",
            RunMode::Submission => "submission_mode",
            RunMode::Performance => "performance_mode",
            RunMode::Testing => "testing",
        }
    }

    /// Modes that measure latency only; cooldown applies between them
    pub fn is_performance(&self) -> bool {
        matches!(self, RunMode::Performance | RunMode::PerformanceLite)
    }

    /// Accuracy results never contribute to the summary score
    pub fn is_accuracy(&self) -> bool {
        matches!(self, RunMode::Accuracy)
    }

    /// Mode string handed to the inference driver
    pub fn driver_mode(&self) -> DriverMode {
        match self {
            RunMode::PerformanceLite | RunMode::Performance => DriverMode::PerformanceOnly,
            RunMode::Accuracy => DriverMode::AccuracyOnly,
            RunMode::Submission | RunMode::Testing => DriverMode::SubmissionRun,
        }
    }

    /// Whether the driver computes accuracy and therefore needs groundtruth
    pub fn needs_groundtruth(&self) -> bool {
        !matches!(self.driver_mode(), DriverMode::PerformanceOnly)
    }

    /// Passes a session in this mode runs, in order
    pub fn passes(&self) -> &'static [RunMode] {
        match self {
            RunMode::Submission => &[RunMode::Performance, RunMode::Accuracy],
            RunMode::PerformanceLite => &[RunMode::PerformanceLite],
            RunMode::Performance => &[RunMode::Performance],
            RunMode::Accuracy => &[RunMode::Accuracy],
            RunMode::Testing => &[RunMode::Testing],
        }
    }

    /// Mode whose dataset variant `pass` of this session runs on.
    ///
    /// The performance pass of a submission uses the lite dataset when the
    /// task declares one; every other pass follows the session mode.
    pub fn dataset_mode(&self, pass: RunMode) -> RunMode {
        match (self, pass) {
            (RunMode::Submission, RunMode::Performance) => RunMode::PerformanceLite,
            _ => *self,
        }
    }

    /// Log directory name under the results directory
    pub fn log_dir_name(&self) -> &'static str {
        match self {
            RunMode::PerformanceLite | RunMode::Performance | RunMode::Testing => {
                "log_performance"
            }
            RunMode::Accuracy => "log_accuracy",
            RunMode::Submission => "log_submission",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "performance_lite_mode" | "performance_lite" | "lite" => Ok(RunMode::PerformanceLite),
            "accuracy_mode" | "accuracy" => Ok(RunMode::Accuracy),
            "submission_mode" | "submission" => Ok(RunMode::Submission),
            "performance_mode" | "performance" => Ok(RunMode::Performance),
            "testing" | "test" => Ok(RunMode::Testing),
            other => Err(Error::MalformedInput(format!("unknown run mode: {other}"))),
        }
    }
}

/// Mode understood by the external inference driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverMode {
    /// Latency measurement only
    PerformanceOnly,
    /// Accuracy measurement only
    AccuracyOnly,
    /// Both, as required for submissions
    SubmissionRun,
}

impl DriverMode {
    /// Flag value passed to the driver
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverMode::PerformanceOnly => "PerformanceOnly",
            DriverMode::AccuracyOnly => "AccuracyOnly",
            DriverMode::SubmissionRun => "SubmissionRun",
        }
    }
}

/// Dataset variant selected for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetVariant {
    /// Full dataset
    Full,
    /// Reduced dataset for quick performance runs
    Lite,
    /// Tiny dataset for smoke tests
    Test,
}

/// A single scheduled benchmark execution
///
/// Built by the planner and consumed exactly once by the scheduler worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    /// Benchmark (model) id
    pub benchmark_id: String,
    /// Mode of this particular run
    pub mode: RunMode,
    /// Which dataset variant was selected
    pub dataset_variant: DatasetVariant,
    /// The resolved dataset
    pub dataset: DatasetDescriptor,
    /// Driver log/output directory
    pub output_dir: PathBuf,
    /// Resolved batch size (at least 1)
    pub batch_size: u32,
    /// Position in the plan, starting at 0
    pub sequence: usize,
}
