//! Benchmark results and saved sessions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::run::RunMode;

/// Outcome of one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Benchmark id
    pub benchmark_id: String,
    /// Display name of the owning task
    pub task_name: String,
    /// Runtime label
    pub runtime: String,
    /// Score; `None` renders as "N/A"
    pub score: Option<f64>,
    /// Accuracy; `None` renders as "N/A"
    pub accuracy: Option<String>,
    /// Minimum sample count requested
    pub min_samples: u64,
    /// Samples processed
    pub num_samples: u64,
    /// Minimum duration requested, in milliseconds
    pub min_duration_ms: f64,
    /// Actual duration in milliseconds
    pub duration_ms: f64,
    /// Mode the record was produced in
    pub mode: RunMode,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Failure detail; a record carrying an error never enters aggregation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    /// Create an empty record for a benchmark
    pub fn new(benchmark_id: impl Into<String>, task_name: impl Into<String>, mode: RunMode) -> Self {
        Self {
            benchmark_id: benchmark_id.into(),
            task_name: task_name.into(),
            runtime: String::new(),
            score: None,
            accuracy: None,
            min_samples: 0,
            num_samples: 0,
            min_duration_ms: 0.0,
            duration_ms: 0.0,
            mode,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Create a degraded record for a failed benchmark
    pub fn failed(
        benchmark_id: impl Into<String>,
        task_name: impl Into<String>,
        mode: RunMode,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(benchmark_id, task_name, mode)
        }
    }

    /// Whether the benchmark failed
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Score contributed to the summary, if any
    pub fn aggregate_score(&self) -> Option<f64> {
        if self.is_degraded() || self.mode.is_accuracy() {
            return None;
        }
        self.score.filter(|s| s.is_finite() && *s > 0.0)
    }

    /// Score as displayed and persisted
    pub fn score_display(&self) -> String {
        match self.score {
            Some(score) => format!("{score:.2}"),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    /// Accuracy as displayed and persisted
    pub fn accuracy_display(&self) -> String {
        self.accuracy
            .clone()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

/// Placeholder for a missing score or accuracy
pub const NOT_AVAILABLE: &str = "N/A";

/// A completed session, kept so the results view survives restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    /// Summary score of the session
    pub summary_score: f64,
    /// Mode the session ran in
    pub mode: RunMode,
    /// Merged display results
    pub results: Vec<ResultRecord>,
    /// Application version that wrote the session
    pub app_version: String,
    /// When the session was saved
    pub saved_at: DateTime<Utc>,
}

impl SavedSession {
    /// A saved session is stale only when it is older than `max_age_days`
    /// and was written by a different application version.
    pub fn is_valid(&self, now: DateTime<Utc>, app_version: &str, max_age_days: u64) -> bool {
        // chrono panics past ~i64::MAX milliseconds
        let days = i64::try_from(max_age_days)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 86_400_000);
        let max_age = Duration::days(days);
        let expired = now.signed_duration_since(self.saved_at) > max_age;
        !(expired && self.app_version != app_version)
    }
}
