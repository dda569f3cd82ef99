//! The results file consumed by external submission tooling

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use mlbench_core::{Error, ResultRecord, Result, RunMode, NOT_AVAILABLE};
use serde::{Deserialize, Serialize};

/// Runtime block of a results entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Runtime label
    pub runtime: String,
}

/// One entry of `results.json`; every scalar is a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Benchmark id
    pub benchmark_id: String,
    /// Runtime used
    pub configuration: Configuration,
    /// Score
    pub score: String,
    /// Accuracy, "N/A" when not measured
    pub accuracy: String,
    /// Minimum duration requested
    pub min_duration: String,
    /// Actual duration
    pub duration: String,
    /// Minimum sample count requested
    pub min_samples: String,
    /// Samples processed
    pub num_samples: String,
    /// Mode the run used
    pub mode: String,
    /// Local time the file was written
    pub datetime: String,
}

impl ResultEntry {
    /// Build the entry for `record` written in a `session_mode` session
    pub fn from_record(record: &ResultRecord, session_mode: RunMode, datetime: NaiveDateTime) -> Self {
        let accuracy = if session_mode == RunMode::PerformanceLite || record.mode.is_performance() {
            NOT_AVAILABLE.to_string()
        } else {
            record.accuracy_display()
        };

        Self {
            benchmark_id: record.benchmark_id.clone(),
            configuration: Configuration {
                runtime: record.runtime.clone(),
            },
            score: record
                .score
                .map(float_string)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            accuracy,
            min_duration: float_string(record.min_duration_ms),
            duration: float_string(record.duration_ms),
            min_samples: record.min_samples.to_string(),
            num_samples: record.num_samples.to_string(),
            mode: record.mode.as_str().to_string(),
            datetime: datetime.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        }
    }
}

/// Decimal rendering that always keeps a fractional part ("60.0", "12.5")
fn float_string(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Render `results` as the pretty-printed, 4-space indented results array
pub fn render_results(results: &[ResultRecord], session_mode: RunMode) -> Result<String> {
    let now = Local::now().naive_local();
    let entries: Vec<ResultEntry> = results
        .iter()
        .map(|r| ResultEntry::from_record(r, session_mode, now))
        .collect();

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    entries
        .serialize(&mut serializer)
        .map_err(|e| Error::MalformedInput(format!("results: {e}")))?;
    String::from_utf8(out).map_err(|e| Error::MalformedInput(format!("results: {e}")))
}

/// Read a results file back
pub fn read_results(path: &Path) -> Result<Vec<ResultEntry>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| Error::MalformedInput(format!("{}: {e}", path.display())))
}
