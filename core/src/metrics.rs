//! Result aggregation and summary scoring
//!
//! The summary score of a session is the geometric mean of the scores of
//! every successful non-accuracy run. [`AggregateProgress`] keeps the running
//! product so the summary is available as soon as the last run finishes;
//! [`ResultAggregator`] owns the records themselves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::result::ResultRecord;
use crate::run::RunMode;
use crate::traits::ResultsStore;

/// Session progress and running score product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateProgress {
    /// Runs in the plan
    pub total: usize,
    /// Runs that have started
    pub started: usize,
    /// Runs that have finished, failed ones included
    pub finished: usize,
    /// Product of contributing scores
    pub score_product: f64,
    /// Number of contributing scores
    pub score_count: usize,
}

impl Default for AggregateProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AggregateProgress {
    /// Fresh progress for a plan of `total` runs
    pub fn new(total: usize) -> Self {
        Self {
            total,
            started: 0,
            finished: 0,
            score_product: 1.0,
            score_count: 0,
        }
    }

    /// Whole-percent completion
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        (self.finished.min(self.total) * 100 / self.total) as u8
    }

    /// Whether every planned run has finished
    pub fn is_complete(&self) -> bool {
        self.finished >= self.total
    }

    /// Geometric mean of the contributing scores; 0 until complete or when
    /// nothing contributed
    pub fn summary(&self) -> f64 {
        if self.score_count == 0 || !self.is_complete() {
            return 0.0;
        }
        self.score_product.powf(1.0 / self.score_count as f64)
    }
}

/// Collects records of a session and maintains [`AggregateProgress`]
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    progress: AggregateProgress,
    results: Vec<ResultRecord>,
}

impl ResultAggregator {
    /// Aggregator for a plan of `total` runs
    pub fn new(total: usize) -> Self {
        Self {
            progress: AggregateProgress::new(total),
            results: Vec::new(),
        }
    }

    /// Count a run as started
    pub fn mark_started(&mut self) {
        self.progress.started += 1;
    }

    /// Record a finished run.
    ///
    /// A record for the same benchmark and mode replaces the earlier one.
    pub fn record(&mut self, result: ResultRecord) {
        self.progress.finished += 1;

        match self
            .results
            .iter_mut()
            .find(|r| r.benchmark_id == result.benchmark_id && r.mode == result.mode)
        {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
        self.recompute_product();
    }

    /// Shrink the plan to what actually finished, after cancellation
    pub fn truncate_to_finished(&mut self) {
        self.progress.total = self.progress.finished;
        self.progress.started = self.progress.finished;
    }

    /// Summary score, see [`AggregateProgress::summary`]
    pub fn summary(&self) -> f64 {
        self.progress.summary()
    }

    /// Progress snapshot
    pub fn progress(&self) -> &AggregateProgress {
        &self.progress
    }

    /// Records in completion order
    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    /// Take the records
    pub fn into_results(self) -> Vec<ResultRecord> {
        self.results
    }

    /// Write the records to the results file
    pub fn persist(&self, store: &dyn ResultsStore, mode: RunMode) -> Result<()> {
        store.persist(&self.results, mode)
    }

    fn recompute_product(&mut self) {
        let scores: Vec<f64> = self
            .results
            .iter()
            .filter_map(ResultRecord::aggregate_score)
            .collect();
        self.progress.score_product = scores.iter().product();
        self.progress.score_count = scores.len();
    }
}

/// Merge records into one display record per benchmark, in catalog order.
///
/// Performance and accuracy records of a benchmark (as produced by
/// submission runs) are folded together. Ids unknown to the catalog are
/// dropped.
pub fn merge_for_display(results: &[ResultRecord], catalog: &Catalog) -> Vec<ResultRecord> {
    let mut slots: BTreeMap<usize, ResultRecord> = BTreeMap::new();

    for record in results {
        let Some(position) = catalog.position_of(&record.benchmark_id) else {
            tracing::debug!(benchmark_id = %record.benchmark_id, "Dropping result for unknown benchmark");
            continue;
        };

        match slots.get_mut(&position) {
            None => {
                let mut slot = record.clone();
                if record.mode.is_accuracy() {
                    slot.score = None;
                } else if record.mode.is_performance() {
                    slot.accuracy = None;
                }
                slots.insert(position, slot);
            }
            Some(slot) => {
                if record.mode.is_accuracy() {
                    slot.accuracy = record.accuracy.clone();
                } else {
                    slot.score = record.score;
                    slot.runtime = record.runtime.clone();
                    slot.min_samples = record.min_samples;
                    slot.num_samples = record.num_samples;
                    slot.min_duration_ms = record.min_duration_ms;
                    slot.duration_ms = record.duration_ms;
                }
                if slot.mode != record.mode {
                    slot.mode = RunMode::Submission;
                }
                if slot.error.is_none() {
                    slot.error = record.error.clone();
                }
                slot.timestamp = slot.timestamp.max(record.timestamp);
            }
        }
    }

    slots.into_values().collect()
}
