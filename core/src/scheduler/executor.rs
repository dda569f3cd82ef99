//! Benchmark worker loop

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};

use crate::catalog::{Catalog, Scenario};
use crate::error::{Error, Result};
use crate::metrics::{AggregateProgress, ResultAggregator};
use crate::paths;
use crate::result::ResultRecord;
use crate::run::{RunDescriptor, RunMode};
use crate::settings::SettingsStore;
use crate::traits::{DriverRequest, InferenceDriver};

/// Largest single-stream latency bound a backend may declare
pub const MAX_EXPECTED_LATENCY_NS: u64 = 1_000_000;

/// Query count used by testing runs
pub const TESTING_MIN_QUERY_COUNT: u64 = 10;

/// Event emitted by the worker, in order
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A run was dequeued
    Started {
        /// Benchmark id
        benchmark_id: String,
        /// Mode of the run
        mode: RunMode,
        /// Position in the plan
        sequence: usize,
    },
    /// Pausing before a performance run
    CoolingStarted {
        /// Benchmark about to run
        benchmark_id: String,
        /// Length of the pause
        pause: Duration,
    },
    /// Pause over
    CoolingFinished {
        /// Benchmark about to run
        benchmark_id: String,
    },
    /// A run failed; a degraded [`SchedulerEvent::Finished`] follows
    Failed {
        /// Benchmark id
        benchmark_id: String,
        /// Failure detail
        error: String,
    },
    /// A run finished
    Finished(ResultRecord),
    /// The plan is done or was cancelled; always the last event
    AllFinished {
        /// Summary score
        summary: f64,
        /// Every record in completion order
        results: Vec<ResultRecord>,
        /// Whether the plan was cut short
        cancelled: bool,
    },
}

/// Runs a plan sequentially on one task
pub(crate) struct Worker {
    pub(crate) driver: Arc<dyn InferenceDriver>,
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) settings: Arc<SettingsStore>,
    pub(crate) cache_root: PathBuf,
    pub(crate) cooldown: Option<Duration>,
    pub(crate) events_tx: mpsc::Sender<SchedulerEvent>,
    pub(crate) progress_tx: watch::Sender<AggregateProgress>,
}

enum Cooldown {
    Completed,
    Cancelled,
}

impl Worker {
    /// Run every descriptor, stopping early on cancellation
    pub(crate) async fn run(self, plan: Vec<RunDescriptor>, mut shutdown: broadcast::Receiver<()>) {
        let mut aggregator = ResultAggregator::new(plan.len());
        let mut queue: VecDeque<RunDescriptor> = plan.into();
        let mut cancelled = false;
        self.publish(&aggregator);

        tracing::info!(runs = queue.len(), "Benchmark worker started");

        loop {
            if cancel_requested(&mut shutdown) {
                cancelled = true;
                break;
            }
            let Some(descriptor) = queue.pop_front() else {
                break;
            };

            aggregator.mark_started();
            self.publish(&aggregator);
            self.emit(SchedulerEvent::Started {
                benchmark_id: descriptor.benchmark_id.clone(),
                mode: descriptor.mode,
                sequence: descriptor.sequence,
            })
            .await;

            if let Some(pause) = self.cooldown_for(&descriptor) {
                if let Cooldown::Cancelled = self.cool_down(&descriptor, pause, &mut shutdown).await {
                    // never reached the driver, so it is not counted
                    cancelled = true;
                    break;
                }
            }

            let record = match self.run_one(&descriptor).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        benchmark_id = %descriptor.benchmark_id,
                        mode = %descriptor.mode,
                        error = %e,
                        "Benchmark failed"
                    );
                    self.emit(SchedulerEvent::Failed {
                        benchmark_id: descriptor.benchmark_id.clone(),
                        error: e.to_string(),
                    })
                    .await;
                    ResultRecord::failed(
                        &descriptor.benchmark_id,
                        self.task_name(&descriptor),
                        descriptor.mode,
                        e.to_string(),
                    )
                }
            };

            aggregator.record(record.clone());
            self.publish(&aggregator);
            self.emit(SchedulerEvent::Finished(record)).await;
        }

        if cancelled {
            tracing::info!(
                dropped = queue.len(),
                finished = aggregator.progress().finished,
                "Benchmark session cancelled"
            );
            aggregator.truncate_to_finished();
            self.publish(&aggregator);
        }

        let summary = aggregator.summary();
        tracing::info!(
            summary,
            finished = aggregator.progress().finished,
            cancelled,
            "Benchmark worker finished"
        );
        self.emit(SchedulerEvent::AllFinished {
            summary,
            results: aggregator.into_results(),
            cancelled,
        })
        .await;
    }

    fn cooldown_for(&self, descriptor: &RunDescriptor) -> Option<Duration> {
        if descriptor.sequence == 0 || !descriptor.mode.is_performance() {
            return None;
        }
        self.cooldown
    }

    async fn cool_down(
        &self,
        descriptor: &RunDescriptor,
        pause: Duration,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Cooldown {
        tracing::debug!(benchmark_id = %descriptor.benchmark_id, pause_secs = pause.as_secs(), "Cooling down");
        self.emit(SchedulerEvent::CoolingStarted {
            benchmark_id: descriptor.benchmark_id.clone(),
            pause,
        })
        .await;

        let outcome = tokio::select! {
            biased;

            _ = shutdown.recv() => Cooldown::Cancelled,
            _ = tokio::time::sleep(pause) => Cooldown::Completed,
        };

        self.emit(SchedulerEvent::CoolingFinished {
            benchmark_id: descriptor.benchmark_id.clone(),
        })
        .await;
        outcome
    }

    /// Execute a single run
    async fn run_one(&self, descriptor: &RunDescriptor) -> Result<ResultRecord> {
        let id = descriptor.benchmark_id.as_str();

        // 1. Resolve catalog entry and backend setting
        let (task, model) = self.catalog.resolve(id)?;
        let settings = self.settings.setting_list(id)?;
        let backend_setting = &settings.benchmark_setting;

        // 2. Check inputs
        let dataset_path = paths::local_path(&descriptor.dataset.path, &self.cache_root);
        if !paths::is_readable(&dataset_path) {
            return Err(Error::MissingDataset(dataset_path.display().to_string()));
        }
        let latency_bound = backend_setting.single_stream_expected_latency_ns;
        if latency_bound > MAX_EXPECTED_LATENCY_NS {
            return Err(Error::driver(
                id,
                format!(
                    "expected latency {latency_bound} ns exceeds {MAX_EXPECTED_LATENCY_NS} ns"
                ),
            ));
        }

        let (min_query_count, min_duration_ms) = match descriptor.mode {
            RunMode::Testing => (TESTING_MIN_QUERY_COUNT, 0),
            _ => (task.min_query_count, task.min_duration_ms),
        };

        let request = DriverRequest {
            benchmark_id: id.to_string(),
            backend: self.settings.backend().to_string(),
            model_path: paths::local_path(&backend_setting.src, &self.cache_root),
            settings: settings.clone(),
            dataset_type: descriptor.dataset.kind,
            dataset_path,
            groundtruth_path: descriptor
                .dataset
                .groundtruth_src
                .as_deref()
                .map(|src| paths::local_path(src, &self.cache_root)),
            offset: model.offset,
            num_classes: model.num_classes,
            image_width: model.image_width,
            image_height: model.image_height,
            scenario: model.scenario,
            batch_size: descriptor.batch_size,
            mode: descriptor.mode.driver_mode(),
            min_query_count,
            min_duration_ms,
            single_stream_expected_latency_ns: latency_bound,
            output_dir: descriptor.output_dir.clone(),
        };

        // 3. Run the blocking driver off the async threads
        tracing::info!(benchmark_id = id, mode = %descriptor.mode, "Running benchmark");
        let driver = Arc::clone(&self.driver);
        let output = tokio::task::spawn_blocking(move || driver.run(&request))
            .await
            .map_err(|e| Error::driver(id, format!("driver task aborted: {e}")))?
            .map_err(|e| Error::driver(id, e.to_string()))?;

        // 4. Score
        let score = match model.scenario {
            Scenario::Offline => output.latency_ms,
            Scenario::SingleStream if output.latency_ms > 0.0 => 1000.0 / output.latency_ms,
            Scenario::SingleStream => {
                return Err(Error::driver(
                    id,
                    format!("non-positive latency {}", output.latency_ms),
                ))
            }
        };

        let mut record = ResultRecord::new(id, &task.name, descriptor.mode);
        record.runtime = self.driver.name().to_string();
        record.score = Some(score);
        record.accuracy = if descriptor.mode.is_performance() {
            None
        } else {
            output.accuracy
        };
        record.min_samples = min_query_count;
        record.num_samples = output.num_samples;
        record.min_duration_ms = min_duration_ms as f64;
        record.duration_ms = output.duration_ms;

        tracing::info!(
            benchmark_id = id,
            score,
            accuracy = ?record.accuracy,
            "Benchmark finished"
        );
        Ok(record)
    }

    fn task_name(&self, descriptor: &RunDescriptor) -> String {
        self.catalog
            .resolve(&descriptor.benchmark_id)
            .map(|(task, _)| task.name.clone())
            .unwrap_or_default()
    }

    fn publish(&self, aggregator: &ResultAggregator) {
        // no observers is fine
        let _ = self.progress_tx.send(aggregator.progress().clone());
    }

    async fn emit(&self, event: SchedulerEvent) {
        if self.events_tx.send(event).await.is_err() {
            tracing::debug!("Event channel closed");
        }
    }
}

/// A sent signal or a dropped handle both stop the worker
fn cancel_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    use broadcast::error::TryRecvError;
    match shutdown.try_recv() {
        Ok(()) | Err(TryRecvError::Lagged(_)) | Err(TryRecvError::Closed) => true,
        Err(TryRecvError::Empty) => false,
    }
}
