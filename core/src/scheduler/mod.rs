//! Benchmark scheduler
//!
//! Planning turns the catalog, the backend settings and a run mode into an
//! ordered list of [`RunDescriptor`]s. Execution hands the plan to a single
//! background worker that runs one benchmark at a time:
//! **dequeue -> cool down -> drive -> record -> repeat**.
//!
//! The worker reports over an ordered event channel and publishes
//! [`AggregateProgress`] snapshots on a watch channel. Cancellation is
//! cooperative: it is checked before each dequeue and interrupts a cooldown,
//! but never an in-flight driver call.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = SchedulerBuilder::new()
//!     .driver(driver)
//!     .catalog(catalog)
//!     .settings(settings)
//!     .cache_root(cache)
//!     .results_dir(results)
//!     .build()?;
//!
//! let plan = scheduler.plan(RunMode::Submission, &BenchmarkSelection::all())?;
//! let mut handle = scheduler.execute(plan);
//! while let Some(event) = handle.next_event().await {
//!     println!("{event:?}");
//! }
//! ```

mod builder;
mod executor;
mod plan;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::catalog::Catalog;
use crate::channel::ChannelConfig;
use crate::error::Result;
use crate::metrics::AggregateProgress;
use crate::run::{RunDescriptor, RunMode};
use crate::settings::SettingsStore;
use crate::traits::InferenceDriver;

pub use builder::SchedulerBuilder;
pub use executor::{SchedulerEvent, MAX_EXPECTED_LATENCY_NS, TESTING_MIN_QUERY_COUNT};
pub use plan::{plan, BenchmarkSelection, PlanDirs};

use executor::Worker;

/// Plans sessions and runs them on a background worker
pub struct Scheduler {
    pub(crate) driver: Arc<dyn InferenceDriver>,
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) settings: Arc<SettingsStore>,
    pub(crate) cache_root: PathBuf,
    pub(crate) results_dir: PathBuf,
    pub(crate) cooldown: Option<Duration>,
    pub(crate) channel_config: ChannelConfig,
}

impl Scheduler {
    /// Build the run plan for `mode` using the current settings
    pub fn plan(&self, mode: RunMode, selection: &BenchmarkSelection) -> Result<Vec<RunDescriptor>> {
        let settings = self.settings.get()?;
        plan::plan(
            mode,
            &self.catalog,
            &settings,
            selection,
            PlanDirs {
                results_dir: &self.results_dir,
                cache_root: &self.cache_root,
            },
        )
    }

    /// Start running `plan` on a background worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn execute(&self, plan: Vec<RunDescriptor>) -> SchedulerHandle {
        let (events_tx, events_rx) = mpsc::channel(self.channel_config.events_buffer);
        let (progress_tx, progress_rx) = watch::channel(AggregateProgress::new(plan.len()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let worker = Worker {
            driver: Arc::clone(&self.driver),
            catalog: Arc::clone(&self.catalog),
            settings: Arc::clone(&self.settings),
            cache_root: self.cache_root.clone(),
            cooldown: self.cooldown,
            events_tx,
            progress_tx,
        };

        tracing::info!(
            runs = plan.len(),
            driver = self.driver.name(),
            cooldown_secs = ?self.cooldown.map(|d| d.as_secs()),
            "Starting benchmark session"
        );
        let task = tokio::spawn(worker.run(plan, shutdown_rx));

        SchedulerHandle {
            events: events_rx,
            progress: progress_rx,
            shutdown_tx,
            task,
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("driver", &self.driver.name())
            .field("cache_root", &self.cache_root)
            .field("results_dir", &self.results_dir)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

/// Handle to a running session
///
/// Dropping the handle cancels the session.
pub struct SchedulerHandle {
    events: mpsc::Receiver<SchedulerEvent>,
    progress: watch::Receiver<AggregateProgress>,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Next worker event; `None` once the worker is gone
    pub async fn next_event(&mut self) -> Option<SchedulerEvent> {
        self.events.recv().await
    }

    /// Latest progress snapshot
    pub fn progress(&self) -> AggregateProgress {
        self.progress.borrow().clone()
    }

    /// Subscribe to progress snapshots
    pub fn progress_receiver(&self) -> watch::Receiver<AggregateProgress> {
        self.progress.clone()
    }

    /// Stop dequeuing; the in-flight run finishes
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// A cloneable cancel trigger, e.g. for a Ctrl+C handler
    pub fn canceller(&self) -> Canceller {
        Canceller(self.shutdown_tx.clone())
    }

    /// Whether the worker task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Cancels the session it was taken from
#[derive(Debug, Clone)]
pub struct Canceller(broadcast::Sender<()>);

impl Canceller {
    /// Request cancellation
    pub fn cancel(&self) {
        let _ = self.0.send(());
    }
}
