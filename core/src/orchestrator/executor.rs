//! Orchestrator state machine

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use crate::assets::{requirements_for, AssetRequirement};
use crate::catalog::TaskCatalog;
use crate::channel::ChannelConfig;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::metrics::{merge_for_display, AggregateProgress};
use crate::paths;
use crate::result::{ResultRecord, SavedSession};
use crate::run::RunMode;
use crate::scheduler::{SchedulerBuilder, SchedulerEvent, SchedulerHandle};
use crate::settings::{SettingsStore, COOLDOWN_SETTING};
use crate::traits::{AssetProvider, InferenceDriver, ProgressSink, ResultsStore};

use super::state::{DeviceInfo, OrchestrationState, StateError};

/// Components an orchestrator works with
pub struct OrchestrationContext {
    /// Session configuration
    pub config: SessionConfig,
    /// Task catalog
    pub catalog: Arc<TaskCatalog>,
    /// Backend settings
    pub settings: Arc<SettingsStore>,
    /// Inference driver
    pub driver: Arc<dyn InferenceDriver>,
    /// Asset acquisition
    pub assets: Arc<dyn AssetProvider>,
    /// Results file and session history
    pub results: Arc<dyn ResultsStore>,
}

/// Drives a session from loading to results
///
/// `Loading -> Idle <-> Running -> Results <-> Idle`; any state may move to
/// the terminal `Exiting`. Recoverable failures park in `Error`.
pub struct Orchestrator {
    ctx: OrchestrationContext,
    channel_config: ChannelConfig,
    state_tx: watch::Sender<OrchestrationState>,
    session: Option<SchedulerHandle>,
    session_mode: RunMode,
    cancelling: bool,
    summary: f64,
    results: Vec<ResultRecord>,
}

impl Orchestrator {
    /// Create an orchestrator in the `Loading` state
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(ctx: OrchestrationContext, channel_config: ChannelConfig) -> Self {
        let (state_tx, _) = watch::channel(OrchestrationState::Loading);
        let session_mode = ctx.config.effective_mode();
        Self {
            ctx,
            channel_config,
            state_tx,
            session: None,
            session_mode,
            cancelling: false,
            summary: 0.0,
            results: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> OrchestrationState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<OrchestrationState> {
        self.state_tx.subscribe()
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.ctx.config
    }

    /// Summary score of the displayed session
    pub fn summary(&self) -> f64 {
        self.summary
    }

    /// Merged results of the displayed session
    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    /// Mode of the displayed or running session
    pub fn session_mode(&self) -> RunMode {
        self.session_mode
    }

    /// Theoretical best summary for the displayed results
    pub fn max_summary_score(&self) -> Result<f64> {
        let catalog = self.ctx.catalog.get()?;
        Ok(catalog.max_summary_score(self.results.iter().map(|r| r.benchmark_id.as_str())))
    }

    /// Progress of the running session
    pub fn progress(&self) -> Option<AggregateProgress> {
        self.session.as_ref().map(SchedulerHandle::progress)
    }

    /// Progress updates of the running session
    pub fn progress_receiver(&self) -> Option<watch::Receiver<AggregateProgress>> {
        self.session.as_ref().map(SchedulerHandle::progress_receiver)
    }

    /// Assets the configured session needs
    pub fn requirements(&self) -> Result<Vec<AssetRequirement>> {
        let catalog = self.ctx.catalog.get()?;
        let settings = self.ctx.settings.get()?;
        Ok(requirements_for(
            self.ctx.config.effective_mode(),
            &catalog,
            &settings,
            &self.ctx.config.selection(),
        ))
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Reject unsupported or undersized devices; both end the session
    pub fn check_device(&mut self, device: &DeviceInfo) -> Result<()> {
        self.expect_state(matches!(self.state(), OrchestrationState::Loading), "check the device")?;

        let failure = if !device.supported {
            Some(Error::UnsupportedDevice(device.description.clone()))
        } else if device.total_memory_gb() < self.ctx.config.min_memory_gb {
            Some(Error::InsufficientMemory {
                required_gb: self.ctx.config.min_memory_gb,
                total_gb: device.total_memory_gb(),
            })
        } else {
            None
        };

        match failure {
            Some(err) => {
                tracing::error!(device = %device.description, error = %err, "Device check failed");
                self.exit(err.to_string());
                Err(err)
            }
            None => {
                tracing::debug!(
                    device = %device.description,
                    memory_gb = device.total_memory_gb(),
                    "Device check passed"
                );
                Ok(())
            }
        }
    }

    /// Acquire assets and settle in `Idle`, or `Results` when a valid saved
    /// session exists and `restart` is false.
    ///
    /// Network failures park in a retryable `Error`; any other failure ends
    /// the session.
    pub async fn load(
        &mut self,
        sink: Arc<dyn ProgressSink>,
        restart: bool,
    ) -> Result<OrchestrationState> {
        self.expect_state(matches!(self.state(), OrchestrationState::Loading), "load")?;

        if let Err(err) = self.acquire(sink).await {
            if err.is_retryable() {
                tracing::warn!(error = %err, "Asset acquisition failed, retry possible");
                self.transition(OrchestrationState::Error(StateError::from(&err)))?;
            } else {
                tracing::error!(error = %err, "Asset acquisition failed");
                self.exit(err.to_string());
            }
            return Err(err);
        }

        let next = if restart {
            OrchestrationState::Idle
        } else {
            self.restore_session()
        };
        self.transition(next.clone())?;
        Ok(next)
    }

    async fn acquire(&self, sink: Arc<dyn ProgressSink>) -> Result<()> {
        let config = &self.ctx.config;

        let catalog_path = config.catalog_path();
        if paths::is_remote(&catalog_path) {
            let requirement = AssetRequirement::new(&catalog_path);
            if !self.ctx.assets.is_satisfied(&requirement) {
                self.ctx
                    .assets
                    .acquire_all(std::slice::from_ref(&requirement), Arc::clone(&sink))
                    .await?;
            }
            self.ctx
                .catalog
                .set_path(paths::local_path(&catalog_path, &config.cache_dir));
        } else {
            self.ctx.catalog.set_path(&catalog_path);
        }

        let pending: Vec<AssetRequirement> = self
            .requirements()?
            .into_iter()
            .filter(|r| !self.ctx.assets.is_satisfied(r))
            .collect();
        if pending.is_empty() {
            tracing::debug!("All assets present");
            return Ok(());
        }

        tracing::info!(pending = pending.len(), "Acquiring assets");
        self.ctx.assets.acquire_all(&pending, sink).await
    }

    fn restore_session(&mut self) -> OrchestrationState {
        let config = &self.ctx.config;
        match self.ctx.results.load_session() {
            Ok(Some(saved))
                if saved.is_valid(Utc::now(), &config.app_version, config.max_results_age_days) =>
            {
                tracing::info!(summary = saved.summary_score, mode = %saved.mode, "Restored saved session");
                self.summary = saved.summary_score;
                self.session_mode = saved.mode;
                self.results = saved.results;
                OrchestrationState::Results
            }
            Ok(Some(_)) => {
                tracing::info!("Saved session is stale, discarding");
                if let Err(e) = self.ctx.results.clear_session() {
                    tracing::warn!(error = %e, "Failed to clear stale session");
                }
                OrchestrationState::Idle
            }
            Ok(None) => OrchestrationState::Idle,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read saved session");
                OrchestrationState::Idle
            }
        }
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    /// Plan and start a session; also serves "run again" from `Results`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(
            matches!(
                self.state(),
                OrchestrationState::Idle | OrchestrationState::Results
            ),
            "start a run",
        )?;

        let handle = match self.launch() {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(error = %err, "Cannot start benchmarks");
                self.transition(OrchestrationState::Error(StateError {
                    retryable: false,
                    ..StateError::from(&err)
                }))?;
                return Err(err);
            }
        };

        self.summary = 0.0;
        self.results.clear();
        self.cancelling = false;
        self.session = Some(handle);
        self.transition(OrchestrationState::Running)
    }

    fn launch(&mut self) -> Result<SchedulerHandle> {
        let config = &self.ctx.config;
        let mode = config.effective_mode();
        let catalog = self.ctx.catalog.get()?;

        let cooldown_enabled = match config.cooldown {
            Some(enabled) => enabled,
            None => self.ctx.settings.common_flag(COOLDOWN_SETTING)?,
        };

        let scheduler = SchedulerBuilder::new()
            .driver(Arc::clone(&self.ctx.driver))
            .catalog(catalog)
            .settings(Arc::clone(&self.ctx.settings))
            .cache_root(&config.cache_dir)
            .results_dir(&config.results_dir)
            .cooldown(cooldown_enabled.then(|| config.cooldown_pause()))
            .channel_config(self.channel_config.clone())
            .build()?;

        let plan = scheduler.plan(mode, &config.selection())?;
        self.session_mode = mode;
        Ok(scheduler.execute(plan))
    }

    /// Next scheduler event, applying it to the state machine.
    ///
    /// Returns `None` when no session is running.
    pub async fn next_event(&mut self) -> Option<SchedulerEvent> {
        let handle = self.session.as_mut()?;
        let event = handle.next_event().await;

        match &event {
            Some(SchedulerEvent::AllFinished {
                summary,
                results,
                cancelled,
            }) => {
                self.session = None;
                self.finish(*summary, results, *cancelled);
            }
            None => {
                // worker gone without a final event
                self.session = None;
                self.finish(0.0, &[], true);
            }
            Some(_) => {}
        }
        event
    }

    fn finish(&mut self, summary: f64, results: &[ResultRecord], cancelled: bool) {
        if self.state_tx.borrow().is_terminal() {
            return;
        }
        if cancelled || self.cancelling {
            tracing::info!(finished = results.len(), "Session cancelled, discarding results");
            self.cancelling = false;
            let _ = self.transition(OrchestrationState::Idle);
            return;
        }

        let merged = match self.ctx.catalog.get() {
            Ok(catalog) => merge_for_display(results, &catalog),
            Err(e) => {
                tracing::warn!(error = %e, "Catalog unavailable, showing unmerged results");
                results.to_vec()
            }
        };

        if let Err(e) = self.ctx.results.persist(results, self.session_mode) {
            tracing::error!(error = %e, "Failed to write results file");
        }
        let saved = SavedSession {
            summary_score: summary,
            mode: self.session_mode,
            results: merged.clone(),
            app_version: self.ctx.config.app_version.clone(),
            saved_at: Utc::now(),
        };
        if let Err(e) = self.ctx.results.save_session(&saved) {
            tracing::error!(error = %e, "Failed to save session");
        }

        tracing::info!(summary, results = merged.len(), mode = %self.session_mode, "Session complete");
        self.summary = summary;
        self.results = merged;
        let _ = self.transition(OrchestrationState::Results);
    }

    /// Run a session to its end, reporting each event
    pub async fn run_to_completion(
        &mut self,
        mut on_event: impl FnMut(&SchedulerEvent),
    ) -> Result<OrchestrationState> {
        self.start()?;
        while let Some(event) = self.next_event().await {
            on_event(&event);
        }
        Ok(self.state())
    }

    /// Stop after the in-flight run and return to `Idle`
    pub async fn cancel(&mut self) -> Result<()> {
        self.expect_state(matches!(self.state(), OrchestrationState::Running), "cancel")?;
        self.cancelling = true;
        if let Some(handle) = &self.session {
            handle.cancel();
        }
        while self.next_event().await.is_some() {}
        Ok(())
    }

    /// A cancel trigger usable from another task
    pub fn canceller(&self) -> Option<crate::scheduler::Canceller> {
        self.session.as_ref().map(SchedulerHandle::canceller)
    }

    // ------------------------------------------------------------------
    // Recovery and exit
    // ------------------------------------------------------------------

    /// Leave a retryable error by reloading
    pub fn retry(&mut self) -> Result<()> {
        match self.state() {
            OrchestrationState::Error(err) if err.retryable => {
                self.transition(OrchestrationState::Loading)
            }
            state => Err(Error::InvalidState {
                action: "retry",
                state: state.name(),
            }),
        }
    }

    /// Acknowledge a non-retryable error, or close the results view
    pub fn dismiss(&mut self) -> Result<()> {
        match self.state() {
            OrchestrationState::Error(err) if !err.retryable => {
                self.transition(OrchestrationState::Idle)
            }
            OrchestrationState::Results => self.transition(OrchestrationState::Idle),
            state => Err(Error::InvalidState {
                action: "dismiss",
                state: state.name(),
            }),
        }
    }

    /// End the session
    pub fn exit(&mut self, reason: impl Into<String>) {
        if let Some(handle) = self.session.take() {
            handle.cancel();
        }
        let reason = reason.into();
        if !self.state_tx.borrow().is_terminal() {
            tracing::info!(reason = %reason, "Exiting");
            self.state_tx.send_replace(OrchestrationState::Exiting { reason });
        }
    }

    fn transition(&mut self, next: OrchestrationState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(&next) {
            return Err(Error::InvalidState {
                action: "change state",
                state: current.name(),
            });
        }
        tracing::debug!(from = current.name(), to = next.name(), "State transition");
        self.state_tx.send_replace(next);
        Ok(())
    }

    fn expect_state(&self, ok: bool, action: &'static str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidState {
                action,
                state: self.state_tx.borrow().name(),
            })
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &*self.state_tx.borrow())
            .field("mode", &self.session_mode)
            .field("driver", &self.ctx.driver.name())
            .field("running", &self.session.is_some())
            .finish()
    }
}
