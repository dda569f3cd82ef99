//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use crate::catalog::TaskCatalog;
use crate::channel::ChannelConfig;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::settings::SettingsStore;
use crate::traits::{AssetProvider, InferenceDriver, ResultsStore};

use super::executor::{OrchestrationContext, Orchestrator};

/// Builder for creating an Orchestrator with proper configuration
///
/// # Example
///
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new()
///     .config(SessionConfig::from_file(path)?)
///     .settings(settings)
///     .driver(driver)
///     .assets(assets)
///     .results_store(results)
///     .build()?;
/// ```
pub struct OrchestratorBuilder {
    config: SessionConfig,
    catalog: Option<Arc<TaskCatalog>>,
    settings: Option<Arc<SettingsStore>>,
    driver: Option<Arc<dyn InferenceDriver>>,
    assets: Option<Arc<dyn AssetProvider>>,
    results: Option<Arc<dyn ResultsStore>>,
    channel_config: ChannelConfig,
}

impl OrchestratorBuilder {
    /// Create a new orchestrator builder with default configuration
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            catalog: None,
            settings: None,
            driver: None,
            assets: None,
            results: None,
            channel_config: ChannelConfig::default(),
        }
    }

    /// Set the full session configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the run mode
    pub fn run_mode(mut self, mode: crate::run::RunMode) -> Self {
        self.config.run_mode = mode;
        self
    }

    /// Set the task catalog; defaults to one loaded from the configured path
    pub fn catalog(mut self, catalog: Arc<TaskCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the settings store
    pub fn settings(mut self, settings: Arc<SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the inference driver
    pub fn driver(mut self, driver: Arc<dyn InferenceDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the asset provider
    pub fn assets(mut self, assets: Arc<dyn AssetProvider>) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Set the results store
    pub fn results_store(mut self, results: Arc<dyn ResultsStore>) -> Self {
        self.results = Some(results);
        self
    }

    /// Set the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if a component is missing or configuration
    /// validation fails.
    pub fn build(self) -> Result<Orchestrator> {
        let settings = self
            .settings
            .ok_or_else(|| Error::missing_component("settings"))?;
        let driver = self
            .driver
            .ok_or_else(|| Error::missing_component("driver"))?;
        let assets = self
            .assets
            .ok_or_else(|| Error::missing_component("assets"))?;
        let results = self
            .results
            .ok_or_else(|| Error::missing_component("results_store"))?;

        self.config
            .validate()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        if settings.backend() != self.config.backend {
            return Err(Error::InvalidConfig(format!(
                "settings are for backend {}, session uses {}",
                settings.backend(),
                self.config.backend
            )));
        }

        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(TaskCatalog::new(self.config.catalog_path())));

        let ctx = OrchestrationContext {
            config: self.config,
            catalog,
            settings,
            driver,
            assets,
            results,
        };
        Ok(Orchestrator::new(ctx, self.channel_config))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
