//! Builder pattern for Scheduler construction

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::channel::ChannelConfig;
use crate::error::{Error, Result};
use crate::settings::SettingsStore;
use crate::traits::InferenceDriver;

use super::Scheduler;

/// Builder for creating a Scheduler
///
/// # Example
///
/// ```ignore
/// let scheduler = SchedulerBuilder::new()
///     .driver(driver)
///     .catalog(catalog)
///     .settings(settings)
///     .cache_root("/data/cache")
///     .results_dir("/data/results")
///     .cooldown(Some(Duration::from_secs(300)))
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    driver: Option<Arc<dyn InferenceDriver>>,
    catalog: Option<Arc<Catalog>>,
    settings: Option<Arc<SettingsStore>>,
    cache_root: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    cooldown: Option<Duration>,
    channel_config: ChannelConfig,
}

impl SchedulerBuilder {
    /// Create a new scheduler builder
    pub fn new() -> Self {
        Self {
            driver: None,
            catalog: None,
            settings: None,
            cache_root: None,
            results_dir: None,
            cooldown: None,
            channel_config: ChannelConfig::default(),
        }
    }

    /// Set the inference driver
    pub fn driver(mut self, driver: Arc<dyn InferenceDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the task catalog
    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the settings store
    pub fn settings(mut self, settings: Arc<SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the asset cache root
    pub fn cache_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(path.into());
        self
    }

    /// Set the results directory
    pub fn results_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_dir = Some(path.into());
        self
    }

    /// Pause before every performance run but the first; `None` disables it
    pub fn cooldown(mut self, pause: Option<Duration>) -> Self {
        self.cooldown = pause;
        self
    }

    /// Set the channel configuration
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Build the scheduler
    ///
    /// # Errors
    ///
    /// Returns an error if driver, catalog, settings or directories are not set.
    pub fn build(self) -> Result<Scheduler> {
        let driver = self
            .driver
            .ok_or_else(|| Error::missing_component("driver"))?;
        let catalog = self
            .catalog
            .ok_or_else(|| Error::missing_component("catalog"))?;
        let settings = self
            .settings
            .ok_or_else(|| Error::missing_component("settings"))?;
        let cache_root = self
            .cache_root
            .ok_or_else(|| Error::missing_component("cache_root"))?;
        let results_dir = self
            .results_dir
            .ok_or_else(|| Error::missing_component("results_dir"))?;

        Ok(Scheduler {
            driver,
            catalog,
            settings,
            cache_root,
            results_dir,
            cooldown: self.cooldown.filter(|pause| !pause.is_zero()),
            channel_config: self.channel_config,
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
