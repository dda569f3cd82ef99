//! Wiring of session components from configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mlbench_core::{
    paths, requirements_for, AssetProvider, AssetRequirement, Catalog, DeviceInfo,
    InferenceDriver, Orchestrator, OrchestratorBuilder, ResultsStore, SavedSession,
    SessionConfig, SettingsSnapshot, SettingsStore, TaskCatalog,
};
use mlbench_drivers::{DriverConfig, ProcessDriver};
use mlbench_report::JsonResultsStore;
use mlbench_storage::{AssetManager, FsBlobStore, HttpConfig, HttpFetcher};
use sysinfo::System;

const SESSION_FILE: &str = "last_session.json";

/// Everything a session needs apart from the driver
pub struct Components {
    pub config: SessionConfig,
    pub catalog: Arc<TaskCatalog>,
    pub settings: Arc<SettingsStore>,
    pub assets: Arc<AssetManager>,
    pub results: Arc<JsonResultsStore>,
}

impl Components {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let fetcher = HttpFetcher::new(&HttpConfig::default())?;
        let assets = AssetManager::new(Arc::new(fetcher), &config.cache_dir);

        Ok(Self {
            catalog: Arc::new(TaskCatalog::new(config.catalog_path())),
            settings: settings_store(&config)?,
            assets: Arc::new(assets),
            results: Arc::new(results_store(&config)),
            config,
        })
    }

    pub fn orchestrator(self, driver: Arc<dyn InferenceDriver>) -> Result<Orchestrator> {
        let orchestrator = OrchestratorBuilder::new()
            .config(self.config)
            .catalog(self.catalog)
            .settings(self.settings)
            .driver(driver)
            .assets(self.assets)
            .results_store(self.results)
            .build()?;
        Ok(orchestrator)
    }

    /// Catalog, fetched first when it lives remotely
    pub async fn load_catalog(&self) -> Result<Arc<Catalog>> {
        let source = self.config.catalog_path();
        if paths::is_remote(&source) {
            let requirement = AssetRequirement::new(&source);
            if !self.assets.is_satisfied(&requirement) {
                self.assets
                    .acquire_all(std::slice::from_ref(&requirement), Arc::new(|_: u8| {}))
                    .await
                    .with_context(|| format!("Failed to fetch catalog: {source}"))?;
            }
            self.catalog.set_path(self.assets.local_path(&source));
        }
        self.catalog
            .get()
            .with_context(|| format!("Failed to load catalog from: {source}"))
    }

    pub fn requirements(&self, catalog: &Catalog) -> Result<Vec<AssetRequirement>> {
        let settings = self.settings.get()?;
        Ok(requirements_for(
            self.config.effective_mode(),
            catalog,
            &settings,
            &self.config.selection(),
        ))
    }
}

/// Settings of the configured backend, seeded from the default settings file
pub fn settings_store(config: &SessionConfig) -> Result<Arc<SettingsStore>> {
    let defaults = match &config.default_settings {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read default settings: {}", path.display()))?;
            SettingsSnapshot::from_slice(&bytes).context("Invalid default settings")?
        }
        None => {
            tracing::warn!("No default settings configured; benchmarks need settings to run");
            SettingsSnapshot::default()
        }
    };
    let blobs = FsBlobStore::new(&config.settings_dir);
    Ok(Arc::new(SettingsStore::new(
        Arc::new(blobs),
        config.backend.clone(),
        defaults,
    )))
}

pub fn results_store(config: &SessionConfig) -> JsonResultsStore {
    JsonResultsStore::new(config.results_file(), config.settings_dir.join(SESSION_FILE))
}

/// The last completed session, if it is still valid
pub fn saved_session(config: &SessionConfig) -> Result<Option<SavedSession>> {
    let saved = results_store(config).load_session()?;
    Ok(saved.filter(|s| {
        s.is_valid(
            chrono::Utc::now(),
            &config.app_version,
            config.max_results_age_days,
        )
    }))
}

pub fn driver(
    config: &SessionConfig,
    program: &Path,
    lib_path: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<Arc<dyn InferenceDriver>> {
    let mut driver_config = DriverConfig::new(PathBuf::from(program));
    if let Some(lib) = lib_path {
        driver_config = driver_config.with_lib_path(lib);
    }
    if let Some(timeout) = timeout {
        driver_config = driver_config.with_timeout(timeout);
    }
    let driver = ProcessDriver::new(driver_config, &config.backend)
        .context("Invalid driver configuration")?;
    Ok(Arc::new(driver))
}

/// Host memory and identity
pub fn device_info() -> DeviceInfo {
    let mut system = System::new();
    system.refresh_memory();
    let description = format!(
        "{} {}",
        System::name().unwrap_or_else(|| "unknown".into()),
        System::os_version().unwrap_or_default()
    );
    DeviceInfo {
        total_memory_bytes: system.total_memory(),
        supported: true,
        description: description.trim().to_string(),
    }
}
