//! CLI argument parsing and command dispatch

mod display;
mod session;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mlbench_core::{
    AssetProvider, OrchestrationState, RunMode, SchedulerEvent, SessionConfig, SettingsSnapshot,
};
use mlbench_report::read_results;

use session::Components;

/// mlbench - Sequential on-device inference benchmark runner
#[derive(Parser, Debug)]
#[command(name = "mlbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub session: SessionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Session configuration file (JSON)
    #[arg(short, long, global = true, env = "MLBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend id, overriding the configuration
    #[arg(short, long, global = true, env = "MLBENCH_BACKEND")]
    pub backend: Option<String>,

    /// Put cache, results and settings under this directory
    #[arg(long, global = true, env = "MLBENCH_ROOT")]
    pub root: Option<PathBuf>,

    /// Task catalog path or URL, overriding the configuration
    #[arg(long, global = true)]
    pub catalog: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire assets and run a benchmark session
    Run(RunArgs),
    /// Acquire the assets a session needs without running it
    Assets {
        /// Run mode whose assets to acquire
        #[arg(short, long)]
        mode: Option<RunMode>,
    },
    /// Inspect or change backend settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Show the last completed session or a results file
    Results {
        /// Read this results file instead of the saved session
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Validate the configuration and the task catalog
    Validate,
}

/// Options of the `run` command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run mode
    #[arg(short, long)]
    pub mode: Option<RunMode>,

    /// Submission run: performance then accuracy for every benchmark
    #[arg(long)]
    pub submission: bool,

    /// Pause between performance runs
    #[arg(long, conflicts_with = "no_cooldown")]
    pub cooldown: bool,

    /// Never pause between runs
    #[arg(long)]
    pub no_cooldown: bool,

    /// Cooldown length in minutes
    #[arg(long)]
    pub cooldown_minutes: Option<u64>,

    /// Skip a benchmark (repeatable)
    #[arg(long = "disable", value_name = "BENCHMARK_ID")]
    pub disabled: Vec<String>,

    /// Driver executable
    #[arg(long, env = "MLBENCH_DRIVER")]
    pub driver: PathBuf,

    /// Backend library handed to the driver
    #[arg(long, env = "MLBENCH_LIB_PATH")]
    pub lib_path: Option<PathBuf>,

    /// Kill a driver run after this many seconds
    #[arg(long)]
    pub driver_timeout: Option<u64>,

    /// Ignore a saved session and start fresh
    #[arg(long)]
    pub restart: bool,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the current settings
    Show,
    /// Change a common setting
    Set {
        /// Setting id
        id: String,
        /// New value
        value: String,
    },
    /// Replace all settings from a JSON file
    Load {
        /// Settings file
        path: PathBuf,
    },
}

impl Cli {
    /// Dispatch the parsed command
    pub async fn run(self) -> Result<()> {
        let config = self.session.load()?;
        match self.command {
            Commands::Run(args) => run(config, args).await,
            Commands::Assets { mode } => assets(config, mode).await,
            Commands::Settings { action } => settings(config, action),
            Commands::Results { file } => results(config, file),
            Commands::Validate => validate(config),
        }
    }
}

impl SessionArgs {
    /// Configuration file merged with command-line overrides
    fn load(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_file(path)
                .with_context(|| format!("Failed to load config from: {}", path.display()))?,
            None => SessionConfig::default(),
        };
        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        if let Some(root) = &self.root {
            config = config.with_root(root);
        }
        if let Some(catalog) = &self.catalog {
            config = config.with_catalog(catalog.clone());
        }
        Ok(config)
    }
}

impl RunArgs {
    fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(mode) = self.mode {
            config = config.with_run_mode(mode);
        }
        if self.submission {
            config = config.with_submission(true);
        }
        if self.cooldown {
            config = config.with_cooldown(true);
        } else if self.no_cooldown {
            config = config.with_cooldown(false);
        }
        if let Some(minutes) = self.cooldown_minutes {
            config = config.with_cooldown_minutes(minutes);
        }
        self.disabled
            .iter()
            .fold(config, |config, id| config.with_disabled(id.clone()))
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run(config: SessionConfig, args: RunArgs) -> Result<()> {
    let config = args.apply(config);
    let driver = session::driver(
        &config,
        &args.driver,
        args.lib_path.as_deref(),
        args.driver_timeout.map(Duration::from_secs),
    )?;
    let mode = config.effective_mode();
    let components = Components::new(config)?;
    let mut orchestrator = components.orchestrator(driver)?;

    orchestrator
        .check_device(&session::device_info())
        .context("Device check failed")?;

    let bar = display::acquisition_bar();
    let state = orchestrator
        .load(display::bar_sink(&bar), args.restart)
        .await;
    bar.finish_and_clear();
    match state.context("Failed to prepare assets")? {
        OrchestrationState::Results => {
            display::print_session(
                orchestrator.results(),
                orchestrator.summary(),
                orchestrator.max_summary_score().ok(),
                orchestrator.session_mode(),
            );
            println!("Previous results restored; starting a new session.\n");
        }
        state => tracing::debug!(state = state.name(), "Ready"),
    }

    display::print_banner(orchestrator.config(), mode);
    orchestrator.start().context("Failed to start benchmarks")?;

    if let Some(canceller) = orchestrator.canceller() {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling after the current benchmark...");
                canceller.cancel();
            }
        });
    }

    let bar = display::session_bar();
    while let Some(event) = orchestrator.next_event().await {
        display::show_event(&bar, &event);
        if let Some(progress) = orchestrator.progress() {
            bar.set_position(u64::from(progress.percent()));
        }
        if let SchedulerEvent::AllFinished { .. } = event {
            bar.set_position(100);
        }
    }
    bar.finish_and_clear();

    match orchestrator.state() {
        OrchestrationState::Results => {
            display::print_session(
                orchestrator.results(),
                orchestrator.summary(),
                orchestrator.max_summary_score().ok(),
                orchestrator.session_mode(),
            );
            println!(
                "Results written to {}",
                orchestrator.config().results_file().display()
            );
            Ok(())
        }
        OrchestrationState::Idle => {
            println!("Session cancelled; no results were saved.");
            Ok(())
        }
        state => bail!("Session ended {}", state.name()),
    }
}

async fn assets(config: SessionConfig, mode: Option<RunMode>) -> Result<()> {
    let config = match mode {
        Some(mode) => config.with_run_mode(mode),
        None => config,
    };
    let components = Components::new(config)?;
    let catalog = components.load_catalog().await?;
    let requirements = components.requirements(&catalog)?;

    let pending: Vec<_> = requirements
        .iter()
        .filter(|r| !components.assets.is_satisfied(r))
        .cloned()
        .collect();
    for requirement in &requirements {
        let status = if pending.contains(requirement) {
            "missing"
        } else {
            "present"
        };
        println!("  {status:<8} {}", requirement.path);
    }
    if pending.is_empty() {
        println!("All {} assets present.", requirements.len());
        return Ok(());
    }

    let bar = display::acquisition_bar();
    let result = components
        .assets
        .acquire_all(&pending, display::bar_sink(&bar))
        .await;
    bar.finish_and_clear();
    result.context("Failed to acquire assets")?;
    println!("Acquired {} assets.", pending.len());
    Ok(())
}

fn settings(config: SessionConfig, action: SettingsAction) -> Result<()> {
    let store = session::settings_store(&config)?;
    match action {
        SettingsAction::Show => {}
        SettingsAction::Set { id, value } => {
            store
                .set_common_value(&id, &value)
                .with_context(|| format!("Failed to set {id}"))?;
        }
        SettingsAction::Load { path } => {
            store
                .load_from_file(&path)
                .with_context(|| format!("Failed to load settings from: {}", path.display()))?;
        }
    }
    display::print_settings(&store.key(), &*store.get()?);
    Ok(())
}

fn results(config: SessionConfig, file: Option<PathBuf>) -> Result<()> {
    if let Some(path) = file {
        let entries = read_results(&path)
            .with_context(|| format!("Failed to read results from: {}", path.display()))?;
        display::print_entries(&entries);
        return Ok(());
    }

    match session::saved_session(&config)? {
        Some(saved) => {
            display::print_session(&saved.results, saved.summary_score, None, saved.mode);
            println!("Saved {}", saved.saved_at.format("%Y-%m-%d %H:%M UTC"));
        }
        None => println!("No saved session."),
    }
    Ok(())
}

fn validate(config: SessionConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    println!("Configuration OK (backend {}).", config.backend);

    let catalog_path = config.catalog_path();
    if mlbench_core::paths::is_remote(&catalog_path) {
        println!("Catalog is remote ({catalog_path}); run `mlbench assets` to fetch it.");
    } else {
        let catalog = mlbench_core::Catalog::load(std::path::Path::new(&catalog_path))
            .with_context(|| format!("Failed to load catalog from: {catalog_path}"))?;
        println!(
            "Catalog OK: {} tasks, {} benchmarks.",
            catalog.tasks().len(),
            catalog.all_benchmarks().len()
        );
    }

    if let Some(path) = &config.default_settings {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read default settings: {}", path.display()))?;
        let snapshot = SettingsSnapshot::from_slice(&bytes).context("Invalid default settings")?;
        println!(
            "Default settings OK: {} common, {} benchmark settings.",
            snapshot.common_settings.len(),
            snapshot.benchmark_settings.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "mlbench",
            "--root",
            "/tmp/mlbench",
            "run",
            "--mode",
            "performance",
            "--no-cooldown",
            "--disable",
            "OD_uint8",
            "--driver",
            "/opt/driver",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.apply(cli.session.load().unwrap());
        assert_eq!(config.effective_mode(), RunMode::Performance);
        assert_eq!(config.cooldown, Some(false));
        assert!(!config.selection().is_enabled("OD_uint8"));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/mlbench/cache"));
    }

    #[test]
    fn test_submission_flag_wins() {
        let cli = Cli::try_parse_from([
            "mlbench", "run", "--mode", "lite", "--submission", "--driver", "d",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.apply(SessionConfig::default());
        assert_eq!(config.effective_mode(), RunMode::Submission);
    }

    #[test]
    fn test_cooldown_flags_conflict() {
        assert!(Cli::try_parse_from([
            "mlbench", "run", "--cooldown", "--no-cooldown", "--driver", "d"
        ])
        .is_err());
    }

    #[test]
    fn test_settings_set_parses() {
        let cli =
            Cli::try_parse_from(["mlbench", "settings", "set", "cooldown", "1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Settings {
                action: SettingsAction::Set { .. }
            }
        ));
    }
}
