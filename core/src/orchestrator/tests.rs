//! Integration tests for the Orchestrator module

use super::*;
use crate::assets::AssetRequirement;
use crate::catalog::fixtures::CATALOG_JSON;
use crate::config::SessionConfig;
use crate::error::{Error, ErrorKind};
use crate::result::{ResultRecord, SavedSession};
use crate::run::RunMode;
use crate::scheduler::SchedulerEvent;
use crate::settings::fixtures::store;
use crate::traits::{
    AssetProvider, DriverError, DriverOutput, DriverRequest, InferenceDriver, ProgressSink,
    ResultsStore,
};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Mocks
// ============================================================================

struct MockDriver {
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockDriver {
    fn new() -> Self {
        Self {
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl InferenceDriver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn run(&self, _request: &DriverRequest) -> Result<DriverOutput, DriverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(DriverOutput {
            latency_ms: 4.0,
            accuracy: Some("71.3%".to_string()),
            num_samples: 1024,
            duration_ms: 60_500.0,
        })
    }
}

#[derive(Clone, Copy)]
enum AcquireFailure {
    Network,
    Corrupt,
}

struct MockAssets {
    satisfied: AtomicBool,
    failure: Mutex<Option<AcquireFailure>>,
    acquired: Mutex<Vec<String>>,
}

impl MockAssets {
    fn new(satisfied: bool) -> Self {
        Self {
            satisfied: AtomicBool::new(satisfied),
            failure: Mutex::new(None),
            acquired: Mutex::new(Vec::new()),
        }
    }

    fn failing(self, failure: AcquireFailure) -> Self {
        *self.failure.lock() = Some(failure);
        self
    }
}

#[async_trait]
impl AssetProvider for MockAssets {
    fn needs_acquire(&self, _path: &str) -> bool {
        !self.satisfied.load(Ordering::SeqCst)
    }

    fn is_satisfied(&self, _requirement: &AssetRequirement) -> bool {
        self.satisfied.load(Ordering::SeqCst)
    }

    async fn acquire_all(
        &self,
        requirements: &[AssetRequirement],
        sink: Arc<dyn ProgressSink>,
    ) -> crate::Result<()> {
        self.acquired
            .lock()
            .extend(requirements.iter().map(|r| r.path.clone()));
        match *self.failure.lock() {
            Some(AcquireFailure::Network) => {
                Err(Error::NetworkUnavailable("Error: No network connected.".into()))
            }
            Some(AcquireFailure::Corrupt) => Err(Error::acquire(
                "https://example.com/coco.zip",
                "invalid zip archive",
            )),
            None => {
                sink.percent(100);
                self.satisfied.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

#[derive(Default)]
struct MemoryResults {
    persisted: Mutex<Vec<(Vec<ResultRecord>, RunMode)>>,
    session: Mutex<Option<SavedSession>>,
}

impl ResultsStore for MemoryResults {
    fn persist(&self, results: &[ResultRecord], mode: RunMode) -> crate::Result<()> {
        self.persisted.lock().push((results.to_vec(), mode));
        Ok(())
    }

    fn save_session(&self, session: &SavedSession) -> crate::Result<()> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    fn load_session(&self) -> crate::Result<Option<SavedSession>> {
        Ok(self.session.lock().clone())
    }

    fn clear_session(&self) -> crate::Result<()> {
        *self.session.lock() = None;
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

const ALL: [&str; 3] = ["IC_tpu_uint8", "IC_tpu_uint8_offline", "OD_uint8"];

struct Env {
    dir: TempDir,
    driver: Arc<MockDriver>,
    assets: Arc<MockAssets>,
    results: Arc<MemoryResults>,
}

impl Env {
    fn new() -> Self {
        Self::with(MockDriver::new(), MockAssets::new(false))
    }

    fn with(driver: MockDriver, assets: MockAssets) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tasks.json"), CATALOG_JSON).unwrap();

        let cache = dir.path().join("cache");
        for dataset in ["imagenet", "imagenet_lite", "coco"] {
            std::fs::create_dir_all(cache.join(dataset)).unwrap();
            std::fs::write(cache.join(dataset).join("0000.jpg"), b"jpeg").unwrap();
        }
        for groundtruth in ["imagenet_val.txt", "coco_val.pbtxt"] {
            std::fs::write(cache.join(groundtruth), b"groundtruth").unwrap();
        }

        Self {
            dir,
            driver: Arc::new(driver),
            assets: Arc::new(assets),
            results: Arc::new(MemoryResults::default()),
        }
    }

    fn catalog_path(&self) -> PathBuf {
        self.dir.path().join("tasks.json")
    }

    fn config(&self, mode: RunMode) -> SessionConfig {
        SessionConfig::new("tflite")
            .with_root(self.dir.path())
            .with_catalog(self.catalog_path().display().to_string())
            .with_run_mode(mode)
            .with_cooldown(false)
    }

    fn orchestrator(&self, config: SessionConfig) -> Orchestrator {
        OrchestratorBuilder::new()
            .config(config)
            .settings(Arc::new(store(&ALL)))
            .driver(self.driver.clone())
            .assets(self.assets.clone())
            .results_store(self.results.clone())
            .build()
            .unwrap()
    }
}

fn device(memory_gb: u64) -> DeviceInfo {
    DeviceInfo {
        total_memory_bytes: memory_gb * 1_000_000_000,
        supported: true,
        description: "test device".to_string(),
    }
}

fn sink() -> Arc<dyn ProgressSink> {
    Arc::new(|_percent: u8| {})
}

async fn loaded(env: &Env, mode: RunMode) -> Orchestrator {
    let mut orchestrator = env.orchestrator(env.config(mode));
    orchestrator.check_device(&device(4)).unwrap();
    orchestrator.load(sink(), true).await.unwrap();
    orchestrator
}

fn saved_session(days_ago: i64, version: &str) -> SavedSession {
    let mut record = ResultRecord::new("OD_uint8", "Object Detection", RunMode::Performance);
    record.score = Some(80.0);
    SavedSession {
        summary_score: 80.0,
        mode: RunMode::Performance,
        results: vec![record],
        app_version: version.to_string(),
        saved_at: Utc::now() - ChronoDuration::days(days_ago),
    }
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_unsupported_device_exits() {
    let env = Env::new();
    let mut orchestrator = env.orchestrator(env.config(RunMode::Performance));
    let unsupported = DeviceInfo {
        supported: false,
        ..device(8)
    };

    let err = orchestrator.check_device(&unsupported).unwrap_err();
    assert!(matches!(err, Error::UnsupportedDevice(_)));
    assert!(orchestrator.state().is_terminal());
}

#[tokio::test]
async fn test_low_memory_exits() {
    let env = Env::new();
    let mut orchestrator = env.orchestrator(env.config(RunMode::Performance));

    let err = orchestrator.check_device(&device(1)).unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientMemory {
            required_gb: 2,
            total_gb: 1
        }
    ));
    assert!(orchestrator.state().is_terminal());
    // nothing works after exiting
    assert!(orchestrator.load(sink(), false).await.is_err());
}

#[tokio::test]
async fn test_load_acquires_pending_assets() {
    let env = Env::new();
    let orchestrator = loaded(&env, RunMode::Performance).await;

    assert_eq!(orchestrator.state(), OrchestrationState::Idle);
    let acquired = env.assets.acquired.lock().clone();
    assert!(acquired.contains(&"https://example.com/coco.zip".to_string()));
    assert!(acquired.contains(&"https://example.com/models/OD_uint8.tflite".to_string()));
}

#[tokio::test]
async fn test_load_skips_acquisition_when_satisfied() {
    let env = Env::with(MockDriver::new(), MockAssets::new(true));
    let _ = loaded(&env, RunMode::Performance).await;
    assert!(env.assets.acquired.lock().is_empty());
}

#[tokio::test]
async fn test_network_failure_is_retryable() {
    let env = Env::with(
        MockDriver::new(),
        MockAssets::new(false).failing(AcquireFailure::Network),
    );
    let mut orchestrator = env.orchestrator(env.config(RunMode::Performance));

    let err = orchestrator.load(sink(), false).await.unwrap_err();
    assert!(err.is_retryable());
    match orchestrator.state() {
        OrchestrationState::Error(state) => {
            assert_eq!(state.kind, ErrorKind::NetworkUnavailable);
            assert!(state.retryable);
        }
        other => panic!("expected error state, got {other:?}"),
    }

    // connectivity is back
    *env.assets.failure.lock() = None;
    orchestrator.retry().unwrap();
    assert_eq!(orchestrator.state(), OrchestrationState::Loading);
    orchestrator.load(sink(), false).await.unwrap();
    assert_eq!(orchestrator.state(), OrchestrationState::Idle);
}

#[tokio::test]
async fn test_corrupt_download_exits() {
    let env = Env::with(
        MockDriver::new(),
        MockAssets::new(false).failing(AcquireFailure::Corrupt),
    );
    let mut orchestrator = env.orchestrator(env.config(RunMode::Performance));

    assert!(orchestrator.load(sink(), false).await.is_err());
    assert!(orchestrator.state().is_terminal());
    assert!(orchestrator.retry().is_err());
}

#[tokio::test]
async fn test_missing_catalog_exits() {
    let env = Env::new();
    let config = env.config(RunMode::Performance).with_catalog("/nope/tasks.json");
    let mut orchestrator = env.orchestrator(config);

    let err = orchestrator.load(sink(), false).await.unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound(_)));
    assert!(orchestrator.state().is_terminal());
}

#[tokio::test]
async fn test_valid_saved_session_restores_results() {
    let env = Env::new();
    *env.results.session.lock() = Some(saved_session(3, "0.0.1"));
    let mut orchestrator = env.orchestrator(env.config(RunMode::Performance));

    let state = orchestrator.load(sink(), false).await.unwrap();
    assert_eq!(state, OrchestrationState::Results);
    assert_eq!(orchestrator.summary(), 80.0);
    assert_eq!(orchestrator.results().len(), 1);
    assert_eq!(orchestrator.max_summary_score().unwrap(), 250.0);
}

#[tokio::test]
async fn test_restart_ignores_saved_session() {
    let env = Env::new();
    *env.results.session.lock() = Some(saved_session(3, "0.0.1"));
    let mut orchestrator = env.orchestrator(env.config(RunMode::Performance));

    let state = orchestrator.load(sink(), true).await.unwrap();
    assert_eq!(state, OrchestrationState::Idle);
    assert!(orchestrator.results().is_empty());
}

#[tokio::test]
async fn test_stale_saved_session_is_discarded() {
    let env = Env::new();
    *env.results.session.lock() = Some(saved_session(200, "0.0.1"));
    let mut orchestrator = env.orchestrator(env.config(RunMode::Performance));

    let state = orchestrator.load(sink(), false).await.unwrap();
    assert_eq!(state, OrchestrationState::Idle);
    assert!(env.results.session.lock().is_none());
}

// ============================================================================
// Running
// ============================================================================

#[tokio::test]
async fn test_run_to_results() {
    let env = Env::new();
    let mut orchestrator = loaded(&env, RunMode::Performance).await;

    let mut finished = 0;
    let state = orchestrator
        .run_to_completion(|event| {
            if matches!(event, SchedulerEvent::Finished(_)) {
                finished += 1;
            }
        })
        .await
        .unwrap();

    assert_eq!(state, OrchestrationState::Results);
    assert_eq!(finished, 3);
    // singlestream 1000/4 = 250, offline 4
    let expected = (250.0_f64 * 4.0 * 250.0).powf(1.0 / 3.0);
    assert!((orchestrator.summary() - expected).abs() < 1e-6);

    let persisted = env.results.persisted.lock();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].0.len(), 3);
    assert_eq!(persisted[0].1, RunMode::Performance);

    let saved = env.results.session.lock().clone().unwrap();
    assert!((saved.summary_score - expected).abs() < 1e-6);
    assert_eq!(saved.results.len(), 3);
}

#[tokio::test]
async fn test_submission_merges_results() {
    let env = Env::new();
    let mut orchestrator = loaded(&env, RunMode::Submission).await;

    orchestrator.run_to_completion(|_| {}).await.unwrap();

    assert_eq!(env.driver.calls.load(Ordering::SeqCst), 6);
    let results = orchestrator.results();
    assert_eq!(results.len(), 3);
    for record in results {
        assert_eq!(record.mode, RunMode::Submission);
        assert!(record.score.is_some());
        assert_eq!(record.accuracy.as_deref(), Some("71.3%"));
    }
    assert_eq!(env.results.persisted.lock()[0].0.len(), 6);
}

#[tokio::test]
async fn test_missing_groundtruth_enters_error_state() {
    let env = Env::new();
    let mut orchestrator = loaded(&env, RunMode::Submission).await;
    std::fs::remove_file(env.dir.path().join("cache").join("imagenet_val.txt")).unwrap();

    let err = orchestrator.start().unwrap_err();
    assert!(matches!(err, Error::MissingGroundtruth { .. }));
    match orchestrator.state() {
        OrchestrationState::Error(state) => {
            assert_eq!(state.kind, ErrorKind::MissingGroundtruth);
            assert!(!state.retryable);
            assert!(state.detail.contains("Image Classification"));
        }
        other => panic!("expected error state, got {other:?}"),
    }

    orchestrator.dismiss().unwrap();
    assert_eq!(orchestrator.state(), OrchestrationState::Idle);
}

#[tokio::test]
async fn test_cancel_returns_to_idle_without_history() {
    let env = Env::with(
        MockDriver::new().with_delay(Duration::from_millis(50)),
        MockAssets::new(true),
    );
    let mut orchestrator = loaded(&env, RunMode::Performance).await;

    orchestrator.start().unwrap();
    assert_eq!(orchestrator.state(), OrchestrationState::Running);
    while let Some(event) = orchestrator.next_event().await {
        if matches!(event, SchedulerEvent::Started { .. }) {
            break;
        }
    }
    orchestrator.cancel().await.unwrap();

    assert_eq!(orchestrator.state(), OrchestrationState::Idle);
    assert_eq!(env.driver.calls.load(Ordering::SeqCst), 1);
    assert!(env.results.persisted.lock().is_empty());
    assert!(env.results.session.lock().is_none());
    assert!(orchestrator.results().is_empty());
}

#[tokio::test]
async fn test_run_again_from_results() {
    let env = Env::with(MockDriver::new(), MockAssets::new(true));
    let mut orchestrator = loaded(&env, RunMode::PerformanceLite).await;

    orchestrator.run_to_completion(|_| {}).await.unwrap();
    assert_eq!(orchestrator.state(), OrchestrationState::Results);

    orchestrator.run_to_completion(|_| {}).await.unwrap();
    assert_eq!(orchestrator.state(), OrchestrationState::Results);
    assert_eq!(env.driver.calls.load(Ordering::SeqCst), 6);
    assert_eq!(env.results.persisted.lock().len(), 2);
}

#[tokio::test]
async fn test_start_rejected_while_loading() {
    let env = Env::new();
    let mut orchestrator = env.orchestrator(env.config(RunMode::Performance));

    assert!(matches!(
        orchestrator.start(),
        Err(Error::InvalidState { .. })
    ));
    assert_eq!(orchestrator.state(), OrchestrationState::Loading);
}

#[tokio::test]
async fn test_exit_is_terminal() {
    let env = Env::with(MockDriver::new(), MockAssets::new(true));
    let mut orchestrator = loaded(&env, RunMode::Performance).await;
    let mut states = orchestrator.subscribe();

    orchestrator.exit("user quit");
    assert!(states.has_changed().unwrap());
    assert_eq!(
        *states.borrow_and_update(),
        OrchestrationState::Exiting {
            reason: "user quit".into()
        }
    );
    assert!(orchestrator.start().is_err());
    assert!(orchestrator.dismiss().is_err());
}

#[test]
fn test_builder_requires_components() {
    let err = OrchestratorBuilder::new().build().unwrap_err();
    assert!(err.to_string().contains("settings"));
}

#[test]
fn test_builder_rejects_backend_mismatch() {
    let err = OrchestratorBuilder::new()
        .config(SessionConfig::new("qti"))
        .settings(Arc::new(store(&ALL)))
        .driver(Arc::new(MockDriver::new()))
        .assets(Arc::new(MockAssets::new(true)))
        .results_store(Arc::new(MemoryResults::default()))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}
