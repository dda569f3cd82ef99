//! mlbench-core: Core engine for on-device ML inference benchmarking
//!
//! This crate holds everything a benchmarking session needs apart from the
//! concrete I/O backends:
//!
//! - Task catalog and backend settings
//! - Asset requirements and path normalization
//! - Benchmark scheduling, cooldown and cancellation
//! - Result aggregation and the summary score
//! - The orchestration state machine
//! - Seams (traits) for drivers, asset providers and persistence

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assets;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod paths;
pub mod result;
pub mod run;
pub mod scheduler;
pub mod settings;
pub mod traits;

pub use assets::{requirements_for, AssetKind, AssetRequirement};
pub use catalog::{
    Benchmark, Catalog, DatasetDescriptor, DatasetType, ModelDescriptor, Scenario,
    TaskCatalog, TaskDescriptor,
};
pub use channel::ChannelConfig;
pub use config::{ConfigError, SessionConfig};
pub use error::*;
pub use metrics::{merge_for_display, AggregateProgress, ResultAggregator};
pub use orchestrator::{
    DeviceInfo, OrchestrationState, Orchestrator, OrchestratorBuilder, StateError,
};
pub use result::{ResultRecord, SavedSession, NOT_AVAILABLE};
pub use run::{DatasetVariant, DriverMode, RunDescriptor, RunMode};
pub use scheduler::{
    BenchmarkSelection, Canceller, Scheduler, SchedulerBuilder, SchedulerEvent, SchedulerHandle,
};
pub use settings::{
    BenchmarkSetting, CommonSetting, MemoryBlobStore, SettingList, SettingValue,
    SettingsSnapshot, SettingsStore,
};
pub use traits::*;
