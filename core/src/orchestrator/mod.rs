//! Orchestrator for session lifecycle management
//!
//! The Orchestrator is the single control path of a benchmarking session:
//! - Checking the device and acquiring assets before anything runs
//! - Starting the scheduler and applying its events
//! - Persisting completed sessions and restoring them on the next start
//! - Parking recoverable failures in an error state
//!
//! # Example
//!
//! ```ignore
//! use mlbench_core::OrchestratorBuilder;
//!
//! let mut orchestrator = OrchestratorBuilder::new()
//!     .config(config)
//!     .settings(settings)
//!     .driver(driver)
//!     .assets(assets)
//!     .results_store(results)
//!     .build()?;
//!
//! orchestrator.check_device(&device)?;
//! orchestrator.load(sink, false).await?;
//! orchestrator.run_to_completion(|event| println!("{event:?}")).await?;
//! ```

mod builder;
mod executor;
mod state;

pub use builder::OrchestratorBuilder;
pub use executor::{OrchestrationContext, Orchestrator};
pub use state::{DeviceInfo, OrchestrationState, StateError};

#[cfg(test)]
mod tests;
