//! External inference driver adapters for mlbench
//!
//! This crate provides implementations of the `InferenceDriver` trait:
//!
//! - [`ProcessDriver`]: launches the benchmark binary once per run and
//!   reads its measurements back

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod args;
pub mod config;
pub mod process;

pub use args::{build_args, dataset_arg};
pub use config::{ConfigValidationError, DriverConfig};
pub use process::{parse_output, read_output, ProcessDriver};
