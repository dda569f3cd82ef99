//! Results file and session history persistence for mlbench
//!
//! This crate provides:
//!
//! - `results.json` rendering for external submission tooling
//! - [`JsonResultsStore`], the file-backed `ResultsStore`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod results;
pub mod store;

pub use results::{read_results, render_results, Configuration, ResultEntry};
pub use store::JsonResultsStore;
