//! Asset acquisition and settings persistence for mlbench
//!
//! This crate provides the on-disk side of a session:
//!
//! - [`AssetManager`]: downloads models and datasets into the cache and
//!   extracts zip archives
//! - [`HttpFetcher`]: reqwest-backed remote fetching
//! - [`FsBlobStore`]: file-backed storage for backend settings blobs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod extract;
pub mod fetch;
pub mod manager;

pub use blob::FsBlobStore;
pub use extract::extract_zip;
pub use fetch::{Fetcher, HttpConfig, HttpFetcher};
pub use manager::AssetManager;
