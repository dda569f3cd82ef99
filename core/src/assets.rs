//! Asset requirements of a session
//!
//! Every benchmark that will run needs its model file and the dataset the
//! run mode selects. Accuracy-producing modes also need the groundtruth.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::paths;
use crate::run::RunMode;
use crate::scheduler::BenchmarkSelection;
use crate::settings::SettingsSnapshot;

/// How an asset lands on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// A single file
    File,
    /// A zip archive extracted into a directory
    ZipArchive,
}

/// A file or directory that must exist locally before benchmarks run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRequirement {
    /// Source path
    pub path: String,
    /// Expected size in bytes, 0 if unknown
    pub expected_size: u64,
    /// File or archive
    pub kind: AssetKind,
    /// An existing but empty directory counts as absent
    pub must_be_populated: bool,
}

impl AssetRequirement {
    /// Requirement for `path`, with the kind derived from its extension
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let kind = if paths::is_zip(&path) {
            AssetKind::ZipArchive
        } else {
            AssetKind::File
        };
        Self {
            path,
            expected_size: 0,
            kind,
            must_be_populated: false,
        }
    }

    /// Set the expected size
    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = size;
        self
    }

    /// Require a non-empty directory
    pub fn populated(mut self) -> Self {
        self.must_be_populated = true;
        self
    }
}

/// Assets needed to run `mode` over the selected benchmarks
///
/// Benchmarks without a backend setting are skipped. Duplicates (shared
/// datasets) are listed once, in first-seen order.
pub fn requirements_for(
    mode: RunMode,
    catalog: &Catalog,
    settings: &SettingsSnapshot,
    selection: &BenchmarkSelection,
) -> Vec<AssetRequirement> {
    let mut seen = HashSet::new();
    let mut requirements = Vec::new();
    let mut push = |requirement: AssetRequirement| {
        if requirement.path.is_empty() {
            return;
        }
        if seen.insert(requirement.path.clone()) {
            requirements.push(requirement);
        }
    };

    for benchmark in catalog.all_benchmarks() {
        let id = benchmark.id();
        if !selection.is_enabled(id) {
            continue;
        }
        let Some(setting) = settings.benchmark(id) else {
            continue;
        };

        push(AssetRequirement::new(&setting.src));

        for &pass in mode.passes() {
            let dataset_mode = mode.dataset_mode(pass);
            let Some((_, dataset)) = benchmark.task.dataset_for(dataset_mode) else {
                continue;
            };
            let mut data = AssetRequirement::new(&dataset.path);
            if dataset_mode == RunMode::Submission {
                data = data.populated();
            }
            push(data);

            if dataset_mode.needs_groundtruth() {
                if let Some(groundtruth) = &dataset.groundtruth_src {
                    push(AssetRequirement::new(groundtruth));
                }
            }
        }
    }

    requirements
}
