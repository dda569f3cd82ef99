//! Turning a catalog, settings and a run mode into an ordered plan

use std::collections::HashSet;
use std::path::Path;

use crate::catalog::{Benchmark, Catalog};
use crate::error::{Error, Result};
use crate::paths;
use crate::run::{RunDescriptor, RunMode};
use crate::settings::SettingsSnapshot;

/// Which catalog benchmarks take part in a session; all by default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BenchmarkSelection {
    disabled: HashSet<String>,
}

impl BenchmarkSelection {
    /// Every benchmark enabled
    pub fn all() -> Self {
        Self::default()
    }

    /// Exclude a benchmark
    pub fn disable(mut self, benchmark_id: impl Into<String>) -> Self {
        self.disabled.insert(benchmark_id.into());
        self
    }

    /// Whether the benchmark takes part
    pub fn is_enabled(&self, benchmark_id: &str) -> bool {
        !self.disabled.contains(benchmark_id)
    }
}

/// Where plan outputs go
#[derive(Debug, Clone, Copy)]
pub struct PlanDirs<'a> {
    /// Results directory; driver logs go below it
    pub results_dir: &'a Path,
    /// Asset cache root
    pub cache_root: &'a Path,
}

/// Build the ordered run plan for `mode`.
///
/// Submission plans list every performance run first, then every accuracy
/// run, each in catalog order. Output directories are created.
pub fn plan(
    mode: RunMode,
    catalog: &Catalog,
    settings: &SettingsSnapshot,
    selection: &BenchmarkSelection,
    dirs: PlanDirs<'_>,
) -> Result<Vec<RunDescriptor>> {
    let benchmarks: Vec<Benchmark<'_>> = catalog
        .all_benchmarks()
        .into_iter()
        .filter(|b| selection.is_enabled(b.id()) && settings.has_benchmark(b.id()))
        .collect();

    if mode == RunMode::Submission {
        for benchmark in &benchmarks {
            check_groundtruth(benchmark, dirs.cache_root)?;
        }
    }

    let mut descriptors = Vec::new();
    for &pass in mode.passes() {
        let dataset_mode = mode.dataset_mode(pass);
        for benchmark in &benchmarks {
            let Some((variant, dataset)) = benchmark.task.dataset_for(dataset_mode) else {
                tracing::warn!(
                    benchmark_id = benchmark.id(),
                    mode = %mode,
                    "No dataset for mode, skipping benchmark"
                );
                continue;
            };

            let output_dir = dirs
                .results_dir
                .join(pass.log_dir_name())
                .join(benchmark.id());
            std::fs::create_dir_all(&output_dir)?;

            descriptors.push(RunDescriptor {
                benchmark_id: benchmark.id().to_string(),
                mode: pass,
                dataset_variant: variant,
                dataset: dataset.clone(),
                output_dir,
                batch_size: batch_size(benchmark, settings),
                sequence: descriptors.len(),
            });
        }
    }

    tracing::info!(
        mode = %mode,
        benchmarks = benchmarks.len(),
        runs = descriptors.len(),
        "Planned session"
    );
    Ok(descriptors)
}

fn check_groundtruth(benchmark: &Benchmark<'_>, cache_root: &Path) -> Result<()> {
    let readable = benchmark
        .task
        .dataset
        .groundtruth_src
        .as_deref()
        .map(|src| paths::is_readable(&paths::local_path(src, cache_root)))
        .unwrap_or(false);
    if readable {
        Ok(())
    } else {
        Err(Error::MissingGroundtruth {
            task: benchmark.task.name.clone(),
        })
    }
}

fn batch_size(benchmark: &Benchmark<'_>, settings: &SettingsSnapshot) -> u32 {
    let configured = settings.benchmark(benchmark.id()).and_then(|s| s.batch_size);
    match configured {
        Some(size) if size > 0 => u32::try_from(size).unwrap_or(u32::MAX),
        Some(size) => {
            tracing::warn!(
                benchmark_id = benchmark.id(),
                batch_size = size,
                "Invalid batch size, falling back to 1"
            );
            1
        }
        None => {
            tracing::warn!(
                benchmark_id = benchmark.id(),
                "No batch size configured, falling back to 1"
            );
            1
        }
    }
}
