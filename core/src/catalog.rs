//! Task catalog: the declared set of benchmarks
//!
//! The catalog is a JSON document listing tasks, each with its datasets and
//! one or more models. A model's id is the benchmark id used everywhere else.
//!
//! [`Catalog`] is the parsed, immutable document. [`TaskCatalog`] owns the
//! configured source path and loads the document lazily, re-resolving after
//! the path changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::run::{DatasetVariant, RunMode};

/// Kind of dataset, which decides how the driver reads it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetType {
    /// ImageNet classification
    Imagenet,
    /// COCO detection
    Coco,
    /// SQuAD question answering
    Squad,
    /// ADE20K segmentation
    Ade20k,
    /// SNU super resolution
    SnuSr,
}

/// Load generation scenario of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scenario {
    /// One query at a time; score is queries per second derived from latency
    #[default]
    SingleStream,
    /// Batched throughput; the driver reports the score directly
    Offline,
}

impl Scenario {
    /// Driver flag value
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::SingleStream => "SingleStream",
            Scenario::Offline => "Offline",
        }
    }
}

/// A dataset reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Dataset kind
    #[serde(rename = "type")]
    pub kind: DatasetType,
    /// Primary path: remote URL, local path or zip archive
    pub path: String,
    /// Groundtruth file, required for accuracy measurements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groundtruth_src: Option<String>,
}

/// A model belonging to a task; its id is the benchmark id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Benchmark id, unique across the catalog
    pub id: String,
    /// Display name
    pub name: String,
    /// Load generation scenario
    #[serde(default)]
    pub scenario: Scenario,
    /// Batch size declared by the catalog
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Best achievable score, used for the theoretical-max comparator
    #[serde(default)]
    pub max_score: f64,
    /// Dataset label offset
    #[serde(default)]
    pub offset: i32,
    /// Number of output classes
    #[serde(default)]
    pub num_classes: u32,
    /// Input image width
    #[serde(default)]
    pub image_width: u32,
    /// Input image height
    #[serde(default)]
    pub image_height: u32,
}

fn default_batch_size() -> u32 {
    1
}

/// A task groups models sharing the same datasets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Task id
    pub id: String,
    /// Display name
    pub name: String,
    /// Minimum number of queries per run
    pub min_query_count: u64,
    /// Minimum run duration in milliseconds
    pub min_duration_ms: u64,
    /// Full dataset
    pub dataset: DatasetDescriptor,
    /// Reduced dataset for performance-lite runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lite_dataset: Option<DatasetDescriptor>,
    /// Tiny dataset for testing runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_dataset: Option<DatasetDescriptor>,
    /// Models of this task
    pub models: Vec<ModelDescriptor>,
}

impl TaskDescriptor {
    /// Dataset variant used for a run in `mode`.
    ///
    /// Returns `None` when the mode needs a variant the task does not declare.
    pub fn dataset_for(&self, mode: RunMode) -> Option<(DatasetVariant, &DatasetDescriptor)> {
        match mode {
            RunMode::Testing => self
                .test_dataset
                .as_ref()
                .map(|dataset| (DatasetVariant::Test, dataset)),
            RunMode::PerformanceLite => Some(match &self.lite_dataset {
                Some(lite) => (DatasetVariant::Lite, lite),
                None => (DatasetVariant::Full, &self.dataset),
            }),
            RunMode::Performance | RunMode::Accuracy | RunMode::Submission => {
                Some((DatasetVariant::Full, &self.dataset))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    tasks: Vec<TaskDescriptor>,
}

/// One catalog entry: a model and the task it belongs to
#[derive(Debug, Clone, Copy)]
pub struct Benchmark<'a> {
    /// Owning task
    pub task: &'a TaskDescriptor,
    /// The model
    pub model: &'a ModelDescriptor,
}

impl Benchmark<'_> {
    /// Benchmark id
    pub fn id(&self) -> &str {
        &self.model.id
    }
}

/// Parsed task catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    tasks: Vec<TaskDescriptor>,
    /// benchmark id -> (task index, model index)
    index: HashMap<String, (usize, usize)>,
}

impl Catalog {
    /// Build a catalog from tasks, rejecting duplicate benchmark ids
    pub fn new(tasks: Vec<TaskDescriptor>) -> Result<Self> {
        let mut index = HashMap::new();
        for (task_idx, task) in tasks.iter().enumerate() {
            for (model_idx, model) in task.models.iter().enumerate() {
                if index
                    .insert(model.id.clone(), (task_idx, model_idx))
                    .is_some()
                {
                    return Err(Error::MalformedInput(format!(
                        "duplicate benchmark id in catalog: {}",
                        model.id
                    )));
                }
            }
        }
        Ok(Self { tasks, index })
    }

    /// Parse a catalog document
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedInput(format!("task catalog: {e}")))?;
        Self::new(document.tasks)
    }

    /// Read and parse a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Tasks in declaration order
    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    /// Look up a benchmark
    pub fn resolve(&self, benchmark_id: &str) -> Result<(&TaskDescriptor, &ModelDescriptor)> {
        let (task_idx, model_idx) = self
            .index
            .get(benchmark_id)
            .copied()
            .ok_or_else(|| Error::benchmark_not_found(benchmark_id))?;
        let task = &self.tasks[task_idx];
        Ok((task, &task.models[model_idx]))
    }

    /// Every benchmark, in declaration order
    pub fn all_benchmarks(&self) -> Vec<Benchmark<'_>> {
        self.tasks
            .iter()
            .flat_map(|task| task.models.iter().map(move |model| Benchmark { task, model }))
            .collect()
    }

    /// Task index of a benchmark
    pub fn order_of(&self, benchmark_id: &str) -> Option<usize> {
        self.index.get(benchmark_id).map(|(task_idx, _)| *task_idx)
    }

    /// Position of a benchmark in [`Catalog::all_benchmarks`]
    pub fn position_of(&self, benchmark_id: &str) -> Option<usize> {
        let (task_idx, model_idx) = self.index.get(benchmark_id).copied()?;
        let preceding: usize = self.tasks[..task_idx].iter().map(|t| t.models.len()).sum();
        Some(preceding + model_idx)
    }

    /// Rounded geometric mean of the max scores of `ids`.
    ///
    /// Unknown ids are ignored; returns 0 when nothing matches.
    pub fn max_summary_score<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> f64 {
        let mut product = 1.0_f64;
        let mut count = 0usize;
        for id in ids {
            if let Ok((_, model)) = self.resolve(id) {
                product *= model.max_score;
                count += 1;
            }
        }
        if count == 0 {
            return 0.0;
        }
        product.powf(1.0 / count as f64).round()
    }
}

/// Pick the catalog path: explicit override, then a side-loaded local file
/// if it exists, then the default location.
pub fn resolve_catalog_path(
    override_path: Option<&str>,
    local_path: Option<&Path>,
    default_path: &str,
) -> String {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        return path.to_string();
    }
    if let Some(local) = local_path.filter(|p| p.is_file()) {
        return local.display().to_string();
    }
    default_path.to_string()
}

/// Lazily loaded catalog bound to a configurable path
pub struct TaskCatalog {
    path: RwLock<PathBuf>,
    cached: RwLock<Option<Arc<Catalog>>>,
}

impl TaskCatalog {
    /// Create a catalog that loads from `path` on first use
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: RwLock::new(path.into()),
            cached: RwLock::new(None),
        }
    }

    /// Create a catalog around an already parsed document
    pub fn preloaded(catalog: Catalog) -> Self {
        Self {
            path: RwLock::new(PathBuf::new()),
            cached: RwLock::new(Some(Arc::new(catalog))),
        }
    }

    /// Current source path
    pub fn path(&self) -> PathBuf {
        self.path.read().clone()
    }

    /// Change the source path; the next [`TaskCatalog::get`] reloads
    pub fn set_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut current = self.path.write();
        if *current != path {
            tracing::debug!(path = %path.display(), "Task catalog path changed");
            *current = path;
            *self.cached.write() = None;
        }
    }

    /// Drop the cached document
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    /// The parsed catalog, loading it if needed
    pub fn get(&self) -> Result<Arc<Catalog>> {
        if let Some(catalog) = self.cached.read().as_ref() {
            return Ok(Arc::clone(catalog));
        }

        let path = self.path();
        let mut cached = self.cached.write();
        if let Some(catalog) = cached.as_ref() {
            return Ok(Arc::clone(catalog));
        }
        let catalog = Arc::new(Catalog::load(&path)?);
        tracing::info!(
            path = %path.display(),
            tasks = catalog.tasks().len(),
            "Loaded task catalog"
        );
        *cached = Some(Arc::clone(&catalog));
        Ok(catalog)
    }
}

impl std::fmt::Debug for TaskCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCatalog")
            .field("path", &*self.path.read())
            .field("loaded", &self.cached.read().is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const CATALOG_JSON: &str = r#"{
        "tasks": [
            {
                "id": "image_classification",
                "name": "Image Classification",
                "min_query_count": 1024,
                "min_duration_ms": 60000,
                "dataset": {
                    "type": "IMAGENET",
                    "path": "https://example.com/imagenet.zip",
                    "groundtruth_src": "https://example.com/imagenet_val.txt"
                },
                "lite_dataset": {
                    "type": "IMAGENET",
                    "path": "https://example.com/imagenet_lite.zip"
                },
                "test_dataset": {
                    "type": "IMAGENET",
                    "path": "https://example.com/imagenet_test.zip"
                },
                "models": [
                    {
                        "id": "IC_tpu_uint8",
                        "name": "MobileNetEdgeTPU",
                        "max_score": 1000.0,
                        "offset": 1,
                        "num_classes": 1000,
                        "image_width": 224,
                        "image_height": 224
                    },
                    {
                        "id": "IC_tpu_uint8_offline",
                        "name": "MobileNetEdgeTPU Offline",
                        "scenario": "Offline",
                        "batch_size": 32,
                        "max_score": 4000.0
                    }
                ]
            },
            {
                "id": "object_detection",
                "name": "Object Detection",
                "min_query_count": 1024,
                "min_duration_ms": 60000,
                "dataset": {
                    "type": "COCO",
                    "path": "https://example.com/coco.zip",
                    "groundtruth_src": "https://example.com/coco_val.pbtxt"
                },
                "models": [
                    {
                        "id": "OD_uint8",
                        "name": "MobileDET-SSD",
                        "max_score": 250.0,
                        "num_classes": 91,
                        "image_width": 320,
                        "image_height": 320
                    }
                ]
            }
        ]
    }"#;

    pub fn catalog() -> Catalog {
        Catalog::from_slice(CATALOG_JSON.as_bytes()).unwrap()
    }
}
