//! Command-line arguments of the external driver binary
//!
//! The driver takes the backend and dataset as positional arguments,
//! followed by `--name=value` flags: the load generator settings first,
//! then the backend flags, then the dataset-specific flags.

use std::path::Path;

use mlbench_core::{DatasetType, DriverRequest};

/// Positional dataset argument
pub fn dataset_arg(kind: DatasetType) -> &'static str {
    match kind {
        DatasetType::Imagenet => "imagenet",
        DatasetType::Coco => "coco",
        DatasetType::Squad => "squad",
        DatasetType::Ade20k => "ade20k",
        DatasetType::SnuSr => "snusr",
    }
}

fn flag(name: &str, value: impl std::fmt::Display) -> String {
    format!("--{name}={value}")
}

/// Build the driver arguments for `request`.
pub fn build_args(
    request: &DriverRequest,
    lib_path: Option<&Path>,
    settings_file: &Path,
    results_file: &Path,
) -> Vec<String> {
    let mut args = vec![
        request.backend.clone(),
        dataset_arg(request.dataset_type).to_string(),
        flag("mode", request.mode.as_str()),
        flag("min_query_count", request.min_query_count),
        flag("min_duration", request.min_duration_ms),
        flag(
            "single_stream_expected_latency_ns",
            request.single_stream_expected_latency_ns,
        ),
        flag("output_dir", request.output_dir.display()),
        flag("results_file", results_file.display()),
        flag("model_file", request.model_path.display()),
        flag("settings_file", settings_file.display()),
        flag("scenario", request.scenario.as_str()),
        flag("batch_size", request.batch_size),
    ];
    if let Some(lib) = lib_path {
        args.push(flag("lib_path", lib.display()));
    }

    let dataset = request.dataset_path.display();
    let groundtruth = request
        .groundtruth_path
        .as_ref()
        .map(|p| p.display().to_string());

    match request.dataset_type {
        DatasetType::Imagenet | DatasetType::Coco => {
            args.push(flag("images_directory", &dataset));
            args.push(flag("offset", request.offset));
            if request.dataset_type == DatasetType::Coco {
                args.push(flag("num_classes", request.num_classes));
            }
            if let Some(gt) = &groundtruth {
                args.push(flag("groundtruth_file", gt));
            }
            args.push(flag("image_width", request.image_width));
            args.push(flag("image_height", request.image_height));
        }
        DatasetType::Squad => {
            args.push(flag("input_file", &dataset));
            if let Some(gt) = &groundtruth {
                args.push(flag("groundtruth_file", gt));
            }
        }
        DatasetType::Ade20k => {
            args.push(flag("images_directory", &dataset));
            if let Some(gt) = &groundtruth {
                args.push(flag("ground_truth_directory", gt));
            }
            args.push(flag("num_class", request.num_classes));
            args.push(flag("image_width", request.image_width));
            args.push(flag("image_height", request.image_height));
        }
        DatasetType::SnuSr => {
            args.push(flag("images_directory", &dataset));
            if let Some(gt) = &groundtruth {
                args.push(flag("ground_truth_directory", gt));
            }
            args.push(flag("image_width", request.image_width));
            args.push(flag("image_height", request.image_height));
        }
    }
    args
}

#[cfg(test)]
pub(crate) mod fixtures {
    use mlbench_core::{
        BenchmarkSetting, DatasetType, DriverMode, DriverRequest, Scenario, SettingList,
    };
    use std::path::{Path, PathBuf};

    pub fn request(kind: DatasetType, output_dir: &Path) -> DriverRequest {
        DriverRequest {
            benchmark_id: "IC_tpu_uint8".into(),
            backend: "tflite".into(),
            model_path: PathBuf::from("/cache/IC_tpu_uint8.tflite"),
            settings: SettingList {
                settings: Vec::new(),
                benchmark_setting: BenchmarkSetting {
                    benchmark_id: "IC_tpu_uint8".into(),
                    backend: "tflite".into(),
                    accelerator: "gpu".into(),
                    accelerator_desc: "GPU".into(),
                    configuration: "TFLite GPU".into(),
                    src: "https://example.com/models/IC_tpu_uint8.tflite".into(),
                    batch_size: None,
                    single_stream_expected_latency_ns: 0,
                },
            },
            dataset_type: kind,
            dataset_path: PathBuf::from("/cache/imagenet"),
            groundtruth_path: Some(PathBuf::from("/cache/imagenet_val.txt")),
            offset: 1,
            num_classes: 1000,
            image_width: 224,
            image_height: 224,
            scenario: Scenario::SingleStream,
            batch_size: 1,
            mode: DriverMode::PerformanceOnly,
            min_query_count: 1024,
            min_duration_ms: 60_000,
            single_stream_expected_latency_ns: 1_000_000,
            output_dir: output_dir.to_path_buf(),
        }
    }
}
