//! Inference driver backed by an external benchmark binary

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use mlbench_core::traits::{DriverError, DriverOutput, DriverRequest, InferenceDriver};

use crate::args::build_args;
use crate::config::{ConfigValidationError, DriverConfig};

/// File the driver writes its measurements to, inside the output directory
pub const RESULTS_FILE: &str = "driver_results.json";

/// File the backend settings are handed over in
pub const SETTINGS_FILE: &str = "backend_settings.json";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_TAIL_LINES: usize = 20;

/// Runs each benchmark as a child process
///
/// The binary receives the run description as flags and writes a JSON
/// object with `latency_ms`, `accuracy`, `num_samples` and `duration_ms`
/// to `--results_file`.
#[derive(Debug, Clone)]
pub struct ProcessDriver {
    config: DriverConfig,
    runtime: String,
}

impl ProcessDriver {
    /// Create a driver, reporting `backend` as the runtime unless the
    /// config names one.
    pub fn new(config: DriverConfig, backend: &str) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        let runtime = config
            .runtime
            .clone()
            .unwrap_or_else(|| backend.to_string());
        Ok(Self { config, runtime })
    }

    /// Driver configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn write_settings(&self, request: &DriverRequest) -> Result<PathBuf, DriverError> {
        let path = request.output_dir.join(SETTINGS_FILE);
        let json = serde_json::to_vec_pretty(&request.settings)
            .map_err(|e| DriverError::Launch(format!("settings: {e}")))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    fn wait(&self, child: &mut std::process::Child) -> Result<Option<i32>, DriverError> {
        let Some(timeout) = self.config.timeout() else {
            return Ok(child.wait()?.code());
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status.code());
            }
            if started.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DriverError::Failed {
                    code: None,
                    message: format!("timed out after {}s", timeout.as_secs()),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl InferenceDriver for ProcessDriver {
    fn name(&self) -> &str {
        &self.runtime
    }

    fn run(&self, request: &DriverRequest) -> Result<DriverOutput, DriverError> {
        std::fs::create_dir_all(&request.output_dir)?;
        let settings_file = self.write_settings(request)?;
        let results_file = request.output_dir.join(RESULTS_FILE);
        if results_file.exists() {
            std::fs::remove_file(&results_file)?;
        }

        let args = build_args(
            request,
            self.config.lib_path.as_deref(),
            &settings_file,
            &results_file,
        );
        tracing::debug!(
            benchmark_id = %request.benchmark_id,
            program = %self.config.program.display(),
            args = ?args,
            "Launching driver"
        );

        let stderr_path = request.output_dir.join("driver_stderr.log");
        let stderr = std::fs::File::create(&stderr_path)?;
        let mut child = Command::new(&self.config.program)
            .args(&self.config.prefix_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|e| {
                DriverError::Launch(format!("{}: {e}", self.config.program.display()))
            })?;

        let code = self.wait(&mut child)?;
        if code != Some(0) {
            return Err(DriverError::Failed {
                code,
                message: stderr_tail(&stderr_path),
            });
        }

        let output = read_output(&results_file)?;
        tracing::debug!(
            benchmark_id = %request.benchmark_id,
            latency_ms = output.latency_ms,
            num_samples = output.num_samples,
            "Driver finished"
        );
        Ok(output)
    }
}

/// Last lines of the driver's error output
fn stderr_tail(path: &Path) -> String {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Read and check the measurements the driver wrote
pub fn read_output(path: &Path) -> Result<DriverOutput, DriverError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| DriverError::InvalidOutput(format!("{}: {e}", path.display())))?;
    parse_output(&text)
}

/// Parse the driver's measurement JSON
pub fn parse_output(text: &str) -> Result<DriverOutput, DriverError> {
    let output: DriverOutput =
        serde_json::from_str(text).map_err(|e| DriverError::InvalidOutput(e.to_string()))?;
    if !output.latency_ms.is_finite() || !output.duration_ms.is_finite() {
        return Err(DriverError::InvalidOutput(
            "non-finite measurement".to_string(),
        ));
    }
    Ok(output)
}
