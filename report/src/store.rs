//! File-backed [`ResultsStore`]

use std::path::{Path, PathBuf};

use mlbench_core::paths::write_atomic;
use mlbench_core::traits::ResultsStore;
use mlbench_core::{Error, ResultRecord, Result, RunMode, SavedSession};

use crate::results::render_results;

/// Writes `results.json` and keeps the last completed session as JSON
#[derive(Debug, Clone)]
pub struct JsonResultsStore {
    results_file: PathBuf,
    session_file: PathBuf,
}

impl JsonResultsStore {
    /// Create a store writing to the given files
    pub fn new(results_file: impl Into<PathBuf>, session_file: impl Into<PathBuf>) -> Self {
        Self {
            results_file: results_file.into(),
            session_file: session_file.into(),
        }
    }

    /// Path of the results file
    pub fn results_file(&self) -> &Path {
        &self.results_file
    }

    /// Path of the saved session
    pub fn session_file(&self) -> &Path {
        &self.session_file
    }
}

impl ResultsStore for JsonResultsStore {
    fn persist(&self, results: &[ResultRecord], mode: RunMode) -> Result<()> {
        let text = render_results(results, mode)?;
        write_atomic(&self.results_file, text.as_bytes())?;
        tracing::info!(
            path = %self.results_file.display(),
            results = results.len(),
            mode = %mode,
            "Results file written"
        );
        Ok(())
    }

    fn save_session(&self, session: &SavedSession) -> Result<()> {
        let text = serde_json::to_string_pretty(session)
            .map_err(|e| Error::MalformedInput(format!("session: {e}")))?;
        write_atomic(&self.session_file, text.as_bytes())?;
        tracing::debug!(path = %self.session_file.display(), "Session saved");
        Ok(())
    }

    fn load_session(&self) -> Result<Option<SavedSession>> {
        let text = match std::fs::read_to_string(&self.session_file) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // unreadable history is dropped, never fatal
                tracing::warn!(path = %self.session_file.display(), error = %e, "Ignoring corrupt saved session");
                Ok(None)
            }
        }
    }

    fn clear_session(&self) -> Result<()> {
        match std::fs::remove_file(&self.session_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
