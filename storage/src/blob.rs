//! File-backed blob storage for backend settings

use std::path::{Path, PathBuf};

use mlbench_core::paths::write_atomic;
use mlbench_core::traits::BlobStore;
use mlbench_core::{Error, Result};

/// Stores each blob as a file named after its key
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(Error::MalformedInput(format!("invalid blob key: {key:?}")));
        }
        Ok(self.dir.join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        write_atomic(&path, value.as_bytes())?;
        tracing::debug!(key, path = %path.display(), bytes = value.len(), "Blob written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlbench_core::{SettingsSnapshot, SettingsStore};
    use std::sync::Arc;

    const SETTINGS: &str = r#"{
        "common_settings": [
            {
                "id": "cooldown",
                "name": "Cooldown",
                "value": {"value": "0", "name": "Off"},
                "acceptable_values": [
                    {"value": "0", "name": "Off"},
                    {"value": "1", "name": "On"}
                ]
            }
        ],
        "benchmark_settings": [
            {
                "benchmark_id": "IC_tpu_uint8",
                "accelerator": "gpu",
                "accelerator_desc": "GPU",
                "configuration": "TFLite GPU",
                "src": "https://example.com/models/IC_tpu_uint8.tflite"
            }
        ]
    }"#;

    #[test]
    fn test_missing_blob_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("settings"));
        assert_eq!(store.read("tflite_backend_settings").unwrap(), None);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("settings"));

        store.write("tflite_backend_settings", "abc").unwrap();
        store.write("tflite_backend_settings", "xyz").unwrap();

        assert_eq!(
            store.read("tflite_backend_settings").unwrap().as_deref(),
            Some("xyz")
        );
    }

    #[test]
    fn test_keys_cannot_escape_directory() {
        let store = FsBlobStore::new("/tmp/settings");
        assert!(store.read("../passwd").is_err());
        assert!(store.write("", "x").is_err());
        assert!(store.write("a/b", "x").is_err());
    }

    #[test]
    fn test_settings_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = SettingsSnapshot::from_slice(SETTINGS.as_bytes()).unwrap();

        let first = SettingsStore::new(
            Arc::new(FsBlobStore::new(dir.path())),
            "tflite",
            defaults.clone(),
        );
        first.set_common_value("cooldown", "1").unwrap();

        let second = SettingsStore::new(Arc::new(FsBlobStore::new(dir.path())), "tflite", defaults);
        assert!(second.common_flag("cooldown").unwrap());
        assert!(dir.path().join("tflite_backend_settings").exists());
    }
}
