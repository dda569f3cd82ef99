//! Backend settings store
//!
//! A [`SettingsSnapshot`] holds the common settings shared by every benchmark
//! plus one [`BenchmarkSetting`] per benchmark. The snapshot is persisted as a
//! base64-encoded JSON blob under `<backend>_backend_settings` in a
//! [`BlobStore`]. Reads are served from a cached `Arc`; writes take the write
//! lock, persist first and only then swap the cache, so a failed write leaves
//! the previous snapshot in place.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::BlobStore;

/// Common setting id controlling the pause between performance runs
pub const COOLDOWN_SETTING: &str = "cooldown";

/// A selectable setting value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingValue {
    /// Machine value
    pub value: String,
    /// Human-readable name
    pub name: String,
}

impl SettingValue {
    /// Create a setting value
    pub fn new(value: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            name: name.into(),
        }
    }
}

/// A setting shared by all benchmarks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonSetting {
    /// Setting id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Current value
    pub value: SettingValue,
    /// Values the setting may take
    #[serde(default)]
    pub acceptable_values: Vec<SettingValue>,
}

impl CommonSetting {
    /// Whether `candidate` matches one of the acceptable values on both fields
    pub fn accepts(&self, candidate: &SettingValue) -> bool {
        self.acceptable_values.iter().any(|v| v == candidate)
    }
}

/// Backend configuration for one benchmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkSetting {
    /// Benchmark id
    pub benchmark_id: String,
    /// Backend identifier
    #[serde(default)]
    pub backend: String,
    /// Accelerator the backend runs on
    #[serde(default)]
    pub accelerator: String,
    /// Human-readable accelerator description
    #[serde(default)]
    pub accelerator_desc: String,
    /// Configuration label
    #[serde(default)]
    pub configuration: String,
    /// Model source path (remote, local or zip)
    pub src: String,
    /// Batch size override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,
    /// Upper bound on single-stream latency, in nanoseconds
    #[serde(default)]
    pub single_stream_expected_latency_ns: u64,
}

/// All settings of one backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Common settings, ordered
    #[serde(default)]
    pub common_settings: Vec<CommonSetting>,
    /// Per-benchmark settings, ordered, unique by benchmark id
    #[serde(default)]
    pub benchmark_settings: Vec<BenchmarkSetting>,
}

impl SettingsSnapshot {
    /// Parse a snapshot from JSON, checking id uniqueness
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let snapshot: SettingsSnapshot = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedInput(format!("settings: {e}")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check that common setting ids and benchmark ids are unique
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for setting in &self.common_settings {
            if !seen.insert(setting.id.as_str()) {
                return Err(Error::MalformedInput(format!(
                    "duplicate common setting: {}",
                    setting.id
                )));
            }
        }
        seen.clear();
        for setting in &self.benchmark_settings {
            if !seen.insert(setting.benchmark_id.as_str()) {
                return Err(Error::MalformedInput(format!(
                    "duplicate benchmark setting: {}",
                    setting.benchmark_id
                )));
            }
        }
        Ok(())
    }

    /// Encode as the persisted blob (base64 of JSON)
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| Error::MalformedInput(format!("settings: {e}")))?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a persisted blob
    pub fn decode(blob: &str) -> Result<Self> {
        let json = STANDARD
            .decode(blob.trim())
            .map_err(|e| Error::MalformedInput(format!("settings blob: {e}")))?;
        Self::from_slice(&json)
    }

    /// Common setting by id
    pub fn common(&self, id: &str) -> Option<&CommonSetting> {
        self.common_settings.iter().find(|s| s.id == id)
    }

    /// Benchmark setting by benchmark id
    pub fn benchmark(&self, benchmark_id: &str) -> Option<&BenchmarkSetting> {
        self.benchmark_settings
            .iter()
            .find(|s| s.benchmark_id == benchmark_id)
    }

    /// Whether the backend has a setting for the benchmark
    pub fn has_benchmark(&self, benchmark_id: &str) -> bool {
        self.benchmark(benchmark_id).is_some()
    }

    /// Whether a common flag setting is enabled (value `"1"`)
    pub fn common_flag(&self, id: &str) -> bool {
        self.common(id).is_some_and(|s| s.value.value == "1")
    }

    /// The bundle handed to the backend for one benchmark
    pub fn setting_list(&self, benchmark_id: &str) -> Result<SettingList> {
        let benchmark = self
            .benchmark(benchmark_id)
            .cloned()
            .ok_or_else(|| Error::benchmark_not_found(benchmark_id))?;
        Ok(SettingList {
            settings: self.common_settings.clone(),
            benchmark_setting: benchmark,
        })
    }

    /// Current common values keyed by id
    pub fn common_values(&self) -> HashMap<&str, &str> {
        self.common_settings
            .iter()
            .map(|s| (s.id.as_str(), s.value.value.as_str()))
            .collect()
    }
}

/// Common settings plus one benchmark's setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingList {
    /// All common settings
    pub settings: Vec<CommonSetting>,
    /// The benchmark's own setting
    pub benchmark_setting: BenchmarkSetting,
}

/// Persisted settings of one backend
pub struct SettingsStore {
    blobs: Arc<dyn BlobStore>,
    backend: String,
    defaults: SettingsSnapshot,
    current: RwLock<Option<Arc<SettingsSnapshot>>>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Create a store for `backend`, seeded with `defaults` on first read
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        backend: impl Into<String>,
        defaults: SettingsSnapshot,
    ) -> Self {
        Self {
            blobs,
            backend: backend.into(),
            defaults,
            current: RwLock::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// Backend id
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Blob key the snapshot is stored under
    pub fn key(&self) -> String {
        format!("{}_backend_settings", self.backend)
    }

    /// The persisted snapshot, seeding defaults on first use
    pub fn get(&self) -> Result<Arc<SettingsSnapshot>> {
        if let Some(snapshot) = self.current.read().as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let _guard = self.write_lock.lock();
        self.load_locked()
    }

    /// Set a common setting to an acceptable value
    pub fn set_common(&self, id: &str, value: SettingValue) -> Result<Arc<SettingsSnapshot>> {
        let _guard = self.write_lock.lock();
        let base = self.load_locked()?;
        let idx = base
            .common_settings
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::setting_not_found(id))?;
        if !base.common_settings[idx].accepts(&value) {
            return Err(Error::UnacceptableValue {
                id: id.to_string(),
                value: value.value,
            });
        }

        let mut next = (*base).clone();
        next.common_settings[idx].value = value;
        tracing::info!(backend = %self.backend, setting = id, "Updated common setting");
        self.commit_locked(next)
    }

    /// Set a common setting by its machine value
    pub fn set_common_value(&self, id: &str, value: &str) -> Result<Arc<SettingsSnapshot>> {
        let snapshot = self.get()?;
        let setting = snapshot
            .common(id)
            .ok_or_else(|| Error::setting_not_found(id))?;
        let candidate = setting
            .acceptable_values
            .iter()
            .find(|v| v.value == value)
            .cloned()
            .ok_or_else(|| Error::UnacceptableValue {
                id: id.to_string(),
                value: value.to_string(),
            })?;
        self.set_common(id, candidate)
    }

    /// Replace the setting of one benchmark
    pub fn set_benchmark(
        &self,
        benchmark_id: &str,
        setting: BenchmarkSetting,
    ) -> Result<Arc<SettingsSnapshot>> {
        if setting.benchmark_id != benchmark_id {
            return Err(Error::MalformedInput(format!(
                "setting for {} cannot replace {}",
                setting.benchmark_id, benchmark_id
            )));
        }

        let _guard = self.write_lock.lock();
        let base = self.load_locked()?;
        let idx = base
            .benchmark_settings
            .iter()
            .position(|s| s.benchmark_id == benchmark_id)
            .ok_or_else(|| Error::benchmark_not_found(benchmark_id))?;

        let mut next = (*base).clone();
        next.benchmark_settings[idx] = setting;
        tracing::info!(backend = %self.backend, benchmark_id, "Updated benchmark setting");
        self.commit_locked(next)
    }

    /// Replace the whole snapshot with an externally supplied JSON document
    pub fn load_from_external_source(&self, bytes: &[u8]) -> Result<Arc<SettingsSnapshot>> {
        let snapshot = SettingsSnapshot::from_slice(bytes)?;
        let _guard = self.write_lock.lock();
        tracing::info!(
            backend = %self.backend,
            common = snapshot.common_settings.len(),
            benchmarks = snapshot.benchmark_settings.len(),
            "Loaded settings from external source"
        );
        self.commit_locked(snapshot)
    }

    /// Like [`SettingsStore::load_from_external_source`], reading a file
    pub fn load_from_file(&self, path: &Path) -> Result<Arc<SettingsSnapshot>> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)?;
        self.load_from_external_source(&bytes)
    }

    /// Common setting by id
    pub fn common(&self, id: &str) -> Result<CommonSetting> {
        self.get()?
            .common(id)
            .cloned()
            .ok_or_else(|| Error::setting_not_found(id))
    }

    /// Benchmark setting by id
    pub fn benchmark(&self, benchmark_id: &str) -> Result<BenchmarkSetting> {
        self.get()?
            .benchmark(benchmark_id)
            .cloned()
            .ok_or_else(|| Error::benchmark_not_found(benchmark_id))
    }

    /// Whether the backend has a setting for the benchmark
    pub fn has_benchmark(&self, benchmark_id: &str) -> Result<bool> {
        Ok(self.get()?.has_benchmark(benchmark_id))
    }

    /// Common settings plus one benchmark's setting
    pub fn setting_list(&self, benchmark_id: &str) -> Result<SettingList> {
        self.get()?.setting_list(benchmark_id)
    }

    /// Whether a common flag is enabled; unknown flags are disabled
    pub fn common_flag(&self, id: &str) -> Result<bool> {
        Ok(self.get()?.common_flag(id))
    }

    fn load_locked(&self) -> Result<Arc<SettingsSnapshot>> {
        if let Some(snapshot) = self.current.read().as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let persisted = match self.blobs.read(&self.key())? {
            Some(blob) => match SettingsSnapshot::decode(&blob) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(
                        backend = %self.backend,
                        error = %e,
                        "Persisted settings are unreadable, reseeding defaults"
                    );
                    None
                }
            },
            None => None,
        };
        let snapshot = match persisted {
            Some(snapshot) => Arc::new(snapshot),
            None => {
                tracing::info!(backend = %self.backend, "Seeding default settings");
                let defaults = Arc::new(self.defaults.clone());
                self.blobs.write(&self.key(), &defaults.encode()?)?;
                defaults
            }
        };
        *self.current.write() = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn commit_locked(&self, next: SettingsSnapshot) -> Result<Arc<SettingsSnapshot>> {
        let blob = next.encode()?;
        self.blobs.write(&self.key(), &blob)?;
        let next = Arc::new(next);
        *self.current.write() = Some(Arc::clone(&next));
        Ok(next)
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("backend", &self.backend)
            .field("loaded", &self.current.read().is_some())
            .finish()
    }
}

/// In-memory [`BlobStore`]
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.blobs.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FailingBlobStore {
        inner: MemoryBlobStore,
        fail_writes: AtomicBool,
    }

    impl BlobStore for FailingBlobStore {
        fn read(&self, key: &str) -> Result<Option<String>> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.inner.write(key, value)
        }
    }

    #[test]
    fn test_get_seeds_and_persists_defaults() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = SettingsStore::new(blobs.clone(), "tflite", snapshot(&["a"]));

        let snapshot = store.get().unwrap();
        assert_eq!(snapshot.benchmark_settings.len(), 1);

        let blob = blobs.read("tflite_backend_settings").unwrap().unwrap();
        assert_eq!(SettingsSnapshot::decode(&blob).unwrap(), *snapshot);
    }

    #[test]
    fn test_get_prefers_persisted_snapshot() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs
            .write("tflite_backend_settings", &snapshot(&["x", "y"]).encode().unwrap())
            .unwrap();

        let store = SettingsStore::new(blobs, "tflite", snapshot(&["a"]));
        let ids: Vec<_> = store
            .get()
            .unwrap()
            .benchmark_settings
            .iter()
            .map(|s| s.benchmark_id.clone())
            .collect();
        assert_eq!(ids, ["x", "y"]);
    }

    #[test]
    fn test_corrupt_persisted_settings_are_reseeded() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs
            .write("tflite_backend_settings", "not a settings blob")
            .unwrap();

        let store = SettingsStore::new(
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            "tflite",
            snapshot(&["a"]),
        );
        let current = store.get().unwrap();
        assert_eq!(current.benchmark_settings.len(), 1);
        assert_eq!(current.benchmark_settings[0].benchmark_id, "a");

        let blob = blobs.read("tflite_backend_settings").unwrap().unwrap();
        assert_eq!(SettingsSnapshot::decode(&blob).unwrap(), *current);
    }

    #[test]
    fn test_set_common_accepts_domain_value() {
        let store = store(&["a"]);
        store
            .set_common(COOLDOWN_SETTING, SettingValue::new("1", "On"))
            .unwrap();
        assert!(store.common_flag(COOLDOWN_SETTING).unwrap());
    }

    #[test]
    fn test_set_common_rejects_value_outside_domain() {
        let store = store(&["a"]);
        let before = store.get().unwrap();

        let err = store
            .set_common(COOLDOWN_SETTING, SettingValue::new("2", "Twice"))
            .unwrap_err();
        assert!(matches!(err, Error::UnacceptableValue { .. }));

        // name must match too
        let err = store
            .set_common(COOLDOWN_SETTING, SettingValue::new("1", "Enabled"))
            .unwrap_err();
        assert!(matches!(err, Error::UnacceptableValue { .. }));

        assert_eq!(*store.get().unwrap(), *before);
    }

    #[test]
    fn test_set_common_unknown_id() {
        let store = store(&["a"]);
        assert!(matches!(
            store.set_common("turbo", SettingValue::new("1", "On")),
            Err(Error::NotFound { kind: "setting", .. })
        ));
    }

    #[test]
    fn test_set_common_value_by_machine_value() {
        let store = store(&["a"]);
        store.set_common_value(COOLDOWN_SETTING, "1").unwrap();
        assert_eq!(store.common(COOLDOWN_SETTING).unwrap().value.name, "On");
        assert!(store.set_common_value(COOLDOWN_SETTING, "7").is_err());
    }

    #[test]
    fn test_set_benchmark_replaces_only_matching_entry() {
        let store = store(&["a", "b", "c"]);
        let mut updated = benchmark_setting("b");
        updated.batch_size = Some(8);
        store.set_benchmark("b", updated.clone()).unwrap();

        let snapshot = store.get().unwrap();
        let ids: Vec<_> = snapshot
            .benchmark_settings
            .iter()
            .map(|s| s.benchmark_id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(snapshot.benchmark("b"), Some(&updated));
        assert_eq!(snapshot.benchmark("a"), Some(&benchmark_setting("a")));
    }

    #[test]
    fn test_set_benchmark_unknown_id() {
        let store = store(&["a"]);
        assert!(matches!(
            store.set_benchmark("z", benchmark_setting("z")),
            Err(Error::NotFound { kind: "benchmark", .. })
        ));
    }

    #[test]
    fn test_load_external_rejects_duplicates_and_keeps_previous() {
        let store = store(&["a"]);
        let before = store.get().unwrap();

        let mut dup = snapshot(&["x", "x"]);
        dup.common_settings.clear();
        let bytes = serde_json::to_vec(&dup).unwrap();
        assert!(matches!(
            store.load_from_external_source(&bytes),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            store.load_from_external_source(b"{ nope"),
            Err(Error::MalformedInput(_))
        ));
        assert_eq!(*store.get().unwrap(), *before);
    }

    #[test]
    fn test_load_external_replaces_snapshot() {
        let store = store(&["a"]);
        let bytes = serde_json::to_vec(&snapshot(&["p", "q"])).unwrap();
        store.load_from_external_source(&bytes).unwrap();
        assert!(store.has_benchmark("q").unwrap());
        assert!(!store.has_benchmark("a").unwrap());
    }

    #[test]
    fn test_failed_write_leaves_snapshot_untouched() {
        let blobs = Arc::new(FailingBlobStore {
            inner: MemoryBlobStore::new(),
            fail_writes: AtomicBool::new(false),
        });
        let store = SettingsStore::new(blobs.clone(), "tflite", snapshot(&["a"]));
        let before = store.get().unwrap();

        blobs.fail_writes.store(true, Ordering::SeqCst);
        assert!(store.set_common_value(COOLDOWN_SETTING, "1").is_err());
        assert_eq!(*store.get().unwrap(), *before);
        assert!(!store.common_flag(COOLDOWN_SETTING).unwrap());
    }

    #[test]
    fn test_setting_list_bundles_common_and_benchmark() {
        let store = store(&["a", "b"]);
        let list = store.setting_list("b").unwrap();
        assert_eq!(list.benchmark_setting.benchmark_id, "b");
        assert_eq!(list.settings.len(), 1);
        assert!(store.setting_list("nope").is_err());
    }

    #[test]
    fn test_concurrent_writers_never_lose_entries() {
        let store = Arc::new(store(&["a", "b", "c", "d"]));
        let handles: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut setting = benchmark_setting(id);
                    setting.batch_size = Some(i as i64 + 1);
                    store.set_benchmark(id, setting).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.get().unwrap();
        assert_eq!(snapshot.benchmark_settings.len(), 4);
        for (i, id) in ["a", "b", "c", "d"].into_iter().enumerate() {
            assert_eq!(
                snapshot.benchmark(id).unwrap().batch_size,
                Some(i as i64 + 1)
            );
        }
    }
}
