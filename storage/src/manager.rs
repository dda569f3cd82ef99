//! Asset manager: downloads, extraction and acquisition progress

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mlbench_core::paths;
use mlbench_core::traits::{AssetProvider, ProgressSink};
use mlbench_core::{AssetRequirement, Error, Result};
use parking_lot::Mutex;

use crate::extract::extract_zip;
use crate::fetch::Fetcher;

/// Whole-percent progress over every pending requirement of a batch
struct ProgressTracker {
    total: u64,
    done: u64,
    last: Option<u8>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressTracker {
    fn new(total: u64, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            total,
            done: 0,
            last: None,
            sink,
        }
    }

    fn advance(&mut self, bytes: u64) {
        self.done = self.done.saturating_add(bytes);
        self.signal();
    }

    fn complete(&mut self) {
        self.done = self.done.max(self.total);
        self.signal();
    }

    fn signal(&mut self) {
        let percent = if self.total == 0 {
            0
        } else {
            (self.done.saturating_mul(100) / self.total).min(100) as u8
        };
        if self.last != Some(percent) {
            self.last = Some(percent);
            self.sink.percent(percent);
        }
    }
}

/// Fetches and unpacks session assets into the local cache
pub struct AssetManager {
    fetcher: Arc<dyn Fetcher>,
    cache_root: PathBuf,
}

impl AssetManager {
    /// Create a manager caching under `cache_root`
    pub fn new(fetcher: Arc<dyn Fetcher>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            cache_root: cache_root.into(),
        }
    }

    /// Cache root
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Canonical local path of a source
    pub fn local_path(&self, path: &str) -> PathBuf {
        paths::local_path(path, &self.cache_root)
    }

    async fn total_size(&self, pending: &[&AssetRequirement]) -> Result<u64> {
        let mut total = 0u64;
        for requirement in pending {
            let size = if requirement.expected_size > 0 {
                requirement.expected_size
            } else if paths::is_remote(&requirement.path) {
                self.fetcher
                    .content_length(&requirement.path)
                    .await?
                    .unwrap_or(0)
            } else {
                tokio::fs::metadata(&requirement.path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0)
            };
            total = total.saturating_add(size);
        }
        Ok(total)
    }

    async fn acquire_one(
        &self,
        requirement: &AssetRequirement,
        tracker: &Arc<Mutex<ProgressTracker>>,
    ) -> Result<()> {
        let source = requirement.path.as_str();
        let dest = self.local_path(source);

        if paths::is_remote(source) {
            self.download(source, &dest, tracker).await
        } else if paths::is_zip(source) {
            let archive = PathBuf::from(source);
            if !paths::is_readable(&archive) {
                return Err(Error::MissingDataset(source.to_string()));
            }
            let size = tokio::fs::metadata(&archive).await?.len();
            unzip(archive, dest).await?;
            tracker.lock().advance(size);
            Ok(())
        } else {
            // plain local paths are never copied
            Err(Error::MissingDataset(source.to_string()))
        }
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        tracker: &Arc<Mutex<ProgressTracker>>,
    ) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = dest.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tracing::info!(url, dest = %dest.display(), "Downloading asset");
        let on_bytes = {
            let tracker = Arc::clone(tracker);
            move |bytes: u64| tracker.lock().advance(bytes)
        };
        if let Err(e) = self.fetcher.fetch(url, &tmp, &on_bytes).await {
            remove_quietly(&tmp).await;
            return Err(e);
        }

        if paths::is_zip(url) {
            let result = unzip(tmp.clone(), dest.to_path_buf()).await;
            remove_quietly(&tmp).await;
            result
        } else {
            tokio::fs::rename(&tmp, dest).await?;
            Ok(())
        }
    }
}

async fn unzip(archive: PathBuf, dest: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
        .await
        .map_err(|e| Error::InvalidConfig(format!("extraction task failed: {e}")))?
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp file");
        }
    }
}

#[async_trait]
impl AssetProvider for AssetManager {
    fn needs_acquire(&self, path: &str) -> bool {
        paths::is_remote(path) && !paths::is_readable(&self.local_path(path))
    }

    fn is_satisfied(&self, requirement: &AssetRequirement) -> bool {
        let local = self.local_path(&requirement.path);
        if requirement.must_be_populated {
            paths::is_populated(&local)
        } else {
            paths::is_readable(&local)
        }
    }

    async fn acquire_all(
        &self,
        requirements: &[AssetRequirement],
        sink: Arc<dyn ProgressSink>,
    ) -> Result<()> {
        let pending: Vec<&AssetRequirement> = requirements
            .iter()
            .filter(|r| !self.is_satisfied(r))
            .collect();
        if pending.is_empty() {
            tracing::debug!("Nothing to acquire");
            return Ok(());
        }

        let total = self.total_size(&pending).await?;
        tracing::info!(assets = pending.len(), total_bytes = total, "Acquiring assets");
        let tracker = Arc::new(Mutex::new(ProgressTracker::new(total, sink)));

        let mut first_error = None;
        for requirement in pending {
            match self.acquire_one(requirement, &tracker).await {
                Ok(()) => {}
                Err(e @ Error::NetworkUnavailable(_)) => {
                    tracing::warn!(path = %requirement.path, error = %e, "Network unavailable, aborting");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(path = %requirement.path, error = %e, "Failed to acquire asset");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracker.lock().complete();
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetManager")
            .field("cache_root", &self.cache_root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ========================================================================
    // Mock fetcher
    // ========================================================================

    #[derive(Default)]
    struct MockFetcher {
        bodies: HashMap<String, Vec<u8>>,
        offline: bool,
        fetches: AtomicUsize,
    }

    impl MockFetcher {
        fn with_body(mut self, url: &str, body: Vec<u8>) -> Self {
            self.bodies.insert(url.to_string(), body);
            self
        }

        fn offline(mut self) -> Self {
            self.offline = true;
            self
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn content_length(&self, url: &str) -> Result<Option<u64>> {
            Ok(self.bodies.get(url).map(|b| b.len() as u64))
        }

        async fn fetch(
            &self,
            url: &str,
            dest: &Path,
            on_bytes: &(dyn Fn(u64) + Send + Sync),
        ) -> Result<u64> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.offline {
                return Err(Error::NetworkUnavailable("offline".into()));
            }
            let body = self
                .bodies
                .get(url)
                .ok_or_else(|| Error::acquire(url, "HTTP 404 Not Found"))?;
            std::fs::write(dest, body)?;
            for chunk in body.chunks(4) {
                on_bytes(chunk.len() as u64);
            }
            Ok(body.len() as u64)
        }
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn recorder() -> (Arc<dyn ProgressSink>, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: Arc<dyn ProgressSink> = Arc::new(move |p: u8| sink_seen.lock().push(p));
        (sink, seen)
    }

    const MODEL: &str = "https://example.com/models/IC_tpu_uint8.tflite";
    const DATASET: &str = "https://example.com/coco.zip";

    // ========================================================================
    // Tests
    // ========================================================================

    #[tokio::test]
    async fn test_downloads_file_and_extracts_archive() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::default()
            .with_body(MODEL, b"model-bytes".to_vec())
            .with_body(DATASET, zip_bytes(&[("0000.jpg", b"jpeg")]));
        let manager = AssetManager::new(Arc::new(fetcher), dir.path());
        let requirements = vec![
            AssetRequirement::new(MODEL),
            AssetRequirement::new(DATASET).populated(),
        ];

        let (sink, seen) = recorder();
        manager.acquire_all(&requirements, sink).await.unwrap();

        let cache = dir.path();
        assert_eq!(
            std::fs::read(cache.join("IC_tpu_uint8.tflite")).unwrap(),
            b"model-bytes"
        );
        assert!(cache.join("coco").join("0000.jpg").exists());
        assert!(!cache.join("coco.tmp").exists());
        assert!(!cache.join("IC_tpu_uint8.tflite.tmp").exists());
        assert!(requirements.iter().all(|r| manager.is_satisfied(r)));

        let seen = seen.lock();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    }

    #[tokio::test]
    async fn test_present_assets_are_not_fetched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("IC_tpu_uint8.tflite"), b"cached").unwrap();
        let fetcher = Arc::new(MockFetcher::default().with_body(MODEL, b"new".to_vec()));
        let manager = AssetManager::new(fetcher.clone(), dir.path());

        assert!(!manager.needs_acquire(MODEL));
        let (sink, seen) = recorder();
        manager
            .acquire_all(&[AssetRequirement::new(MODEL)], sink)
            .await
            .unwrap();

        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 0);
        assert!(seen.lock().is_empty());
        assert_eq!(
            std::fs::read(dir.path().join("IC_tpu_uint8.tflite")).unwrap(),
            b"cached"
        );
    }

    #[tokio::test]
    async fn test_empty_directory_is_not_populated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("coco")).unwrap();
        let manager = AssetManager::new(Arc::new(MockFetcher::default()), dir.path());

        assert!(manager.is_satisfied(&AssetRequirement::new(DATASET)));
        assert!(!manager.is_satisfied(&AssetRequirement::new(DATASET).populated()));
    }

    #[tokio::test]
    async fn test_network_failure_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher::default().offline());
        let manager = AssetManager::new(fetcher.clone(), dir.path());
        let requirements = vec![AssetRequirement::new(MODEL), AssetRequirement::new(DATASET)];

        let (sink, _) = recorder();
        let err = manager.acquire_all(&requirements, sink).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
        assert!(!dir.path().join("IC_tpu_uint8.tflite.tmp").exists());
    }

    #[tokio::test]
    async fn test_other_failures_continue_and_report_first() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::default()
            .with_body(DATASET, b"not a zip".to_vec())
            .with_body(MODEL, b"model".to_vec());
        let manager = AssetManager::new(Arc::new(fetcher), dir.path());
        let requirements = vec![AssetRequirement::new(DATASET), AssetRequirement::new(MODEL)];

        let (sink, _) = recorder();
        let err = manager.acquire_all(&requirements, sink).await.unwrap_err();

        assert!(matches!(err, Error::Acquire { .. }));
        assert!(!dir.path().join("coco").exists());
        assert!(!dir.path().join("coco.tmp").exists());
        // the later model still landed
        assert!(dir.path().join("IC_tpu_uint8.tflite").exists());
    }

    #[tokio::test]
    async fn test_local_zip_is_extracted_into_cache() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("local_set.zip");
        std::fs::write(&archive, zip_bytes(&[("a.jpg", b"a"), ("b.jpg", b"b")])).unwrap();
        let cache = dir.path().join("cache");
        let manager = AssetManager::new(Arc::new(MockFetcher::default()), &cache);
        let requirement = AssetRequirement::new(archive.display().to_string()).populated();

        assert!(!manager.needs_acquire(&requirement.path));
        let (sink, _) = recorder();
        manager.acquire_all(&[requirement.clone()], sink).await.unwrap();

        assert!(cache.join("local_set").join("b.jpg").exists());
        assert!(manager.is_satisfied(&requirement));
    }

    #[tokio::test]
    async fn test_missing_local_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let manager = AssetManager::new(Arc::new(MockFetcher::default()), dir.path());
        let missing = dir.path().join("nowhere").display().to_string();

        let (sink, _) = recorder();
        let err = manager
            .acquire_all(&[AssetRequirement::new(&missing)], sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingDataset(path) if path == missing));
    }

    #[test]
    fn test_progress_signals_on_change_only() {
        let (sink, seen) = recorder();
        let mut tracker = ProgressTracker::new(1000, sink);

        tracker.advance(1);
        tracker.advance(2);
        tracker.advance(10);
        tracker.advance(5000);
        tracker.complete();

        assert_eq!(*seen.lock(), vec![0, 1, 100]);
    }
}
