//! Asset path normalization and atomic file writes
//!
//! Remote sources and zip archives live in the local cache; plain local
//! paths are used as given.

use std::io::Write;
use std::path::{Path, PathBuf};

const ZIP_SUFFIX: &str = ".zip";

/// Whether the path is fetched over http(s)
pub fn is_remote(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Whether the path names a zip archive
pub fn is_zip(path: &str) -> bool {
    path.ends_with(ZIP_SUFFIX)
}

/// Map a source path to its canonical local path under `cache_root`.
///
/// Archives resolve to the directory they are extracted into.
pub fn local_path(path: &str, cache_root: &Path) -> PathBuf {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if is_remote(path) || is_zip(file_name) {
        let name = file_name.strip_suffix(ZIP_SUFFIX).unwrap_or(file_name);
        cache_root.join(name)
    } else {
        PathBuf::from(path)
    }
}

/// Whether the path exists and can be opened for reading
pub fn is_readable(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }
    if path.is_dir() {
        std::fs::read_dir(path).is_ok()
    } else {
        std::fs::File::open(path).is_ok()
    }
}

/// Like [`is_readable`], but a directory must contain at least one entry
pub fn is_populated(path: &Path) -> bool {
    if !is_readable(path) {
        return false;
    }
    if !path.is_dir() {
        return true;
    }
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Write `contents` to `path` through a uniquely named sibling temp file
/// and a rename, creating parent directories as needed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
