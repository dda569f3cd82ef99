//! Zip archive extraction

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use mlbench_core::{Error, Result};

/// Extract `archive` into the directory `dest`.
///
/// On failure any partially extracted `dest` is removed. Blocking; call it
/// from `spawn_blocking`.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let result = extract_inner(archive, dest);
    if result.is_err() && dest.exists() {
        if let Err(e) = fs::remove_dir_all(dest) {
            tracing::warn!(dest = %dest.display(), error = %e, "Failed to remove partial extraction");
        }
    }
    result
}

fn extract_inner(archive: &Path, dest: &Path) -> Result<()> {
    let label = archive.display().to_string();
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| Error::acquire(&label, e.to_string()))?;

    fs::create_dir_all(dest)?;
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| Error::acquire(&label, e.to_string()))?;
        let relative = entry_path(entry.enclosed_name())
            .ok_or_else(|| Error::acquire(&label, format!("entry escapes archive: {}", entry.name())))?;
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }

    tracing::debug!(archive = %label, entries = zip.len(), dest = %dest.display(), "Extracted archive");
    Ok(())
}

/// Relative path of an entry, `None` if it would land outside the destination
fn entry_path(enclosed: Option<PathBuf>) -> Option<PathBuf> {
    let path = enclosed?;
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then_some(path)
}
