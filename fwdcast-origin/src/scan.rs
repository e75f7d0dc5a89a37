//! Directory listing and recursive enumeration for ZIP downloads.
//!
//! Generalized from `ferrex-core/src/scanner.rs`'s `MediaScanner`
//! (`WalkDir::new(root_path)` plus a `max_depth`/`follow_links` config) from
//! media-library scanning to generic directory listing: one level deep for
//! a browsable listing, unbounded for a ZIP's full subtree.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// One level of a directory, filtered against `excludes` (simple substring
/// matches against the entry name, per `spec.md`'s "glob-ish" exclude
/// patterns).
pub fn list_dir(dir: &Path, excludes: &[String]) -> std::io::Result<Vec<DirEntryInfo>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| e.into_io_error().unwrap_or_else(|| {
            std::io::Error::other("walkdir entry error")
        }))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_excluded(&name, excludes) {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walkdir metadata error"))
        })?;
        entries.push(DirEntryInfo {
            name,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
        });
    }
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });
    Ok(entries)
}

/// Every regular file under `dir` (recursively), paired with its path
/// relative to `dir`, for building a ZIP archive. Excluded entries (and
/// everything beneath an excluded directory) are skipped.
pub fn walk_files(dir: &Path, excludes: &[String]) -> std::io::Result<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir).into_iter().filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !is_excluded(&name, excludes)
    });
    for entry in walker {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walkdir entry error"))
        })?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push((entry.path().to_path_buf(), relative));
        }
    }
    Ok(files)
}

fn is_excluded(name: &str, excludes: &[String]) -> bool {
    excludes.iter().any(|pattern| name.contains(pattern.as_str()))
}
