//! Build-tree cleaning.
//!
//! Removes CMake build directories, Python caches and MSVC intermediates
//! anywhere under the project root. Individual removal failures are recorded
//! and the walk continues.

use std::fs::FileType;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::CleanConfig;
use crate::error::Result;

/// What a clean removed, and what it could not.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanReport {
    pub removed_dirs: Vec<PathBuf>,
    pub removed_files: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

impl CleanReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Clean everything under `root` matching `rules`. `root` itself is never removed.
pub fn clean_tree(root: &Path, rules: &CleanConfig) -> Result<CleanReport> {
    let mut report = CleanReport::default();
    info!(root = %root.display(), "Cleaning build outputs");
    visit(root, rules, &mut report)?;
    info!(
        dirs = report.removed_dirs.len(),
        files = report.removed_files.len(),
        failures = report.failures.len(),
        "Clean finished"
    );
    Ok(report)
}

/// A directory entry, or the path it failed at and why.
type Entry = std::result::Result<(PathBuf, FileType), (PathBuf, io::Error)>;

fn visit(dir: &Path, rules: &CleanConfig, report: &mut CleanReport) -> Result<()> {
    let entries = std::fs::read_dir(dir)?.map(|entry| -> Entry {
        let entry = entry.map_err(|e| (dir.to_path_buf(), e))?;
        let path = entry.path();
        match entry.file_type() {
            Ok(file_type) => Ok((path, file_type)),
            Err(e) => Err((path, e)),
        }
    });
    visit_entries(entries, rules, report);
    Ok(())
}

/// Apply `rules` to each entry. A bad entry is recorded and its siblings
/// are still visited.
fn visit_entries(
    entries: impl IntoIterator<Item = Entry>,
    rules: &CleanConfig,
    report: &mut CleanReport,
) {
    for entry in entries {
        let (path, file_type) = match entry {
            Ok(entry) => entry,
            Err((path, e)) => {
                warn!(path = %path.display(), error = %e, "Could not read directory entry");
                report.failures.push((path, e.to_string()));
                continue;
            }
        };

        if file_type.is_dir() {
            if matches_dir(&path, rules) {
                remove(
                    &path,
                    |p| std::fs::remove_dir_all(p),
                    &mut report.removed_dirs,
                    &mut report.failures,
                );
            } else if let Err(e) = visit(&path, rules, report) {
                warn!(path = %path.display(), error = %e, "Could not descend into directory");
                report.failures.push((path, e.to_string()));
            }
        } else if file_type.is_file() && matches_extension(&path, rules) {
            remove(
                &path,
                |p| std::fs::remove_file(p),
                &mut report.removed_files,
                &mut report.failures,
            );
        }
    }
}

fn remove(
    path: &Path,
    op: fn(&Path) -> std::io::Result<()>,
    removed: &mut Vec<PathBuf>,
    failures: &mut Vec<(PathBuf, String)>,
) {
    match op(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed");
            removed.push(path.to_path_buf());
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not remove");
            failures.push((path.to_path_buf(), e.to_string()));
        }
    }
}

fn matches_dir(path: &Path, rules: &CleanConfig) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| rules.dirs.iter().any(|d| d == name))
        .unwrap_or(false)
}

fn matches_extension(path: &Path, rules: &CleanConfig) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            rules
                .extensions
                .iter()
                .any(|rule| rule.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
