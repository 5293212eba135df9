//! Removal of directories left empty by deletions.
//!
//! Directories are visited children first, so a parent that only contained
//! empty subdirectories is removed in the same pass. The root itself is
//! always kept. Folder rows in the catalog are left alone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use walkdir::WalkDir;

/// Outcome of a housekeeping pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HousekeepReport {
    /// Directories that were removed, deepest first.
    pub removed: Vec<PathBuf>,
    /// Directories that were empty but could not be removed.
    pub failures: Vec<(PathBuf, String)>,
}

impl HousekeepReport {
    /// Number of removed directories.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Removes empty directories below a root.
#[derive(Debug, Default)]
pub struct Housekeeper {
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Housekeeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a shutdown flag that stops the pass between directories.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Remove every empty directory strictly below `root`.
    ///
    /// Unreadable directories are skipped. Symlinks are never followed.
    #[must_use]
    pub fn remove_empty_dirs(&self, root: &Path) -> HousekeepReport {
        let mut report = HousekeepReport::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .contents_first(true)
            .min_depth(1);

        for entry in walker {
            if self.is_shutdown_requested() {
                break;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::debug!("Skipping during cleanup: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            match is_empty_dir(path) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    log::debug!("Cannot read {}: {e}", path.display());
                    continue;
                }
            }

            match fs::remove_dir(path) {
                Ok(()) => {
                    log::debug!("Removed empty directory: {}", path.display());
                    report.removed.push(path.to_path_buf());
                }
                Err(e) => {
                    log::warn!("Failed to remove empty directory {}: {e}", path.display());
                    report.failures.push((path.to_path_buf(), e.to_string()));
                }
            }
        }

        if !report.removed.is_empty() {
            log::info!(
                "Removed {} empty directories under {}",
                report.removed_count(),
                root.display()
            );
        }
        report
    }
}

fn is_empty_dir(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}
