//! Directory walker implementation using walkdir.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing a directory
//! tree and yielding both directories and regular files, parents before
//! children, in file-name order. The scanner relies on that ordering to
//! link each new folder to its already-cataloged parent.
//!
//! # Features
//!
//! - Deterministic, sorted traversal
//! - Configurable following of directory symlinks, with loop detection.
//!   File symlinks are never yielded, so one file is never cataloged twice
//!   in the same directory.
//! - Gitignore-style pattern matching via the `ignore` crate
//! - Hidden file filtering
//! - Graceful shutdown via atomic flag
//!
//! # Example
//!
//! ```no_run
//! use dupecatalog::scanner::{Walker, WalkerConfig, WalkEntry};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(WalkEntry::File(file)) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Ok(WalkEntry::Directory(dir)) => println!("{}/", dir.path.display()),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use walkdir::{DirEntry, WalkDir};

use super::{DirectoryEntry, FileEntry, ScanError, WalkerConfig};

/// One item produced by the walker.
#[derive(Debug, Clone)]
pub enum WalkEntry {
    /// A directory, including the walk root itself.
    Directory(DirectoryEntry),
    /// A regular file.
    File(FileEntry),
}

/// Directory walker for file and folder discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// # Arguments
    ///
    /// * `path` - Root directory to scan
    /// * `config` - Walker configuration options
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, the walker will stop iteration
    /// as soon as possible.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Build gitignore matcher from config patterns and .gitignore file.
    fn build_gitignore(&self) -> Option<Gitignore> {
        let mut builder = GitignoreBuilder::new(&self.root);

        let gitignore_path = self.root.join(".gitignore");
        if gitignore_path.exists() {
            if let Some(e) = builder.add(&gitignore_path) {
                log::warn!(
                    "Failed to load .gitignore from {}: {}",
                    gitignore_path.display(),
                    e
                );
            } else {
                log::debug!("Loaded .gitignore from {}", gitignore_path.display());
            }
        }

        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if gitignore.is_empty() => None,
            Ok(gitignore) => Some(gitignore),
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Decide whether to descend into / yield an entry.
    fn keep_entry(&self, entry: &DirEntry, gitignore: Option<&Gitignore>) -> bool {
        // The root is always kept, even if it is hidden.
        if entry.depth() == 0 {
            return true;
        }

        if self.config.skip_hidden && entry.file_name().to_string_lossy().starts_with('.') {
            log::trace!("Skipping hidden entry: {}", entry.path().display());
            return false;
        }

        if let Some(gi) = gitignore {
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if gi.matched(relative, entry.file_type().is_dir()).is_ignore() {
                log::trace!("Ignoring: {}", entry.path().display());
                return false;
            }
        }

        true
    }

    /// Walk the directory tree, yielding directories and files.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration; the caller decides which ones are fatal.
    pub fn walk(&self) -> impl Iterator<Item = Result<WalkEntry, ScanError>> + '_ {
        let gitignore = self.build_gitignore();

        WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| self.keep_entry(entry, gitignore.as_ref()))
            .take_while(move |_| {
                if self.is_shutdown_requested() {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                    false
                } else {
                    true
                }
            })
            .filter_map(move |entry_result| match entry_result {
                Ok(entry) => self.process_entry(&entry),
                Err(e) => Some(Err(self.handle_walk_error(e))),
            })
    }

    fn process_entry(&self, entry: &DirEntry) -> Option<Result<WalkEntry, ScanError>> {
        let file_type = entry.file_type();

        // With follow_links enabled walkdir reports the target's type, so a
        // remaining symlink here is one we were told not to follow.
        if file_type.is_symlink() {
            log::trace!("Skipping symlink: {}", entry.path().display());
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => return Some(Err(self.handle_walk_error(e))),
        };
        let modified = metadata.modified().ok();

        if file_type.is_dir() {
            return Some(Ok(WalkEntry::Directory(DirectoryEntry {
                path: entry.path().to_path_buf(),
                modified,
            })));
        }

        // Only directory links are followed; a linked file is another name
        // for a file that is cataloged where it really lives.
        if entry.path_is_symlink() {
            log::trace!("Skipping file symlink: {}", entry.path().display());
            return None;
        }

        if !metadata.is_file() {
            log::trace!("Skipping special file: {}", entry.path().display());
            return None;
        }

        Some(Ok(WalkEntry::File(FileEntry::new(
            entry.path().to_path_buf(),
            metadata.len(),
            modified.unwrap_or(SystemTime::UNIX_EPOCH),
        ))))
    }

    /// Classify a walkdir error.
    fn handle_walk_error(&self, error: walkdir::Error) -> ScanError {
        let path = error
            .path()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        if let Some(ancestor) = error.loop_ancestor() {
            log::warn!(
                "Filesystem loop at {} (points to {})",
                path.display(),
                ancestor.display()
            );
            return ScanError::Loop {
                ancestor: ancestor.to_path_buf(),
                path,
            };
        }

        match error.io_error().map(io::Error::kind) {
            Some(io::ErrorKind::PermissionDenied) => {
                log::warn!("Permission denied: {}", path.display());
                ScanError::PermissionDenied(path)
            }
            Some(io::ErrorKind::NotFound) => {
                log::debug!("Entry vanished during walk: {}", path.display());
                ScanError::NotFound(path)
            }
            _ => {
                let message = error.to_string();
                log::warn!("Walker error for {}: {}", path.display(), message);
                ScanError::Io {
                    path,
                    source: error
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other(message)),
                }
            }
        }
    }
}
