//! Scanner module for directory traversal, hashing and catalog reconciliation.
//!
//! This module provides functionality for:
//! - Ordered directory walking using walkdir
//! - Streaming content hashing with BLAKE3
//! - Reconciling what is on disk with the catalog (create, refresh, tombstone)
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and entry discovery
//! - [`hasher`]: BLAKE3 file hashing (streaming)
//! - [`reconcile`]: The [`Scanner`] that keeps the catalog in sync
//!
//! # Example
//!
//! ```no_run
//! use dupecatalog::catalog::Catalog;
//! use dupecatalog::scanner::{Scanner, ScannerConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let catalog = Arc::new(Catalog::open(Path::new("catalog.db")).unwrap());
//! let computer = catalog.get_or_create_computer("workstation").unwrap();
//! let scanner = Scanner::new(catalog, computer, ScannerConfig::default());
//!
//! let summary = scanner.scan(Path::new("/data")).unwrap();
//! println!("{} files, {} hashed", summary.files_seen, summary.files_hashed);
//! ```

pub mod hasher;
pub mod reconcile;
pub mod walker;

use std::path::PathBuf;
use std::time::SystemTime;

use crate::catalog::CatalogError;

// Re-export main types
pub use hasher::{hash_to_hex, hex_to_hash, Hash, Hasher, CHUNK_SIZE};
pub use reconcile::{FileOutcome, ScanMode, ScanSummary, Scanner, ScannerConfig};
pub use walker::{WalkEntry, Walker};

/// Metadata for a discovered file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileEntry {
    /// Create a new FileEntry.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the file
    /// * `size` - File size in bytes
    /// * `modified` - Last modification time
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

/// Metadata for a discovered directory.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Loops are detected and reported as recoverable errors.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Glob patterns to ignore (gitignore-style).
    /// These are applied in addition to a `.gitignore` in the walk root.
    pub ignore_patterns: Vec<String>,
}

impl WalkerConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(follow_symlinks: bool, skip_hidden: bool, ignore_patterns: Vec<String>) -> Self {
        Self {
            follow_symlinks,
            skip_hidden,
            ignore_patterns,
        }
    }
}

/// Errors that can occur during directory scanning.
///
/// Only [`ScanError::is_recoverable`] errors are skipped during a pass;
/// everything else aborts it.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Following a symlink led back to one of its ancestors.
    #[error("Filesystem loop: {path} points back to {ancestor}")]
    Loop {
        /// Path of the looping entry
        path: PathBuf,
        /// Ancestor it resolves to
        ancestor: PathBuf,
    },

    /// The path cannot be represented in the catalog.
    #[error("Path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The catalog could not be read or written.
    #[error(transparent)]
    Catalog(CatalogError),
}

impl ScanError {
    /// Whether the pass may skip this entry and continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::NotFound(_) | Self::Loop { .. } | Self::InvalidPath(_)
        )
    }

    /// Classify an I/O error for `path`.
    pub(crate) fn from_io(path: &std::path::Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

impl From<CatalogError> for ScanError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidPath(path) => Self::InvalidPath(path),
            other => Self::Catalog(other),
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
