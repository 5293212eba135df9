//! Deletion of cataloged duplicates.
//!
//! # Overview
//!
//! This module removes the file behind a [`FileRecord`] and tombstones the
//! record:
//! - Permanent deletion (default) or move to the system trash
//! - TOCTOU verification against the catalog's size and mtime
//! - Batch operations that continue past per-file failures
//!
//! # Catalog consistency
//!
//! The tombstone is written right after each successful removal, never
//! batched, so an interrupted run cannot leave a live record for a file
//! that is already gone. A failed removal leaves the record live and the
//! resolver will offer it again on a later pass.
//!
//! # Example
//!
//! ```no_run
//! use dupecatalog::actions::delete::{DeleteConfig, Deleter};
//! use dupecatalog::catalog::Catalog;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let catalog = Arc::new(Catalog::open(Path::new("catalog.db")).unwrap());
//! let deleter = Deleter::new(Arc::clone(&catalog), DeleteConfig::default());
//! if let Some(record) = catalog.file(42).unwrap() {
//!     let outcome = deleter.delete(&record).unwrap();
//!     println!("{outcome:?}");
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::{now_nanos, unix_nanos, Catalog, CatalogError, CatalogResult, FileRecord};
use crate::duplicates::DuplicateMatch;

/// Error type for deletion operations.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// Permission denied when attempting to delete.
    #[error("permission denied: {0} - try running with elevated privileges")]
    PermissionDenied(PathBuf),

    /// File was modified since it was cataloged (TOCTOU protection).
    #[error("file modified since scan: {0}")]
    Modified(PathBuf),

    /// The copy that justified the deletion is gone or no longer matches.
    #[error("original {original} no longer matches, kept {path}")]
    OriginalUnavailable { path: PathBuf, original: PathBuf },

    /// Candidate and original are one file reached under two names.
    #[error("{path} and {original} are the same file, kept it")]
    SameFile { path: PathBuf, original: PathBuf },

    /// Trash operation failed.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed { path: PathBuf, message: String },

    /// Permanent delete operation failed.
    #[error("permanent delete failed for {path}: {message}")]
    PermanentDeleteFailed { path: PathBuf, message: String },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeleteError {
    /// Get the path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied(p)
            | Self::Modified(p)
            | Self::OriginalUnavailable { path: p, .. }
            | Self::SameFile { path: p, .. }
            | Self::TrashFailed { path: p, .. }
            | Self::PermanentDeleteFailed { path: p, .. }
            | Self::Io { path: p, .. } => p,
        }
    }
}

/// Result of a successful deletion operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    /// Path that was deleted.
    pub path: PathBuf,
    /// Size of the deleted file in bytes.
    pub size: u64,
    /// Whether deletion was permanent (true) or to trash (false).
    pub permanent: bool,
}

impl DeleteResult {
    /// Create a new delete result.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, permanent: bool) -> Self {
        Self {
            path,
            size,
            permanent,
        }
    }
}

/// What happened to one record.
#[derive(Debug)]
pub enum DeleteOutcome {
    /// The file was removed and the record tombstoned.
    Removed(DeleteResult),
    /// The file was already gone; the record is now tombstoned.
    AlreadyRemoved(PathBuf),
    /// Removal failed; the record stays live.
    Failed(DeleteError),
}

/// A per-file failure in a batch, kept as text for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Results of a batch deletion operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchDeleteResult {
    /// Successfully deleted files.
    pub successes: Vec<DeleteResult>,
    /// Files that were already gone and have been tombstoned.
    pub already_removed: Vec<PathBuf>,
    /// Failed deletions with their errors.
    pub failures: Vec<DeleteFailure>,
    /// Total bytes freed.
    pub bytes_freed: u64,
    /// The batch stopped early because shutdown was requested.
    pub interrupted: bool,
}

impl BatchDeleteResult {
    /// Number of successful deletions.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    /// Number of failed deletions.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Total number of attempted deletions.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.successes.len() + self.already_removed.len() + self.failures.len()
    }

    /// Check if all deletions succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold one outcome into the totals.
    pub fn record(&mut self, outcome: DeleteOutcome) {
        match outcome {
            DeleteOutcome::Removed(result) => {
                self.bytes_freed += result.size;
                self.successes.push(result);
            }
            DeleteOutcome::AlreadyRemoved(path) => self.already_removed.push(path),
            DeleteOutcome::Failed(error) => self.record_failure(&error),
        }
    }

    /// Record a failure that happened before removal was attempted.
    pub fn record_failure(&mut self, error: &DeleteError) {
        log::warn!("Failed to delete {}: {}", error.path().display(), error);
        self.failures.push(DeleteFailure {
            path: error.path().to_path_buf(),
            error: error.to_string(),
        });
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.all_succeeded() {
            format!(
                "Deleted {} file(s), freed {} bytes",
                self.success_count(),
                self.bytes_freed
            )
        } else {
            format!(
                "Deleted {} file(s), {} failed, freed {} bytes",
                self.success_count(),
                self.failure_count(),
                self.bytes_freed
            )
        }
    }
}

/// Configuration for deletion operations.
#[derive(Debug, Clone)]
pub struct DeleteConfig {
    /// Move files to the system trash instead of unlinking them.
    pub use_trash: bool,
    /// Refuse to delete a file whose size or mtime differ from its record.
    pub verify_mtime: bool,
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self {
            use_trash: false,
            verify_mtime: true,
        }
    }
}

impl DeleteConfig {
    /// Enable/disable TOCTOU verification.
    #[must_use]
    pub fn with_verify_mtime(mut self, verify: bool) -> Self {
        self.verify_mtime = verify;
        self
    }
}

fn classify_io(path: &Path, e: io::Error) -> DeleteError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => DeleteError::PermissionDenied(path.to_path_buf()),
        _ => DeleteError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    }
}

/// Move a single file to the system trash.
///
/// Returns `Ok(None)` if there was nothing to delete.
///
/// # Errors
///
/// - `PermissionDenied` if the file can't be accessed
/// - `TrashFailed` if the trash operation fails
pub fn delete_to_trash(path: &Path) -> Result<Option<DeleteResult>, DeleteError> {
    let size = match fs::symlink_metadata(path) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(classify_io(path, e)),
    };

    trash::delete(path).map_err(|e| {
        log::error!("Trash operation failed for {}: {}", path.display(), e);
        DeleteError::TrashFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    log::info!("Moved to trash: {} ({} bytes)", path.display(), size);
    Ok(Some(DeleteResult::new(path.to_path_buf(), size, false)))
}

/// Permanently delete a single file.
///
/// Returns `Ok(None)` if there was nothing to delete.
///
/// # Errors
///
/// - `PermissionDenied` if deletion is not allowed
/// - `PermanentDeleteFailed` if the delete operation fails
pub fn permanent_delete(path: &Path) -> Result<Option<DeleteResult>, DeleteError> {
    let size = match fs::symlink_metadata(path) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(classify_io(path, e)),
    };

    match fs::remove_file(path) {
        Ok(()) => {}
        // Vanished between stat and unlink.
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(DeleteError::PermissionDenied(path.to_path_buf()));
        }
        Err(e) => {
            log::error!("Permanent delete failed for {}: {}", path.display(), e);
            return Err(DeleteError::PermanentDeleteFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            });
        }
    }

    log::info!("Permanently deleted: {} ({} bytes)", path.display(), size);
    Ok(Some(DeleteResult::new(path.to_path_buf(), size, true)))
}

/// Check that the file on disk is still the one the catalog describes.
///
/// Returns `Ok(false)` if the file no longer exists.
fn verify_unchanged(record: &FileRecord, path: &Path) -> Result<bool, DeleteError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(classify_io(path, e)),
    };

    if metadata.len() != record.size_bytes {
        log::warn!(
            "File modified since scan: {} (size changed from {} to {})",
            path.display(),
            record.size_bytes,
            metadata.len()
        );
        return Err(DeleteError::Modified(path.to_path_buf()));
    }

    if let Ok(mtime) = metadata.modified() {
        if unix_nanos(mtime) != record.last_modified {
            log::warn!("File modified since scan: {} (mtime changed)", path.display());
            return Err(DeleteError::Modified(path.to_path_buf()));
        }
    }

    Ok(true)
}

/// Removes files and tombstones their catalog records.
#[derive(Debug)]
pub struct Deleter {
    catalog: Arc<Catalog>,
    config: DeleteConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Deleter {
    /// Create a deleter writing tombstones to `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, config: DeleteConfig) -> Self {
        Self {
            catalog,
            config,
            shutdown_flag: None,
        }
    }

    /// Set a shutdown flag that stops a batch between files.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Remove the file behind `record`.
    ///
    /// Filesystem failures are returned as [`DeleteOutcome::Failed`], not as
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns an error only if the tombstone cannot be written.
    pub fn delete(&self, record: &FileRecord) -> CatalogResult<DeleteOutcome> {
        let path = record.full_path();

        if self.config.verify_mtime {
            match verify_unchanged(record, &path) {
                Ok(true) => {}
                Ok(false) => return self.tombstone_missing(record, path),
                Err(e) => return Ok(DeleteOutcome::Failed(e)),
            }
        }

        let removed = if self.config.use_trash {
            delete_to_trash(&path)
        } else {
            permanent_delete(&path)
        };

        match removed {
            Ok(Some(result)) => {
                self.catalog.mark_deleted(record.id, now_nanos())?;
                Ok(DeleteOutcome::Removed(result))
            }
            Ok(None) => self.tombstone_missing(record, path),
            Err(e) => Ok(DeleteOutcome::Failed(e)),
        }
    }

    fn tombstone_missing(
        &self,
        record: &FileRecord,
        path: PathBuf,
    ) -> CatalogResult<DeleteOutcome> {
        log::info!("Already removed: {}", path.display());
        self.catalog.mark_deleted(record.id, now_nanos())?;
        Ok(DeleteOutcome::AlreadyRemoved(path))
    }

    /// Delete the candidate of every match, continuing past per-file
    /// failures.
    ///
    /// A candidate that resolves to the same file as its original is never
    /// removed. `precheck` runs right before each removal; returning a
    /// [`DeleteError`] skips that candidate and records the failure.
    ///
    /// # Errors
    ///
    /// Stops at the first error from `precheck` or the first catalog write
    /// failure.
    pub fn delete_batch<E, F>(
        &self,
        matches: &[DuplicateMatch],
        mut precheck: F,
    ) -> Result<BatchDeleteResult, E>
    where
        E: From<CatalogError>,
        F: FnMut(&DuplicateMatch) -> Result<Option<DeleteError>, E>,
    {
        let mut result = BatchDeleteResult::default();

        for m in matches {
            if self.is_shutdown_requested() {
                result.interrupted = true;
                break;
            }

            let path = m.candidate.full_path();
            let original = m.original.full_path();
            if m.candidate.computer_id == m.original.computer_id && same_file(&path, &original) {
                result.record_failure(&DeleteError::SameFile { path, original });
                continue;
            }

            if let Some(error) = precheck(m)? {
                result.record_failure(&error);
                continue;
            }
            result.record(self.delete(&m.candidate)?);
        }

        log::info!("{}", result.summary());
        Ok(result)
    }
}

/// Whether two paths name the same file once links are resolved.
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
