//! Reconciliation of a filesystem subtree with the catalog.
//!
//! # Overview
//!
//! A pass walks the subtree, records every directory as a folder row, and
//! reconciles every regular file:
//!
//! - **New file**: hashed, then inserted as one complete row.
//! - **Known file, unchanged** (same mtime and size): only `last_checked` moves.
//!   This is what keeps repeated scans of large trees cheap.
//! - **Known file, changed**: re-hashed; size, mtime and hash are updated and
//!   any tombstone is cleared.
//! - **Known file, gone**: tombstoned, hash retained.
//!
//! An [`ScanMode::Update`] pass additionally looks for live rows under the
//! root that the walk did not touch (their `last_checked` predates the pass)
//! and reconciles them individually, which tombstones externally removed
//! files.
//!
//! Hashing runs on a rayon pool of `io_threads` workers. Each worker commits
//! its own file with single-statement writes, so an interrupted pass leaves
//! every row either untouched or fully updated.

use std::fmt;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use rayon::prelude::*;
use serde::{Serialize, Serializer};

use super::walker::{WalkEntry, Walker};
use super::{DirectoryEntry, FileEntry, Hasher, ScanError, WalkerConfig};
use crate::catalog::{
    from_unix_nanos, now_nanos, path_key, unix_nanos, Catalog, Computer, FileRecord, NewFile,
};
use crate::progress::{ProgressCallback, PHASE_MISSING, PHASE_RECONCILE, PHASE_WALKING};

/// Which kind of pass to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Populate and refresh what the walk finds.
    Scan,
    /// Like `Scan`, then tombstone cataloged files the walk no longer finds.
    Update,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// What reconciliation did to one file row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// A new row was created. `hashed` is false if no digest was available.
    Added { hashed: bool },
    /// An existing row was re-hashed.
    Rehashed { hashed: bool },
    /// Nothing changed; only `last_checked` was refreshed.
    Unchanged,
    /// The file is gone and its row was tombstoned by this call.
    Tombstoned,
    /// The file is gone and its row was already a tombstone.
    StillMissing,
}

impl FileOutcome {
    /// Whether this outcome involved computing a content hash.
    #[must_use]
    pub fn computed_hash(self) -> bool {
        matches!(self, Self::Added { .. } | Self::Rehashed { .. })
    }
}

/// Counters for a completed scan or update pass.
#[derive(Debug, Default, Serialize)]
pub struct ScanSummary {
    pub root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ScanMode>,
    pub folders_seen: usize,
    pub files_seen: usize,
    pub files_added: usize,
    pub files_rehashed: usize,
    pub files_unchanged: usize,
    pub files_tombstoned: usize,
    /// Files hashed during this pass (new plus changed).
    pub files_hashed: usize,
    /// Hashed files for which no digest could be produced.
    pub hash_unavailable: usize,
    pub bytes_hashed: u64,
    /// Entries skipped because of recoverable errors.
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<ScanError>,
    pub interrupted: bool,
    #[serde(serialize_with = "serialize_duration_ms", rename = "duration_ms")]
    pub duration: Duration,
}

impl ScanSummary {
    fn new(root: &Path, mode: ScanMode) -> Self {
        Self {
            root: root.to_path_buf(),
            mode: Some(mode),
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: FileOutcome, size: u64) {
        match outcome {
            FileOutcome::Added { hashed } => {
                self.files_added += 1;
                self.count_hash(hashed, size);
            }
            FileOutcome::Rehashed { hashed } => {
                self.files_rehashed += 1;
                self.count_hash(hashed, size);
            }
            FileOutcome::Unchanged => self.files_unchanged += 1,
            FileOutcome::Tombstoned => self.files_tombstoned += 1,
            FileOutcome::StillMissing => {}
        }
    }

    fn count_hash(&mut self, hashed: bool, size: u64) {
        self.files_hashed += 1;
        if hashed {
            self.bytes_hashed += size;
        } else {
            self.hash_unavailable += 1;
        }
    }

    /// Whether some entries were skipped.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn serialize_errors<S: Serializer>(errors: &[ScanError], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(errors.iter().map(ToString::to_string))
}

fn serialize_duration_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Configuration for a [`Scanner`].
#[derive(Clone)]
pub struct ScannerConfig {
    /// Walk filters.
    pub walker: WalkerConfig,
    /// Number of hashing workers. Default is 4.
    pub io_threads: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl fmt::Debug for ScannerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerConfig")
            .field("walker", &self.walker)
            .field("io_threads", &self.io_threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            walker: WalkerConfig::default(),
            io_threads: 4,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl ScannerConfig {
    /// Set the walk filters.
    #[must_use]
    pub fn with_walker(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
        self
    }

    /// Set the number of hashing workers (minimum 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Observed state of a path on disk.
#[derive(Debug, Clone, Copy)]
struct Observed {
    size: u64,
    modified: i64,
}

/// Keeps the catalog in sync with filesystem subtrees of one computer.
#[derive(Debug)]
pub struct Scanner {
    catalog: Arc<Catalog>,
    computer: Computer,
    hasher: Hasher,
    config: ScannerConfig,
}

impl Scanner {
    /// Create a scanner that attributes everything it finds to `computer`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, computer: Computer, config: ScannerConfig) -> Self {
        Self {
            catalog,
            computer,
            hasher: Hasher::new(),
            config,
        }
    }

    /// The computer this scanner writes rows for.
    #[must_use]
    pub fn computer(&self) -> &Computer {
        &self.computer
    }

    fn is_shutdown_requested(&self) -> bool {
        self.config
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn progress(&self) -> Option<&dyn ProgressCallback> {
        self.config.progress_callback.as_deref()
    }

    /// Populate or refresh the catalog for the subtree at `root`.
    ///
    /// # Errors
    ///
    /// Fails if `root` is not an accessible directory, if the catalog
    /// becomes unavailable, or on a non-recoverable walk error. Recoverable
    /// per-entry errors are collected in [`ScanSummary::errors`].
    pub fn scan(&self, root: &Path) -> Result<ScanSummary, ScanError> {
        self.run(root, ScanMode::Scan)
    }

    /// Refresh the subtree and tombstone cataloged files that disappeared.
    ///
    /// # Errors
    ///
    /// Same as [`Scanner::scan`].
    pub fn update(&self, root: &Path) -> Result<ScanSummary, ScanError> {
        self.run(root, ScanMode::Update)
    }

    fn run(&self, root: &Path, mode: ScanMode) -> Result<ScanSummary, ScanError> {
        let started = Instant::now();
        check_root(root)?;

        // Rows reconciled by this pass get last_checked >= pass_start.
        let pass_start = now_nanos();
        let mut summary = ScanSummary::new(root, mode);
        log::info!("Starting {mode} of {}", root.display());

        let files = self.discover(root, &mut summary)?;
        summary.files_seen = files.len();

        if !self.is_shutdown_requested() {
            self.reconcile_all(&files, &mut summary)?;
        }

        if mode == ScanMode::Update && !self.is_shutdown_requested() {
            self.detect_missing(root, pass_start, &mut summary)?;
        }

        summary.interrupted = self.is_shutdown_requested();
        summary.duration = started.elapsed();

        log::info!(
            "Finished {mode} of {}: {} files ({} new, {} re-hashed, {} unchanged, {} tombstoned), {} skipped",
            root.display(),
            summary.files_seen,
            summary.files_added,
            summary.files_rehashed,
            summary.files_unchanged,
            summary.files_tombstoned,
            summary.errors.len()
        );
        Ok(summary)
    }

    /// Walk the tree, recording folders as they appear and collecting files.
    fn discover(
        &self,
        root: &Path,
        summary: &mut ScanSummary,
    ) -> Result<Vec<FileEntry>, ScanError> {
        let mut walker = Walker::new(root, self.config.walker.clone());
        if let Some(flag) = &self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }

        if let Some(p) = self.progress() {
            p.on_phase_start(PHASE_WALKING, 0);
        }

        let mut files = Vec::new();
        let mut seen = 0usize;
        for item in walker.walk() {
            seen += 1;
            match item {
                Ok(WalkEntry::Directory(dir)) => match self.record_folder(&dir) {
                    Ok(()) => summary.folders_seen += 1,
                    Err(e) if e.is_recoverable() => summary.errors.push(e),
                    Err(e) => return Err(e),
                },
                Ok(WalkEntry::File(file)) => {
                    if let Some(p) = self.progress() {
                        p.on_progress(seen, &file.path.to_string_lossy());
                    }
                    files.push(file);
                }
                Err(e) if e.is_recoverable() => summary.errors.push(e),
                Err(e) => return Err(e),
            }
        }

        if let Some(p) = self.progress() {
            p.on_phase_end(PHASE_WALKING);
        }
        Ok(files)
    }

    fn record_folder(&self, dir: &DirectoryEntry) -> Result<(), ScanError> {
        let now = now_nanos();
        let folder = self
            .catalog
            .get_or_create_folder(self.computer.id, &dir.path, now)?;
        self.catalog
            .touch_folder(folder.id, dir.modified.map(unix_nanos), now)?;
        Ok(())
    }

    /// Reconcile discovered files on the hashing pool.
    fn reconcile_all(
        &self,
        files: &[FileEntry],
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        if let Some(p) = self.progress() {
            p.on_phase_start(PHASE_RECONCILE, files.len());
        }

        let done = AtomicUsize::new(0);
        let work = |entry: &FileEntry| -> Option<(u64, Result<FileOutcome, ScanError>)> {
            if self.is_shutdown_requested() {
                return None;
            }
            let result = self.reconcile_entry(entry);
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(p) = self.progress() {
                p.on_progress(current, &entry.path.to_string_lossy());
            }
            Some((entry.size, result))
        };

        let results: Vec<_> = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.io_threads.max(1))
            .build()
        {
            Ok(pool) => pool.install(|| files.par_iter().map(&work).collect()),
            Err(e) => {
                log::warn!("Failed to build hashing pool, hashing sequentially: {e}");
                files.iter().map(&work).collect()
            }
        };

        if let Some(p) = self.progress() {
            p.on_phase_end(PHASE_RECONCILE);
        }

        for (size, result) in results.into_iter().flatten() {
            match result {
                Ok(outcome) => summary.record(outcome, size),
                Err(e) if e.is_recoverable() => summary.errors.push(e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Reconcile live rows under `root` that this pass did not visit.
    fn detect_missing(
        &self,
        root: &Path,
        pass_start: i64,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let stale = self
            .catalog
            .stale_files_under(self.computer.id, root, pass_start)?;
        if stale.is_empty() {
            return Ok(());
        }

        log::debug!("{} cataloged files were not seen by the walk", stale.len());
        if let Some(p) = self.progress() {
            p.on_phase_start(PHASE_MISSING, stale.len());
        }

        for (i, record) in stale.iter().enumerate() {
            if self.is_shutdown_requested() {
                break;
            }
            if let Some(p) = self.progress() {
                p.on_progress(i + 1, &record.full_path().to_string_lossy());
            }
            match self.refresh_record(record) {
                Ok(outcome) => summary.record(outcome, record.size_bytes),
                Err(e) if e.is_recoverable() => summary.errors.push(e),
                Err(e) => return Err(e),
            }
        }

        if let Some(p) = self.progress() {
            p.on_phase_end(PHASE_MISSING);
        }
        Ok(())
    }

    /// Resolve the catalog row for a file, creating or refreshing it.
    ///
    /// A new row is hashed immediately. An existing row goes through the
    /// refresh logic rather than being returned as-is. Returns `None` when
    /// the path does not exist and was never cataloged.
    ///
    /// # Errors
    ///
    /// Recoverable errors ([`ScanError::is_recoverable`]) describe this file
    /// only; other errors mean the catalog or filesystem is unusable.
    pub fn get_or_create_file(
        &self,
        directory: &Path,
        file_name: &str,
    ) -> Result<Option<FileRecord>, ScanError> {
        let path = directory.join(file_name);
        let dir_key = path_key(directory)?;

        match self.observe(&path)? {
            Some(observed) => {
                let entry = FileEntry::new(
                    path,
                    observed.size,
                    from_unix_nanos(observed.modified),
                );
                self.reconcile_entry(&entry)?;
            }
            None => {
                let Some(record) = self
                    .catalog
                    .find_file(self.computer.id, &dir_key, file_name)?
                else {
                    return Ok(None);
                };
                self.refresh_record(&record)?;
            }
        }

        Ok(self
            .catalog
            .find_file(self.computer.id, &dir_key, file_name)?)
    }

    /// Re-check a cataloged file against the filesystem.
    ///
    /// Returns the updated row.
    ///
    /// # Errors
    ///
    /// See [`Scanner::get_or_create_file`].
    pub fn refresh(&self, record: &FileRecord) -> Result<FileRecord, ScanError> {
        self.refresh_record(record)?;
        Ok(self.catalog.file(record.id)?.unwrap_or_else(|| record.clone()))
    }

    fn refresh_record(&self, record: &FileRecord) -> Result<FileOutcome, ScanError> {
        let observed = self.observe(&record.full_path())?;
        self.apply_refresh(record, observed)
    }

    /// Reconcile one walked file.
    fn reconcile_entry(&self, entry: &FileEntry) -> Result<FileOutcome, ScanError> {
        let (dir_key, file_name) = split_path(&entry.path)?;
        let observed = Observed {
            size: entry.size,
            modified: unix_nanos(entry.modified),
        };

        if let Some(record) = self
            .catalog
            .find_file(self.computer.id, &dir_key, &file_name)?
        {
            return self.apply_refresh(&record, Some(observed));
        }

        let content_hash = self.hash(&entry.path);
        let hashed = content_hash.is_some();
        let (record, created) = self.catalog.insert_file(&NewFile {
            file_name,
            directory_path: dir_key,
            computer_id: self.computer.id,
            content_hash,
            size_bytes: observed.size,
            last_modified: observed.modified,
            last_checked: now_nanos(),
        })?;

        if created {
            log::trace!("Cataloged new file: {}", entry.path.display());
            Ok(FileOutcome::Added { hashed })
        } else {
            // Another writer created the row first; treat it as canonical.
            self.apply_refresh(&record, Some(observed))
        }
    }

    /// The refresh rules for an existing row given what is on disk.
    fn apply_refresh(
        &self,
        record: &FileRecord,
        observed: Option<Observed>,
    ) -> Result<FileOutcome, ScanError> {
        let now = now_nanos();

        let Some(observed) = observed else {
            self.catalog.mark_deleted(record.id, now)?;
            if record.is_deleted {
                return Ok(FileOutcome::StillMissing);
            }
            log::debug!("File disappeared: {}", record.full_path().display());
            return Ok(FileOutcome::Tombstoned);
        };

        if !needs_rehash(record, observed) {
            self.catalog.touch_file(record.id, now)?;
            return Ok(FileOutcome::Unchanged);
        }

        let path = record.full_path();
        log::trace!("Re-hashing changed file: {}", path.display());
        let content_hash = self.hash(&path);
        let hashed = content_hash.is_some();
        self.catalog.record_hash(
            record.id,
            content_hash.as_deref(),
            observed.size,
            observed.modified,
            now,
        )?;
        Ok(FileOutcome::Rehashed { hashed })
    }

    fn hash(&self, path: &Path) -> Option<String> {
        self.hasher.content_hash(path)
    }

    /// Stat a path. `None` means there is no regular file there any more.
    ///
    /// Links are followed whatever the walk setting: a row cataloged through
    /// a link still exists while the link resolves to a file.
    fn observe(&self, path: &Path) -> Result<Option<Observed>, ScanError> {
        match fs::metadata(path) {
            Ok(m) if m.is_file() => Ok(Some(observed_from(&m))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ScanError::from_io(path, e)),
        }
    }
}

fn observed_from(metadata: &Metadata) -> Observed {
    Observed {
        size: metadata.len(),
        modified: unix_nanos(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
    }
}

/// Rules for when a known file must be hashed again.
fn needs_rehash(record: &FileRecord, observed: Observed) -> bool {
    record.is_deleted
        || record.last_modified != observed.modified
        || record.size_bytes != observed.size
        // An earlier read failed; retry now that the file may be readable.
        || (record.content_hash.is_none() && observed.size > 0)
}

fn check_root(root: &Path) -> Result<(), ScanError> {
    match fs::metadata(root) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(ScanError::NotADirectory(root.to_path_buf())),
        Err(e) => Err(ScanError::from_io(root, e)),
    }
}

/// Split a file path into its catalog `(directory_path, file_name)` key.
fn split_path(path: &Path) -> Result<(String, String), ScanError> {
    let directory = path
        .parent()
        .ok_or_else(|| ScanError::NotFound(path.to_path_buf()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ScanError::InvalidPath(path.to_path_buf()))?;
    Ok((path_key(directory)?, file_name.to_string()))
}
