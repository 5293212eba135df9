//! The operations exposed to the command line.
//!
//! An [`Engine`] owns one shared catalog handle and hands it to the scanner,
//! resolver and deleter it builds. Each method is one independent command:
//!
//! | Method | Scope | Deletes |
//! |---|---|---|
//! | [`Engine::scan`] | | |
//! | [`Engine::update`] | | |
//! | [`Engine::list_duplicates`] | prune | optional |
//! | [`Engine::list_neighbors`] | same directory | optional |
//! | [`Engine::kill_from_pc`] | cross host | optional |
//! | [`Engine::print_files`] | | |
//!
//! Roots are canonicalized first, so catalog keys are always absolute.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;

use crate::actions::{
    BatchDeleteResult, DeleteConfig, DeleteError, Deleter, HousekeepReport, Housekeeper,
};
use crate::catalog::{Catalog, CatalogResult, Computer, FileRecord};
use crate::config::Config;
use crate::duplicates::{DuplicateMatch, ResolutionReport, Resolver, Scope};
use crate::progress::ProgressCallback;
use crate::scanner::{ScanError, ScanSummary, Scanner, ScannerConfig, WalkerConfig};

/// Behavior switches for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub walker: WalkerConfig,
    pub io_threads: usize,
    pub delete: DeleteConfig,
    /// Reconcile a subtree before resolving duplicates in it.
    pub refresh_before_resolve: bool,
    /// Remove emptied directories after deleting prune or cross-host matches.
    pub remove_empty_dirs: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineOptions {
    /// Derive engine options from the application configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            walker: WalkerConfig::new(
                config.follow_symlinks,
                config.skip_hidden,
                config.ignore_patterns.clone(),
            ),
            io_threads: config.io_threads.max(1),
            delete: DeleteConfig {
                use_trash: config.use_trash,
                verify_mtime: config.verify_before_delete,
            },
            refresh_before_resolve: config.refresh_before_resolve,
            remove_empty_dirs: config.remove_empty_dirs,
        }
    }
}

/// Everything a resolution command did.
#[derive(Debug, Serialize)]
pub struct ResolutionOutcome {
    /// The refresh pass run before resolving, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<ScanSummary>,
    pub report: ResolutionReport,
    /// Present only when deletion was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion: Option<BatchDeleteResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub housekeeping: Option<HousekeepReport>,
}

impl ResolutionOutcome {
    /// Whether some files were skipped or could not be deleted.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.refresh.as_ref().is_some_and(ScanSummary::has_errors)
            || self
                .deletion
                .as_ref()
                .is_some_and(|d| !d.all_succeeded())
    }

    /// Whether any stage stopped because of a shutdown request.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.refresh.as_ref().is_some_and(|r| r.interrupted)
            || self.report.interrupted
            || self.deletion.as_ref().is_some_and(|d| d.interrupted)
    }
}

/// Cataloged files under one root.
#[derive(Debug, Serialize)]
pub struct FileListing {
    pub root: PathBuf,
    pub files: Vec<FileRecord>,
}

impl FileListing {
    /// Sum of file sizes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Wires the catalog, scanner, resolver and deleter for one computer.
pub struct Engine {
    catalog: Arc<Catalog>,
    scanner: Scanner,
    resolver: Resolver,
    deleter: Deleter,
    housekeeper: Housekeeper,
    options: EngineOptions,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("catalog", &self.catalog)
            .field("computer", self.scanner.computer())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine acting as `computer_name`.
    ///
    /// The computer row is created on first use.
    ///
    /// # Errors
    ///
    /// Fails if the catalog cannot be written.
    pub fn new(
        catalog: Arc<Catalog>,
        computer_name: &str,
        options: EngineOptions,
        shutdown_flag: Arc<AtomicBool>,
        progress: Option<Arc<dyn ProgressCallback>>,
    ) -> CatalogResult<Self> {
        let computer = catalog.get_or_create_computer(computer_name)?;
        log::debug!("Acting as computer {} (id {})", computer.name, computer.id);

        let mut scanner_config = ScannerConfig::default()
            .with_walker(options.walker.clone())
            .with_io_threads(options.io_threads)
            .with_shutdown_flag(Arc::clone(&shutdown_flag));
        if let Some(progress) = progress {
            scanner_config = scanner_config.with_progress_callback(progress);
        }

        Ok(Self {
            scanner: Scanner::new(Arc::clone(&catalog), computer, scanner_config),
            resolver: Resolver::new(Arc::clone(&catalog))
                .with_shutdown_flag(Arc::clone(&shutdown_flag)),
            deleter: Deleter::new(Arc::clone(&catalog), options.delete.clone())
                .with_shutdown_flag(Arc::clone(&shutdown_flag)),
            housekeeper: Housekeeper::new().with_shutdown_flag(shutdown_flag),
            catalog,
            options,
        })
    }

    /// The computer this engine acts for.
    #[must_use]
    pub fn computer(&self) -> &Computer {
        self.scanner.computer()
    }

    /// The shared catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Populate or refresh the catalog for a subtree.
    ///
    /// # Errors
    ///
    /// See [`Scanner::scan`].
    pub fn scan(&self, root: &Path) -> Result<ScanSummary, ScanError> {
        self.scanner.scan(&canonical_root(root)?)
    }

    /// Refresh a subtree and tombstone files that disappeared from it.
    ///
    /// # Errors
    ///
    /// See [`Scanner::update`].
    pub fn update(&self, root: &Path) -> Result<ScanSummary, ScanError> {
        self.scanner.update(&canonical_root(root)?)
    }

    /// Files under `root` with a copy elsewhere on this computer.
    ///
    /// # Errors
    ///
    /// Fails if the root is unusable or the catalog is unavailable.
    pub fn list_duplicates(
        &self,
        root: &Path,
        delete: bool,
    ) -> Result<ResolutionOutcome, ScanError> {
        self.resolve(root, Scope::Prune, delete)
    }

    /// Copies under `root` that share a directory.
    ///
    /// # Errors
    ///
    /// Fails if the root is unusable or the catalog is unavailable.
    pub fn list_neighbors(
        &self,
        root: &Path,
        delete: bool,
    ) -> Result<ResolutionOutcome, ScanError> {
        self.resolve(root, Scope::SameDirectory, delete)
    }

    /// Files under `root` already cataloged on another computer.
    ///
    /// # Errors
    ///
    /// Fails if the root is unusable or the catalog is unavailable.
    pub fn kill_from_pc(&self, root: &Path, delete: bool) -> Result<ResolutionOutcome, ScanError> {
        self.resolve(root, Scope::CrossHost, delete)
    }

    /// Cataloged, non-deleted files of this computer under `root`.
    ///
    /// The root does not have to exist any more.
    ///
    /// # Errors
    ///
    /// Fails if the catalog is unavailable or the root is not valid UTF-8.
    pub fn print_files(&self, root: &Path) -> Result<FileListing, ScanError> {
        let root = match root.canonicalize() {
            Ok(p) => p,
            Err(_) => std::path::absolute(root).map_err(|e| ScanError::from_io(root, e))?,
        };
        let files = self.catalog.live_files_under(self.computer().id, &root)?;
        Ok(FileListing { root, files })
    }

    fn resolve(
        &self,
        root: &Path,
        scope: Scope,
        delete: bool,
    ) -> Result<ResolutionOutcome, ScanError> {
        let root = canonical_root(root)?;

        // Files gone from disk must be tombstoned before they are resolved.
        let refresh = if self.options.refresh_before_resolve {
            Some(self.scanner.update(&root)?)
        } else {
            None
        };

        let report = self.resolver.resolve(self.computer().id, &root, scope)?;

        let mut outcome = ResolutionOutcome {
            refresh,
            report,
            deletion: None,
            housekeeping: None,
        };

        // A partial report must not drive deletion.
        if !delete || outcome.interrupted() {
            return Ok(outcome);
        }

        outcome.deletion = Some(self.delete_matches(&outcome.report.matches)?);

        if self.options.remove_empty_dirs && scope != Scope::SameDirectory {
            outcome.housekeeping = Some(self.housekeeper.remove_empty_dirs(&root));
        }
        Ok(outcome)
    }

    /// Delete every candidate whose original is still in place.
    fn delete_matches(&self, matches: &[DuplicateMatch]) -> Result<BatchDeleteResult, ScanError> {
        self.deleter.delete_batch(matches, |m| self.check_original(m))
    }

    /// Confirm a local original still exists with the candidate's content.
    ///
    /// Copies on other computers cannot be checked and are trusted.
    fn check_original(&self, m: &DuplicateMatch) -> Result<Option<DeleteError>, ScanError> {
        if m.original.computer_id != self.computer().id {
            return Ok(None);
        }

        let unavailable = || DeleteError::OriginalUnavailable {
            path: m.candidate.full_path(),
            original: m.original.full_path(),
        };

        match self.scanner.refresh(&m.original) {
            Ok(current)
                if current.is_matchable() && current.content_hash == m.candidate.content_hash =>
            {
                Ok(None)
            }
            Ok(_) => Ok(Some(unavailable())),
            Err(e) if e.is_recoverable() => {
                log::debug!("Cannot check original: {e}");
                Ok(Some(unavailable()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Canonicalize a root that must be an existing directory.
fn canonical_root(root: &Path) -> Result<PathBuf, ScanError> {
    let canonical = root
        .canonicalize()
        .map_err(|e| ScanError::from_io(root, e))?;
    if !canonical.is_dir() {
        return Err(ScanError::NotADirectory(canonical));
    }
    if canonical.to_str().is_none() {
        return Err(ScanError::InvalidPath(canonical));
    }
    Ok(canonical)
}
