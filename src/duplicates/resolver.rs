//! Scoped duplicate resolution over the catalog.
//!
//! # Overview
//!
//! A resolution pass takes every live, hashed file of the current computer
//! under a root and looks for an existing copy under one of three scopes:
//!
//! - [`Scope::SameDirectory`]: another name in the same directory.
//! - [`Scope::CrossHost`]: any file on a different computer.
//! - [`Scope::Prune`]: a file on the same computer outside the root.
//!
//! The pass only reads the catalog. Its output is a [`ResolutionReport`] of
//! `(candidate, original)` pairs that a caller may hand to the deleter.
//!
//! # Tie-break
//!
//! When several copies qualify, the one with the lowest catalog row id is
//! chosen. Within one pass a file chosen for removal is never used as an
//! original, and a file used as an original is never offered for removal,
//! so acting on the whole report always leaves one copy in place.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{Catalog, CatalogResult, ComputerId, FileId, FileRecord};

/// Matching policy for a resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Copies within one directory.
    SameDirectory,
    /// Local files already present on another computer.
    CrossHost,
    /// Files under the root with a copy elsewhere on the same computer.
    Prune,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SameDirectory => write!(f, "same-directory"),
            Self::CrossHost => write!(f, "cross-host"),
            Self::Prune => write!(f, "prune"),
        }
    }
}

/// A file that duplicates an existing copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateMatch {
    /// The file that may be removed.
    pub candidate: FileRecord,
    /// The copy that stays.
    pub original: FileRecord,
}

impl DuplicateMatch {
    /// Size of the redundant copy.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.candidate.size_bytes
    }
}

/// Result of a resolution pass.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub scope: Scope,
    pub root: PathBuf,
    /// Hashed, live files considered as candidates.
    pub files_examined: usize,
    pub matches: Vec<DuplicateMatch>,
    /// Total size of all candidates.
    pub duplicate_bytes: u64,
    /// The pass stopped early because shutdown was requested.
    pub interrupted: bool,
}

impl ResolutionReport {
    fn new(scope: Scope, root: &Path) -> Self {
        Self {
            scope,
            root: root.to_path_buf(),
            files_examined: 0,
            matches: Vec::new(),
            duplicate_bytes: 0,
            interrupted: false,
        }
    }

    /// Number of duplicates found.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Whether no duplicates were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Runs scoped duplicate queries against a catalog.
#[derive(Debug)]
pub struct Resolver {
    catalog: Arc<Catalog>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Resolver {
    /// Create a resolver over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            shutdown_flag: None,
        }
    }

    /// Set a shutdown flag that stops a pass between candidates.
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

    /// Find duplicates of `computer_id`'s files under `root`.
    ///
    /// # Arguments
    ///
    /// * `computer_id` - The computer whose files are candidates
    /// * `root` - Absolute root of the subtree to resolve
    /// * `scope` - Which copies count as an existing original
    ///
    /// # Errors
    ///
    /// Returns an error only if the catalog cannot be queried.
    pub fn resolve(
        &self,
        computer_id: ComputerId,
        root: &Path,
        scope: Scope,
    ) -> CatalogResult<ResolutionReport> {
        let mut report = ResolutionReport::new(scope, root);
        let candidates: Vec<FileRecord> = self
            .catalog
            .live_files_under(computer_id, root)?
            .into_iter()
            .filter(FileRecord::is_matchable)
            .collect();

        log::debug!(
            "Resolving {} candidates under {} ({scope})",
            candidates.len(),
            root.display()
        );

        let mut scheduled: HashSet<FileId> = HashSet::new();
        let mut kept: HashSet<FileId> = HashSet::new();

        for candidate in candidates {
            if self.is_shutdown_requested() {
                report.interrupted = true;
                break;
            }
            report.files_examined += 1;

            if kept.contains(&candidate.id) {
                continue;
            }

            let copies = match scope {
                Scope::SameDirectory => self.catalog.same_directory_copies(&candidate)?,
                Scope::CrossHost => self.catalog.cross_host_copies(&candidate)?,
                Scope::Prune => self.catalog.copies_outside(&candidate, root)?,
            };

            // Copies come back in row-id order; the first eligible one wins.
            let Some(original) = copies.into_iter().find(|c| !scheduled.contains(&c.id)) else {
                continue;
            };

            log::trace!(
                "{} duplicates {}",
                candidate.full_path().display(),
                original.full_path().display()
            );
            scheduled.insert(candidate.id);
            kept.insert(original.id);
            report.duplicate_bytes += candidate.size_bytes;
            report.matches.push(DuplicateMatch {
                candidate,
                original,
            });
        }

        log::info!(
            "Found {} {scope} duplicates under {}",
            report.match_count(),
            root.display()
        );
        Ok(report)
    }
}
