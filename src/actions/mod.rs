//! File actions module.
//!
//! This module provides functionality for:
//! - Deleting resolved duplicates and tombstoning their records
//! - Cleaning up directories emptied by those deletions
//!
//! # Deletion
//!
//! The delete module provides:
//! - Permanent deletion (default) or move to system trash
//! - TOCTOU verification against the catalog record
//! - Batch operations that report per-file failures
//!
//! # Housekeeping
//!
//! ```no_run
//! use dupecatalog::actions::Housekeeper;
//! use std::path::Path;
//!
//! let report = Housekeeper::new().remove_empty_dirs(Path::new("/data/import"));
//! println!("removed {} directories", report.removed_count());
//! ```

pub mod delete;
pub mod housekeep;

// Re-export commonly used types
pub use delete::{
    delete_to_trash, permanent_delete, BatchDeleteResult, DeleteConfig, DeleteError,
    DeleteFailure, DeleteOutcome, DeleteResult, Deleter,
};
pub use housekeep::{HousekeepReport, Housekeeper};
