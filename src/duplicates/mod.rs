//! Duplicate detection module.
//!
//! Duplicates are found by querying the catalog, not by comparing files on
//! disk. See [`resolver`] for the three matching scopes.

pub mod resolver;

pub use resolver::{DuplicateMatch, ResolutionReport, Resolver, Scope};
