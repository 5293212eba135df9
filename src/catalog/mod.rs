//! Persistent catalog of computers, folders and files.
//!
//! The catalog is the single source of truth shared across scan passes and
//! across machines writing to the same database. Other components hold only
//! row ids between calls.
//!
//! # Architecture
//!
//! * [`database`]: SQLite persistence, schema management, and the scoped
//!   duplicate queries.
//! * [`entry`]: plain row types and timestamp helpers.
//! * [`paths`]: conversion of filesystem paths to catalog keys.
//!
//! # Natural keys
//!
//! * Computer: `name`
//! * Folder: `(computer_id, absolute_path)`
//! * File: `(computer_id, directory_path, file_name)`
//!
//! File rows are never removed. A missing or deleted file becomes a
//! tombstone (`is_deleted`) that keeps its last content hash.

pub mod database;
pub mod entry;
pub mod paths;

pub use database::{Catalog, CatalogError, CatalogResult, CatalogStats};
pub use entry::{
    from_unix_nanos, now_nanos, unix_nanos, Computer, ComputerId, FileId, FileRecord, Folder,
    FolderId, NewFile,
};
pub use paths::{path_key, subtree_prefix};
