//! SQLite-backed catalog store.
//!
//! One [`Catalog`] handle is shared (via `Arc`) by every component of a run.
//! The connection sits behind a mutex so scan workers can hash in parallel
//! and serialize only their short reads and writes. Every write is a single
//! statement, so a crash never leaves a half-written row behind.
//!
//! Natural keys are enforced by `UNIQUE` constraints. Creation uses
//! `INSERT .. ON CONFLICT DO NOTHING` followed by a fetch, which makes
//! concurrent creators of the same key converge on one row.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::entry::{Computer, ComputerId, FileId, FileRecord, Folder, FolderId, NewFile};
use super::paths::{path_key, subtree_prefix};

/// Current schema version stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS computers (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS folders (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    absolute_path TEXT NOT NULL,
    parent_id     INTEGER,
    computer_id   INTEGER NOT NULL REFERENCES computers(id),
    last_modified INTEGER,
    last_checked  INTEGER NOT NULL,
    UNIQUE (computer_id, absolute_path)
);

CREATE TABLE IF NOT EXISTS files (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name      TEXT NOT NULL,
    directory_path TEXT NOT NULL,
    computer_id    INTEGER NOT NULL REFERENCES computers(id),
    content_hash   TEXT,
    size_bytes     INTEGER NOT NULL,
    last_modified  INTEGER NOT NULL,
    last_checked   INTEGER NOT NULL,
    is_deleted     INTEGER NOT NULL DEFAULT 0,
    UNIQUE (computer_id, directory_path, file_name)
);

CREATE INDEX IF NOT EXISTS idx_files_hash ON files (content_hash);
CREATE INDEX IF NOT EXISTS idx_files_location ON files (computer_id, directory_path);
";

const FILE_COLUMNS: &str = "id, file_name, directory_path, computer_id, content_hash, \
                            size_bytes, last_modified, last_checked, is_deleted";

const FOLDER_COLUMNS: &str =
    "id, name, absolute_path, parent_id, computer_id, last_modified, last_checked";

/// Only rows that can take part in duplicate matching.
const MATCHABLE: &str = "is_deleted = 0 AND content_hash IS NOT NULL AND content_hash != ''";

/// Errors raised by the catalog store.
///
/// Any of these means the catalog itself is unusable for the current
/// operation, which is fatal to the pass that hit it.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    /// The underlying SQLite call failed.
    #[error("catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The catalog directory could not be created.
    #[error("failed to prepare catalog location {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A thread panicked while holding the connection.
    #[error("catalog connection lock poisoned")]
    Poisoned,

    /// The path cannot be stored as a text key.
    #[error("path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    /// The database was written by a newer, incompatible version.
    #[error("unsupported catalog schema version {found} (expected {expected})")]
    SchemaVersion { found: i64, expected: i64 },
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Row counts, used for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CatalogStats {
    pub computers: u64,
    pub folders: u64,
    pub files: u64,
    pub tombstoned: u64,
}

/// Durable record of computers, folders and files.
pub struct Catalog {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Opens or creates a catalog at the specified path.
    ///
    /// The parent directory is created if needed and the schema is
    /// initialized on first use.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created, the database cannot be
    /// opened, or the schema version is newer than this build understands.
    pub fn open(path: &Path) -> CatalogResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CatalogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::trace!("Catalog journal mode: {mode}");
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Opens a private in-memory catalog.
    pub fn open_in_memory() -> CatalogResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> CatalogResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(CatalogError::SchemaVersion {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        log::debug!(
            "Catalog opened at {}",
            path.as_ref()
                .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
        );

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the database file, `None` for in-memory catalogs.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> CatalogResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CatalogError::Poisoned)
    }

    // ── Computers ────────────────────────────────────────────────────

    /// Resolve a computer by name, creating it on first sight.
    ///
    /// Idempotent: concurrent callers with the same name get the same row.
    pub fn get_or_create_computer(&self, name: &str) -> CatalogResult<Computer> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO computers (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![name],
        )?;
        let computer = conn.query_row(
            "SELECT id, name FROM computers WHERE name = ?1",
            params![name],
            |row| {
                Ok(Computer {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )?;
        Ok(computer)
    }

    /// All known computers in creation order.
    pub fn computers(&self) -> CatalogResult<Vec<Computer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM computers ORDER BY id")?;
        let computers = stmt
            .query_map([], |row| {
                Ok(Computer {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(computers)
    }

    // ── Folders ──────────────────────────────────────────────────────

    /// Resolve a folder by its absolute path, creating it if absent.
    ///
    /// A new folder links to its parent only if the parent path is already
    /// cataloged for the same computer; otherwise `parent_id` stays unset.
    pub fn get_or_create_folder(
        &self,
        computer_id: ComputerId,
        absolute_path: &Path,
        now: i64,
    ) -> CatalogResult<Folder> {
        let key = path_key(absolute_path)?;
        let name = absolute_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&key)
            .to_string();
        let parent_key = match absolute_path.parent() {
            Some(parent) => Some(path_key(parent)?),
            None => None,
        };

        let conn = self.conn()?;
        let parent_id: Option<FolderId> = match parent_key {
            Some(parent_key) => conn
                .query_row(
                    "SELECT id FROM folders WHERE computer_id = ?1 AND absolute_path = ?2",
                    params![computer_id, parent_key],
                    |row| row.get(0),
                )
                .optional()?,
            None => None,
        };

        conn.execute(
            "INSERT INTO folders (name, absolute_path, parent_id, computer_id, last_checked)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(computer_id, absolute_path) DO NOTHING",
            params![name, key, parent_id, computer_id, now],
        )?;

        let folder = conn.query_row(
            &format!(
                "SELECT {FOLDER_COLUMNS} FROM folders WHERE computer_id = ?1 AND absolute_path = ?2"
            ),
            params![computer_id, key],
            folder_from_row,
        )?;
        Ok(folder)
    }

    /// Record a visit to a folder.
    pub fn touch_folder(
        &self,
        id: FolderId,
        last_modified: Option<i64>,
        now: i64,
    ) -> CatalogResult<()> {
        self.conn()?.execute(
            "UPDATE folders SET last_modified = ?1, last_checked = ?2 WHERE id = ?3",
            params![last_modified, now, id],
        )?;
        Ok(())
    }

    /// Look up a folder by id.
    pub fn folder(&self, id: FolderId) -> CatalogResult<Option<Folder>> {
        let folder = self
            .conn()?
            .query_row(
                &format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1"),
                params![id],
                folder_from_row,
            )
            .optional()?;
        Ok(folder)
    }

    /// Look up a folder by its natural key.
    pub fn find_folder(
        &self,
        computer_id: ComputerId,
        absolute_path: &Path,
    ) -> CatalogResult<Option<Folder>> {
        let key = path_key(absolute_path)?;
        let folder = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {FOLDER_COLUMNS} FROM folders WHERE computer_id = ?1 AND absolute_path = ?2"
                ),
                params![computer_id, key],
                folder_from_row,
            )
            .optional()?;
        Ok(folder)
    }

    /// Resolve a folder's parent through its weak `parent_id` link.
    pub fn parent_of(&self, folder: &Folder) -> CatalogResult<Option<Folder>> {
        match folder.parent_id {
            Some(id) => self.folder(id),
            None => Ok(None),
        }
    }

    // ── Files ────────────────────────────────────────────────────────

    /// Look up a file by its natural key.
    pub fn find_file(
        &self,
        computer_id: ComputerId,
        directory_path: &str,
        file_name: &str,
    ) -> CatalogResult<Option<FileRecord>> {
        let record = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {FILE_COLUMNS} FROM files
                     WHERE computer_id = ?1 AND directory_path = ?2 AND file_name = ?3"
                ),
                params![computer_id, directory_path, file_name],
                file_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Look up a file by id.
    pub fn file(&self, id: FileId) -> CatalogResult<Option<FileRecord>> {
        let record = self
            .conn()?
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                params![id],
                file_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Insert a fully populated file row, or fetch the row that won the race.
    ///
    /// Returns the canonical row and whether this call created it. When the
    /// natural key already exists the supplied values are discarded; the
    /// caller decides whether the existing row needs a refresh.
    pub fn insert_file(&self, new: &NewFile) -> CatalogResult<(FileRecord, bool)> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO files (file_name, directory_path, computer_id, content_hash,
                                size_bytes, last_modified, last_checked, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
             ON CONFLICT(computer_id, directory_path, file_name) DO NOTHING",
            params![
                new.file_name,
                new.directory_path,
                new.computer_id,
                new.content_hash,
                size_to_sql(new.size_bytes),
                new.last_modified,
                new.last_checked,
            ],
        )?;

        let record = conn.query_row(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE computer_id = ?1 AND directory_path = ?2 AND file_name = ?3"
            ),
            params![new.computer_id, new.directory_path, new.file_name],
            file_from_row,
        )?;

        if inserted == 0 {
            log::debug!(
                "File row already existed, using canonical row {}: {}",
                record.id,
                record.full_path().display()
            );
        }
        Ok((record, inserted > 0))
    }

    /// Store a fresh hash result and clear any tombstone.
    pub fn record_hash(
        &self,
        id: FileId,
        content_hash: Option<&str>,
        size_bytes: u64,
        last_modified: i64,
        now: i64,
    ) -> CatalogResult<()> {
        self.conn()?.execute(
            "UPDATE files
             SET content_hash = ?1, size_bytes = ?2, last_modified = ?3,
                 last_checked = ?4, is_deleted = 0
             WHERE id = ?5",
            params![content_hash, size_to_sql(size_bytes), last_modified, now, id],
        )?;
        Ok(())
    }

    /// Refresh only the reconciliation timestamp.
    pub fn touch_file(&self, id: FileId, now: i64) -> CatalogResult<()> {
        self.conn()?.execute(
            "UPDATE files SET last_checked = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    }

    /// Tombstone a file. The content hash is kept for historical matching.
    pub fn mark_deleted(&self, id: FileId, now: i64) -> CatalogResult<()> {
        self.conn()?.execute(
            "UPDATE files SET is_deleted = 1, last_checked = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    }

    /// Non-tombstoned files of one computer under `root`, ordered by path.
    pub fn live_files_under(
        &self,
        computer_id: ComputerId,
        root: &Path,
    ) -> CatalogResult<Vec<FileRecord>> {
        let root = path_key(root)?;
        let prefix = subtree_prefix(&root);
        self.query_files(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE computer_id = ?1 AND is_deleted = 0
                   AND (directory_path = ?2 OR substr(directory_path, 1, length(?3)) = ?3)
                 ORDER BY directory_path, file_name"
            ),
            params![computer_id, root, prefix],
        )
    }

    /// Live files under `root` that were not reconciled since `checked_before`.
    pub fn stale_files_under(
        &self,
        computer_id: ComputerId,
        root: &Path,
        checked_before: i64,
    ) -> CatalogResult<Vec<FileRecord>> {
        let root = path_key(root)?;
        let prefix = subtree_prefix(&root);
        self.query_files(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE computer_id = ?1 AND is_deleted = 0 AND last_checked < ?4
                   AND (directory_path = ?2 OR substr(directory_path, 1, length(?3)) = ?3)
                 ORDER BY id"
            ),
            params![computer_id, root, prefix, checked_before],
        )
    }

    // ── Duplicate queries ────────────────────────────────────────────
    //
    // Each returns matchable copies in row-id order and never the file itself.

    /// Copies in the same directory under a different name.
    pub fn same_directory_copies(&self, file: &FileRecord) -> CatalogResult<Vec<FileRecord>> {
        let Some(hash) = file.content_hash.as_deref() else {
            return Ok(Vec::new());
        };
        self.query_files(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE {MATCHABLE} AND content_hash = ?1 AND computer_id = ?2
                   AND directory_path = ?3 AND file_name != ?4 AND id != ?5
                 ORDER BY id"
            ),
            params![
                hash,
                file.computer_id,
                file.directory_path,
                file.file_name,
                file.id
            ],
        )
    }

    /// Copies cataloged on any other computer.
    pub fn cross_host_copies(&self, file: &FileRecord) -> CatalogResult<Vec<FileRecord>> {
        let Some(hash) = file.content_hash.as_deref() else {
            return Ok(Vec::new());
        };
        self.query_files(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE {MATCHABLE} AND content_hash = ?1 AND computer_id != ?2
                 ORDER BY id"
            ),
            params![hash, file.computer_id],
        )
    }

    /// Copies on the same computer whose directory lies outside `root`.
    pub fn copies_outside(
        &self,
        file: &FileRecord,
        root: &Path,
    ) -> CatalogResult<Vec<FileRecord>> {
        let Some(hash) = file.content_hash.as_deref() else {
            return Ok(Vec::new());
        };
        let root = path_key(root)?;
        let prefix = subtree_prefix(&root);
        self.query_files(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE {MATCHABLE} AND content_hash = ?1 AND computer_id = ?2 AND id != ?3
                   AND directory_path != ?4 AND substr(directory_path, 1, length(?5)) != ?5
                 ORDER BY id"
            ),
            params![hash, file.computer_id, file.id, root, prefix],
        )
    }

    /// Row counts across the whole catalog.
    pub fn stats(&self) -> CatalogResult<CatalogStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> CatalogResult<u64> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or(0))
        };
        Ok(CatalogStats {
            computers: count("SELECT COUNT(*) FROM computers")?,
            folders: count("SELECT COUNT(*) FROM folders")?,
            files: count("SELECT COUNT(*) FROM files")?,
            tombstoned: count("SELECT COUNT(*) FROM files WHERE is_deleted = 1")?,
        })
    }

    fn query_files<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> CatalogResult<Vec<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params, file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn size_to_sql(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let size: i64 = row.get(5)?;
    Ok(FileRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        directory_path: row.get(2)?,
        computer_id: row.get(3)?,
        content_hash: row.get(4)?,
        size_bytes: u64::try_from(size).unwrap_or(0),
        last_modified: row.get(6)?,
        last_checked: row.get(7)?,
        is_deleted: row.get(8)?,
    })
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get(0)?,
        name: row.get(1)?,
        absolute_path: row.get(2)?,
        parent_id: row.get(3)?,
        computer_id: row.get(4)?,
        last_modified: row.get(5)?,
        last_checked: row.get(6)?,
    })
}
