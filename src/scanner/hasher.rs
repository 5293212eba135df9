//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//! This module provides the `Hasher` struct for computing BLAKE3 hashes
//! of file contents using memory-efficient streaming. Files are read in
//! fixed 10 KiB chunks, so a multi-gigabyte file never sits in memory.
//!
//! The catalog stores digests as lowercase hex. A file that cannot be read,
//! or that is empty, has no digest at all: see [`Hasher::content_hash`].

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use super::HashError;

/// Size of each read while streaming file contents.
pub const CHUNK_SIZE: usize = 10 * 1024;

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Streaming content hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    chunk_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher using the standard chunk size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Create a hasher with a custom read size (minimum 1 byte).
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Hash everything readable from `reader`.
    ///
    /// Returns the digest and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Propagates any read error other than `Interrupted`, which is retried.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<(Hash, u64)> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..n]);
            total += n as u64;
        }

        Ok((*hasher.finalize().as_bytes(), total))
    }

    /// Compute the full-content hash of a file.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file doesn't exist
    /// - `PermissionDenied` if the file can't be opened or read
    /// - `Io` for any other failure
    pub fn full_hash(&self, path: &Path) -> Result<(Hash, u64), HashError> {
        let map_err = |e: io::Error| match e.kind() {
            io::ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => HashError::PermissionDenied(path.to_path_buf()),
            _ => HashError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        };

        let file = File::open(path).map_err(map_err)?;
        self.hash_reader(file).map_err(map_err)
    }

    /// Hex digest for the catalog, or `None` if no hash is available.
    ///
    /// "Unavailable" covers unreadable files and empty files alike and is
    /// not an error: the caller records the file without a hash and it stays
    /// out of duplicate matching until a later pass hashes it.
    #[must_use]
    pub fn content_hash(&self, path: &Path) -> Option<String> {
        match self.full_hash(path) {
            Ok((_, 0)) => {
                log::trace!("Empty file, no hash: {}", path.display());
                None
            }
            Ok((hash, _)) => Some(hash_to_hex(&hash)),
            Err(e) => {
                log::debug!("Hash unavailable: {e}");
                None
            }
        }
    }
}

/// Lowercase hex encoding of a digest.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}

/// Parse a 64-character hex digest.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    blake3::Hash::from_hex(hex).ok().map(|h| *h.as_bytes())
}
