//! Path-to-key conversion for catalog rows.
//!
//! Catalog keys are UTF-8 strings. Subtree membership is a plain prefix test
//! on whole components: `/data` contains `/data/x` but not `/database`.

use std::path::{Path, MAIN_SEPARATOR, MAIN_SEPARATOR_STR};

use super::database::{CatalogError, CatalogResult};

/// Convert a path to its catalog key.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidPath`] if the path is not valid UTF-8.
pub fn path_key(path: &Path) -> CatalogResult<String> {
    let s = path
        .to_str()
        .ok_or_else(|| CatalogError::InvalidPath(path.to_path_buf()))?;
    Ok(trim_separator(s).to_string())
}

/// Strip one trailing separator unless the path is a filesystem root.
fn trim_separator(s: &str) -> &str {
    if s.len() > 1 && s.ends_with(MAIN_SEPARATOR) && !is_drive_root(s) {
        &s[..s.len() - 1]
    } else {
        s
    }
}

// "C:\" style roots keep their separator.
fn is_drive_root(s: &str) -> bool {
    cfg!(windows) && s.len() == 3 && s.as_bytes()[1] == b':'
}

/// Prefix that every strict descendant of `root` starts with.
#[must_use]
pub fn subtree_prefix(root: &str) -> String {
    if root.ends_with(MAIN_SEPARATOR) {
        root.to_string()
    } else {
        format!("{root}{MAIN_SEPARATOR_STR}")
    }
}
