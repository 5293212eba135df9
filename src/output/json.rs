//! JSON output for command results.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "command": "kill-from-pc",
//!   "computer": "hostA",
//!   "exit_code": 0,
//!   "exit_code_name": "DC000",
//!   "results": [
//!     {
//!       "kind": "resolution",
//!       "report": {
//!         "scope": "cross-host",
//!         "root": "/data",
//!         "files_examined": 12,
//!         "matches": [{ "candidate": { ... }, "original": { ... } }],
//!         "duplicate_bytes": 1024,
//!         "interrupted": false
//!       },
//!       "deletion": { "successes": [...], "failures": [...], "bytes_freed": 1024 }
//!     }
//!   ]
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use super::CommandResult;
use crate::error::ExitCode;

/// Complete JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonOutput<'a> {
    /// Subcommand that produced the results
    pub command: &'a str,
    /// Computer name the command acted as
    pub computer: &'a str,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DC000")
    pub exit_code_name: &'static str,
    /// One entry per path argument
    pub results: &'a [CommandResult],
}

impl<'a> JsonOutput<'a> {
    /// Create the output document.
    ///
    /// # Arguments
    ///
    /// * `command` - Subcommand name
    /// * `computer` - Computer the command acted as
    /// * `results` - Results in path order
    /// * `exit_code` - The exit code for this run
    #[must_use]
    pub fn new(
        command: &'a str,
        computer: &'a str,
        results: &'a [CommandResult],
        exit_code: ExitCode,
    ) -> Self {
        Self {
            command,
            computer,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix(),
            results,
        }
    }

    /// Serialize to a compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer, followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FileRecord;
    use crate::engine::FileListing;
    use crate::scanner::{ScanError, ScanSummary};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_scan_summary_json_shape() {
        let results = vec![CommandResult::Scan(ScanSummary {
            root: PathBuf::from("/data"),
            files_seen: 3,
            errors: vec![ScanError::PermissionDenied(PathBuf::from("/data/x"))],
            duration: Duration::from_millis(1500),
            ..ScanSummary::default()
        })];
        let output = JsonOutput::new("scan", "hostA", &results, ExitCode::PartialSuccess);

        let value: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();
        assert_eq!(value["command"], "scan");
        assert_eq!(value["exit_code"], 3);
        assert_eq!(value["exit_code_name"], "DC003");
        let first = &value["results"][0];
        assert_eq!(first["kind"], "scan");
        assert_eq!(first["files_seen"], 3);
        assert_eq!(first["duration_ms"], 1500);
        assert_eq!(first["errors"][0], "Permission denied: /data/x");
    }

    #[test]
    fn test_files_listing_json() {
        let results = vec![CommandResult::Files(FileListing {
            root: PathBuf::from("/d"),
            files: vec![FileRecord {
                id: 7,
                file_name: "a.txt".into(),
                directory_path: "/d".into(),
                computer_id: 1,
                content_hash: None,
                size_bytes: 0,
                last_modified: 0,
                last_checked: 0,
                is_deleted: false,
            }],
        })];
        let output = JsonOutput::new("files", "h", &results, ExitCode::Success);

        let mut buf = Vec::new();
        output.write_to(&mut buf, true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with('\n'));

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["results"][0]["files"][0]["file_name"], "a.txt");
        assert!(value["results"][0]["files"][0]["content_hash"].is_null());
    }
}
