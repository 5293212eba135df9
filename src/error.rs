//! Structured error handling and exit codes.

use serde::Serialize;

/// Exit codes for the dupecatalog application.
///
/// - 0: Success (command completed; for resolution commands, duplicates found)
/// - 1: General error (unexpected failure, unusable catalog or root)
/// - 2: No duplicates found (resolution completed normally, nothing matched)
/// - 3: Partial success (completed with skipped entries or failed deletions)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: Command completed and, for resolution, duplicates were found.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: Resolution completed but nothing matched.
    NoDuplicates = 2,
    /// Partial success: Completed but some entries were skipped or failed.
    PartialSuccess = 3,
    /// Interrupted: Stopped by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DC000",
            Self::GeneralError => "DC001",
            Self::NoDuplicates => "DC002",
            Self::PartialSuccess => "DC003",
            Self::Interrupted => "DC130",
        }
    }

    /// Combine the codes of several commands or roots into one.
    ///
    /// Interruption and partial failure dominate; `Success` wins over
    /// `NoDuplicates` as soon as any root had duplicates.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        fn rank(code: ExitCode) -> u8 {
            match code {
                ExitCode::Interrupted => 4,
                ExitCode::GeneralError => 3,
                ExitCode::PartialSuccess => 2,
                ExitCode::Success => 1,
                ExitCode::NoDuplicates => 0,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DC001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
