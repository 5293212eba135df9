//! Output formatters for command results.
//!
//! - [`text`]: human-readable summaries, one block per processed path
//! - [`json`]: one JSON document per invocation for scripting
//!
//! Every command produces one [`CommandResult`] per path argument.

pub mod json;
pub mod text;

use serde::Serialize;

use crate::engine::{FileListing, ResolutionOutcome};
use crate::error::ExitCode;
use crate::scanner::ScanSummary;

pub use json::{JsonOutput, JsonOutputError};
pub use text::TextOutput;

/// The result of running a command on one path.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandResult {
    Scan(ScanSummary),
    Resolution(ResolutionOutcome),
    Files(FileListing),
}

impl CommandResult {
    /// Exit code contributed by this result alone.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Scan(summary) => {
                if summary.interrupted {
                    ExitCode::Interrupted
                } else if summary.has_errors() {
                    ExitCode::PartialSuccess
                } else {
                    ExitCode::Success
                }
            }
            Self::Resolution(outcome) => {
                if outcome.interrupted() {
                    ExitCode::Interrupted
                } else if outcome.has_failures() {
                    ExitCode::PartialSuccess
                } else if outcome.report.is_empty() {
                    ExitCode::NoDuplicates
                } else {
                    ExitCode::Success
                }
            }
            Self::Files(_) => ExitCode::Success,
        }
    }
}

/// Combined exit code for a list of results.
///
/// An empty list counts as success.
#[must_use]
pub fn combined_exit_code(results: &[CommandResult]) -> ExitCode {
    results
        .iter()
        .map(CommandResult::exit_code)
        .reduce(ExitCode::merge)
        .unwrap_or(ExitCode::Success)
}
