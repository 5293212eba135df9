//! Human-readable output.
//!
//! Sizes use IEC units via `bytesize`. In verbose mode resolution reports
//! include one line per duplicate and scan summaries list skipped entries.

use std::collections::HashMap;
use std::io::{self, Write};

use bytesize::ByteSize;

use super::CommandResult;
use crate::actions::{BatchDeleteResult, HousekeepReport};
use crate::catalog::{ComputerId, FileRecord};
use crate::duplicates::{DuplicateMatch, ResolutionReport, Scope};
use crate::engine::{FileListing, ResolutionOutcome};
use crate::scanner::ScanSummary;

/// Text renderer.
#[derive(Debug, Default)]
pub struct TextOutput {
    verbose: bool,
    /// Computer names by id, for cross-host lines.
    computers: HashMap<ComputerId, String>,
}

impl TextOutput {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            computers: HashMap::new(),
        }
    }

    /// Names to show instead of computer ids.
    #[must_use]
    pub fn with_computers(
        mut self,
        computers: impl IntoIterator<Item = (ComputerId, String)>,
    ) -> Self {
        self.computers = computers.into_iter().collect();
        self
    }

    /// Write one result block.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_result<W: Write>(&self, w: &mut W, result: &CommandResult) -> io::Result<()> {
        match result {
            CommandResult::Scan(summary) => self.write_scan(w, summary),
            CommandResult::Resolution(outcome) => self.write_resolution(w, outcome),
            CommandResult::Files(listing) => self.write_files(w, listing),
        }
    }

    fn write_scan<W: Write>(&self, w: &mut W, s: &ScanSummary) -> io::Result<()> {
        let mode = s.mode.map_or_else(|| "scan".to_string(), |m| m.to_string());
        writeln!(
            w,
            "{} {}: {} files in {} folders ({:.1}s)",
            capitalize(&mode),
            s.root.display(),
            s.files_seen,
            s.folders_seen,
            s.duration.as_secs_f64()
        )?;
        writeln!(
            w,
            "  new: {}, re-hashed: {}, unchanged: {}, tombstoned: {}",
            s.files_added, s.files_rehashed, s.files_unchanged, s.files_tombstoned
        )?;
        if s.files_hashed > 0 {
            write!(
                w,
                "  hashed {} files ({})",
                s.files_hashed,
                ByteSize::b(s.bytes_hashed)
            )?;
            if s.hash_unavailable > 0 {
                write!(w, ", {} without hash", s.hash_unavailable)?;
            }
            writeln!(w)?;
        }
        if s.has_errors() {
            writeln!(w, "  skipped {} entries", s.errors.len())?;
            if self.verbose {
                for e in &s.errors {
                    writeln!(w, "    {e}")?;
                }
            }
        }
        if s.interrupted {
            writeln!(w, "  interrupted")?;
        }
        Ok(())
    }

    fn write_resolution<W: Write>(&self, w: &mut W, outcome: &ResolutionOutcome) -> io::Result<()> {
        if let Some(refresh) = &outcome.refresh {
            if self.verbose || refresh.has_errors() {
                self.write_scan(w, refresh)?;
            }
        }
        self.write_report(w, &outcome.report)?;
        if let Some(deletion) = &outcome.deletion {
            self.write_deletion(w, deletion)?;
        }
        if let Some(housekeeping) = &outcome.housekeeping {
            write_housekeeping(w, housekeeping)?;
        }
        Ok(())
    }

    fn write_report<W: Write>(&self, w: &mut W, r: &ResolutionReport) -> io::Result<()> {
        writeln!(
            w,
            "{} duplicates under {}: {} of {} files ({})",
            capitalize(&r.scope.to_string()),
            r.root.display(),
            r.match_count(),
            r.files_examined,
            ByteSize::b(r.duplicate_bytes)
        )?;
        if self.verbose {
            for m in &r.matches {
                writeln!(w, "  {}", self.match_line(r.scope, m))?;
            }
        }
        if r.interrupted {
            writeln!(w, "  interrupted")?;
        }
        Ok(())
    }

    fn match_line(&self, scope: Scope, m: &DuplicateMatch) -> String {
        let original = match scope {
            Scope::CrossHost => format!(
                "{}:{}",
                self.computer_name(m.original.computer_id),
                m.original.full_path().display()
            ),
            Scope::SameDirectory => m.original.file_name.clone(),
            Scope::Prune => m.original.full_path().display().to_string(),
        };
        format!(
            "{} == {} ({})",
            m.candidate.full_path().display(),
            original,
            ByteSize::b(m.size())
        )
    }

    fn computer_name(&self, id: ComputerId) -> String {
        self.computers
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("computer#{id}"))
    }

    fn write_deletion<W: Write>(&self, w: &mut W, d: &BatchDeleteResult) -> io::Result<()> {
        writeln!(
            w,
            "Deleted {} files, freed {}",
            d.success_count(),
            ByteSize::b(d.bytes_freed)
        )?;
        if !d.already_removed.is_empty() {
            writeln!(w, "  {} already removed", d.already_removed.len())?;
            if self.verbose {
                for path in &d.already_removed {
                    writeln!(w, "    {}", path.display())?;
                }
            }
        }
        if !d.failures.is_empty() {
            writeln!(w, "  {} failed:", d.failure_count())?;
            for f in &d.failures {
                writeln!(w, "    {}: {}", f.path.display(), f.error)?;
            }
        }
        if d.interrupted {
            writeln!(w, "  interrupted")?;
        }
        Ok(())
    }

    fn write_files<W: Write>(&self, w: &mut W, listing: &FileListing) -> io::Result<()> {
        for f in &listing.files {
            if self.verbose {
                writeln!(
                    w,
                    "{}\t{}\t{}",
                    f.full_path().display(),
                    ByteSize::b(f.size_bytes),
                    short_hash(f)
                )?;
            } else {
                writeln!(w, "{}", f.full_path().display())?;
            }
        }
        writeln!(
            w,
            "{} files under {} ({})",
            listing.files.len(),
            listing.root.display(),
            ByteSize::b(listing.total_bytes())
        )
    }
}

fn write_housekeeping<W: Write>(w: &mut W, h: &HousekeepReport) -> io::Result<()> {
    if h.removed_count() > 0 {
        writeln!(w, "Removed {} empty directories", h.removed_count())?;
    }
    for (path, error) in &h.failures {
        writeln!(w, "  could not remove {}: {error}", path.display())?;
    }
    Ok(())
}

fn short_hash(f: &FileRecord) -> &str {
    f.content_hash
        .as_deref()
        .map_or("-", |h| h.get(..12).unwrap_or(h))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
