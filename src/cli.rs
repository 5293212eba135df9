//! Command-line interface definitions for dupecatalog.
//!
//! Global options (verbosity, catalog location, output format) come before
//! the subcommand. Every subcommand accepts one or more paths, processed in
//! order.
//!
//! # Example
//!
//! ```bash
//! # Catalog a tree, then refresh it and tombstone what disappeared
//! dupecatalog scan ~/Pictures
//! dupecatalog update ~/Pictures
//!
//! # Report copies under ~/Downloads that also exist elsewhere on this machine
//! dupecatalog -v dupes ~/Downloads
//!
//! # Remove local files already cataloged on another computer
//! dupecatalog kill-from-pc ~/old-backup --delete
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Config;

/// Catalog files across machines and remove duplicates.
///
/// dupecatalog keeps a persistent catalog of content hashes (BLAKE3) for
/// every scanned file and uses it to find copies in the same directory,
/// elsewhere on this computer, or on other cataloged computers.
#[derive(Debug, Parser)]
#[command(name = "dupecatalog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v for debug and per-duplicate lines, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: platform config dir)
    #[arg(long, value_name = "FILE", global = true, env = "DUPECATALOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog database file
    #[arg(long, value_name = "FILE", global = true)]
    pub catalog: Option<PathBuf>,

    /// Name this computer is cataloged under (default: hostname)
    #[arg(long, value_name = "NAME", global = true)]
    pub host: Option<String>,

    /// Output format for reports
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add or refresh the catalog entries for directory trees
    Scan(ScanArgs),
    /// Refresh directory trees and tombstone files that disappeared
    Update(ScanArgs),
    /// Find files with a copy elsewhere on this computer (outside PATH)
    Dupes(ResolveArgs),
    /// Find copies that share a directory
    Neighbors(ResolveArgs),
    /// Find local files that are already cataloged on another computer
    KillFromPc(ResolveArgs),
    /// List cataloged, non-deleted files under directory trees
    Files(FilesArgs),
}

impl Commands {
    /// The subcommand name as typed on the command line.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan(_) => "scan",
            Self::Update(_) => "update",
            Self::Dupes(_) => "dupes",
            Self::Neighbors(_) => "neighbors",
            Self::KillFromPc(_) => "kill-from-pc",
            Self::Files(_) => "files",
        }
    }
}

/// Walk filters shared by every command that scans.
#[derive(Debug, Clone, Default, Args)]
pub struct WalkArgs {
    /// Glob patterns to ignore (can be specified multiple times)
    ///
    /// These patterns are added to the configured ones and to a .gitignore
    /// in the scanned root.
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links (loops are detected and skipped)
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Number of hashing threads
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,
}

/// Arguments for `scan` and `update`.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory trees to reconcile
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    #[command(flatten)]
    pub walk: WalkArgs,
}

/// Arguments for the resolution commands.
#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Directory trees whose files are candidates
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Remove the duplicates that were found
    #[arg(long)]
    pub delete: bool,

    /// Move removed files to the system trash instead of unlinking them
    #[arg(long, requires = "delete")]
    pub trash: bool,

    /// Use the catalog as is instead of refreshing PATH first
    #[arg(long)]
    pub no_refresh: bool,

    /// Delete even if a file changed since it was cataloged
    #[arg(long, requires = "delete")]
    pub no_verify: bool,

    /// Leave directories that deletion emptied in place
    #[arg(long)]
    pub keep_empty_dirs: bool,

    #[command(flatten)]
    pub walk: WalkArgs,
}

/// Arguments for `files`.
#[derive(Debug, Args)]
pub struct FilesArgs {
    /// Directory trees to list
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(path) = &self.catalog {
            config.catalog_path = Some(path.clone());
        }
        if let Some(host) = &self.host {
            config.computer_name = Some(host.clone());
        }

        let walk = match &self.command {
            Commands::Scan(args) | Commands::Update(args) => Some(&args.walk),
            Commands::Dupes(args) | Commands::Neighbors(args) | Commands::KillFromPc(args) => {
                if args.trash {
                    config.use_trash = true;
                }
                if args.no_verify {
                    config.verify_before_delete = false;
                }
                if args.no_refresh {
                    config.refresh_before_resolve = false;
                }
                if args.keep_empty_dirs {
                    config.remove_empty_dirs = false;
                }
                Some(&args.walk)
            }
            Commands::Files(_) => None,
        };

        if let Some(walk) = walk {
            config
                .ignore_patterns
                .extend(walk.ignore_patterns.iter().cloned());
            if walk.follow_symlinks {
                config.follow_symlinks = true;
            }
            if walk.skip_hidden {
                config.skip_hidden = true;
            }
            if let Some(n) = walk.io_threads {
                config.io_threads = n.max(1);
            }
        }
    }
}
