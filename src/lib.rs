//! dupecatalog - a persistent, multi-machine catalog of file hashes
//!
//! Scans record every file of a directory tree with its BLAKE3 content hash
//! in a SQLite catalog that several computers can share. Duplicate queries
//! then run against the catalog: copies in the same directory, copies
//! elsewhere on this computer, or copies already present on another
//! computer. Matches can optionally be deleted.

pub mod actions;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::catalog::Catalog;
use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::Config;
use crate::engine::{Engine, EngineOptions};
use crate::error::ExitCode;
use crate::output::{combined_exit_code, CommandResult, JsonOutput, TextOutput};
use crate::progress::{Progress, ProgressCallback};
use crate::scanner::ScanError;

/// Run one command line to completion.
///
/// # Errors
///
/// Fails on invalid configuration, an unusable catalog, or a pass-level
/// failure. Per-file problems are reported in the results instead.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);

    let handler = signal::install_handler()?;

    let catalog_path = config.resolved_catalog_path()?;
    let catalog = Arc::new(
        Catalog::open(&catalog_path)
            .with_context(|| format!("failed to open catalog {}", catalog_path.display()))?,
    );
    log::debug!("Using catalog {}", catalog_path.display());

    let show_progress =
        !cli.quiet && cli.output == OutputFormat::Text && io::stderr().is_terminal();
    let progress: Option<Arc<dyn ProgressCallback>> = if show_progress {
        Some(Arc::new(Progress::new(false)))
    } else {
        None
    };

    let computer_name = config.resolved_computer_name();
    let engine = Engine::new(
        Arc::clone(&catalog),
        &computer_name,
        EngineOptions::from_config(&config),
        handler.get_flag(),
        progress,
    )
    .context("failed to register this computer in the catalog")?;

    let text = TextOutput::new(cli.verbose > 0).with_computers(
        catalog
            .computers()
            .context("failed to read computers")?
            .into_iter()
            .map(|c| (c.id, c.name)),
    );

    let paths = match &cli.command {
        Commands::Scan(args) | Commands::Update(args) => &args.paths,
        Commands::Dupes(args) | Commands::Neighbors(args) | Commands::KillFromPc(args) => {
            &args.paths
        }
        Commands::Files(args) => &args.paths,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut results = Vec::with_capacity(paths.len());
    let mut skipped_paths = false;

    for path in paths {
        if handler.is_shutdown_requested() {
            break;
        }

        let result = match run_command(&engine, &cli.command, path) {
            Ok(result) => result,
            // A bad path argument does not stop the remaining ones.
            Err(e) if e.is_recoverable() || matches!(e, ScanError::NotADirectory(_)) => {
                log::error!("Skipping {}: {e}", path.display());
                skipped_paths = true;
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("{} failed for {}", cli.command.name(), path.display())
                })
            }
        };

        if cli.output == OutputFormat::Text {
            text.write_result(&mut out, &result)?;
        }
        results.push(result);
    }

    let mut code = combined_exit_code(&results);
    if skipped_paths {
        code = code.merge(ExitCode::PartialSuccess);
    }
    if handler.is_shutdown_requested() {
        code = ExitCode::Interrupted;
    }

    if cli.output == OutputFormat::Json {
        JsonOutput::new(cli.command.name(), &computer_name, &results, code)
            .write_to(&mut out, true)?;
    }
    out.flush()?;

    Ok(code)
}

fn run_command(
    engine: &Engine,
    command: &Commands,
    path: &Path,
) -> Result<CommandResult, ScanError> {
    Ok(match command {
        Commands::Scan(_) => CommandResult::Scan(engine.scan(path)?),
        Commands::Update(_) => CommandResult::Scan(engine.update(path)?),
        Commands::Dupes(args) => {
            CommandResult::Resolution(engine.list_duplicates(path, args.delete)?)
        }
        Commands::Neighbors(args) => {
            CommandResult::Resolution(engine.list_neighbors(path, args.delete)?)
        }
        Commands::KillFromPc(args) => {
            CommandResult::Resolution(engine.kill_from_pc(path, args.delete)?)
        }
        Commands::Files(_) => CommandResult::Files(engine.print_files(path)?),
    })
}
