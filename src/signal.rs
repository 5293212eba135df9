//! Ctrl+C handling for graceful shutdown.
//!
//! A shared `AtomicBool` is set when the user interrupts. Scans stop
//! between files, resolution stops between candidates, and deletion stops
//! between records. Every row written so far is complete, so the catalog is
//! valid after an interrupt; the process then exits with code 130.
//!
//! ```rust,no_run
//! use dupecatalog::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! let flag = handler.get_flag();
//! // hand `flag` to the scanner, resolver and deleter
//! # drop(flag);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once Ctrl+C was pressed or [`request_shutdown`](Self::request_shutdown) was called.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Manually request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// A clone of the flag for the scanner, resolver and deleter.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag so the handler can be reused.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: Mutex<Option<ShutdownHandler>> = Mutex::new(None);

/// Install the process-wide Ctrl+C hook.
///
/// Calling this again (e.g. from several tests running `run_app` in one
/// process) returns the already installed handler with its flag reset.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the hook cannot be registered.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    // The flag is plain data, so a poisoned lock is still usable.
    let mut installed = GLOBAL_HANDLER
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(handler) = installed.as_ref() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(
            std::io::stderr(),
            "\nInterrupted. Finishing the current file..."
        );
        let _ = std::io::stderr().flush();
        log::info!("Shutdown signal received");
    })?;

    *installed = Some(handler.clone());
    Ok(handler)
}
