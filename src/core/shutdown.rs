//! # Cross-platform OS shutdown signals.
//!
//! Provides [`wait_for_shutdown_signal`], an async helper that completes when
//! the hosting process is asked to stop, and reports which request arrived.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal) → [`ShutdownSignal::Interrupt`]
//! - `SIGTERM` (systemd/Kubernetes stop) → [`ShutdownSignal::Terminate`]
//! - `SIGQUIT` → [`ShutdownSignal::Quit`]
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`] → [`ShutdownSignal::Interrupt`]
//!
//! A signal converts into the matching fatal [`OperationError`], so a retry
//! loop interrupted by the operator stops instead of retrying.

use crate::error::OperationError;

/// Shutdown request received from the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Quit,
}

impl From<ShutdownSignal> for OperationError {
    fn from(sig: ShutdownSignal) -> Self {
        match sig {
            ShutdownSignal::Interrupt => OperationError::Interrupted,
            ShutdownSignal::Terminate | ShutdownSignal::Quit => OperationError::ExitRequested,
        }
    }
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns the signal received, or `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let sig = tokio::select! {
        _ = sigint.recv()  => ShutdownSignal::Interrupt,
        _ = sigterm.recv() => ShutdownSignal::Terminate,
        _ = sigquit.recv() => ShutdownSignal::Quit,
    };
    Ok(sig)
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns the signal received, or `Err` if signal registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}
