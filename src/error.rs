//! Error types used by the supervision engine, monitors and the retry layer.
//!
//! This module defines:
//!
//! - [`OperationError`]: failure of a single attempt of a retried operation.
//! - [`ConfigError`]: rejected [`RetryConfiguration`](crate::RetryConfiguration).
//! - [`MonitorError`]: misuse of a [`ProcessMonitor`](crate::ProcessMonitor).
//! - [`ParseError`] / [`DelayError`]: returned by user-supplied line parsers and delay functions.
//! - [`RetryError`]: returned by the [`retry_async`](crate::retry_async) convenience wrappers.
//!
//! Every enum provides `as_label` (stable snake_case label for logs/metrics).
//! Process execution itself never returns an error: failures are captured into
//! a [`ProcessResult`](crate::ProcessResult).

use std::any::Any;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryOutcome;

/// # Errors produced by one attempt of a retried operation.
///
/// The default retry condition retries every variant except the fatal ones
/// (see [`OperationError::is_fatal`]).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Generic failure; retryable.
    #[error("operation failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// I/O failure; the `io::ErrorKind` is kept.
    #[error("i/o error ({kind}): {error}")]
    Io {
        /// Kind of the underlying `std::io::Error`.
        kind: io::ErrorKind,
        /// The underlying error message.
        error: String,
    },

    /// The attempt exceeded its own deadline.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// A supervised process did not finish successfully.
    #[error("process failed (exit code {exit_code:?}): {error}")]
    Process {
        /// Exit code, if the process produced one.
        exit_code: Option<i32>,
        /// Failure summary (usually the tail of stderr).
        error: String,
    },

    /// Invalid input or state; retrying cannot help.
    #[error("invalid input: {error}")]
    Invalid {
        /// The underlying error message.
        error: String,
    },

    /// Operator interrupt (Ctrl-C). Never retried by default.
    #[error("interrupted by operator")]
    Interrupted,

    /// The hosting process was asked to exit. Never retried by default.
    #[error("exit requested")]
    ExitRequested,

    /// Memory exhaustion. Never retried by default.
    #[error("out of memory")]
    OutOfMemory,
}

impl OperationError {
    /// Shorthand for [`OperationError::Fail`].
    pub fn fail(error: impl std::fmt::Display) -> Self {
        OperationError::Fail {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`OperationError::Invalid`].
    pub fn invalid(error: impl std::fmt::Display) -> Self {
        OperationError::Invalid {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::OperationError;
    /// use std::time::Duration;
    ///
    /// let err = OperationError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "operation_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            OperationError::Fail { .. } => "operation_failed",
            OperationError::Io { .. } => "operation_io",
            OperationError::Timeout { .. } => "operation_timeout",
            OperationError::Process { .. } => "operation_process",
            OperationError::Invalid { .. } => "operation_invalid",
            OperationError::Interrupted => "operation_interrupted",
            OperationError::ExitRequested => "operation_exit_requested",
            OperationError::OutOfMemory => "operation_out_of_memory",
        }
    }

    /// Indicates whether the error belongs to the always-fatal categories.
    ///
    /// # Example
    /// ```
    /// use procvisor::OperationError;
    ///
    /// assert!(OperationError::Interrupted.is_fatal());
    /// assert!(!OperationError::fail("boom").is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OperationError::Interrupted
                | OperationError::ExitRequested
                | OperationError::OutOfMemory
        )
    }
}

impl From<io::Error> for OperationError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::OutOfMemory => OperationError::OutOfMemory,
            kind => OperationError::Io {
                kind,
                error: err.to_string(),
            },
        }
    }
}

impl From<String> for OperationError {
    fn from(error: String) -> Self {
        OperationError::Fail { error }
    }
}

impl From<&str> for OperationError {
    fn from(error: &str) -> Self {
        OperationError::Fail {
            error: error.to_string(),
        }
    }
}

/// # Rejected retry configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1, got {0}")]
    MaxAttempts(u32),

    #[error("base_delay must be a finite non-negative number of seconds, got {0}")]
    BaseDelay(f64),

    #[error("max_delay must be a finite number of seconds >= base_delay ({base}s), got {max}")]
    MaxDelay { base: f64, max: f64 },

    #[error("backoff_multiplier must be finite and non-negative, got {0}")]
    Multiplier(f64),

    #[error("jitter_factor must be finite and non-negative, got {0}")]
    JitterFactor(f64),

    #[error("timeout must be a finite non-negative number of seconds, got {0}")]
    Timeout(f64),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::MaxAttempts(_) => "config_max_attempts",
            ConfigError::BaseDelay(_) => "config_base_delay",
            ConfigError::MaxDelay { .. } => "config_max_delay",
            ConfigError::Multiplier(_) => "config_multiplier",
            ConfigError::JitterFactor(_) => "config_jitter_factor",
            ConfigError::Timeout(_) => "config_timeout",
        }
    }
}

/// # Misuse of a process monitor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The monitor is already attached to an execution.
    #[error("monitor already attached to execution {execution_id}")]
    AlreadyAttached { execution_id: String },

    /// The child was spawned without a piped output stream.
    #[error("child {stream} is not piped")]
    MissingStream { stream: &'static str },
}

impl MonitorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            MonitorError::AlreadyAttached { .. } => "monitor_already_attached",
            MonitorError::MissingStream { .. } => "monitor_missing_stream",
        }
    }
}

/// Error returned by a [`LineParser`](crate::LineParser).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Error returned by a custom delay function; the calculator falls back to `base_delay`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DelayError(pub String);

/// # Failure of a retried operation, for callers preferring `Result` control flow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{outcome:?} after {attempts} attempt(s): {final_error}")]
pub struct RetryError {
    /// Terminal outcome (never `Success`).
    pub outcome: RetryOutcome,
    /// Number of attempts made.
    pub attempts: usize,
    /// Last error text.
    pub final_error: String,
}

impl RetryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self.outcome {
            RetryOutcome::Success => "retry_success",
            RetryOutcome::FailedAllAttempts => "retry_exhausted",
            RetryOutcome::Aborted => "retry_aborted",
            RetryOutcome::Timeout => "retry_timeout",
        }
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
