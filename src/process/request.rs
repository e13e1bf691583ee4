//! # Process requests and execution identifiers.
//!
//! [`ProcessRequest`] describes what to run: the argument vector, working
//! directory, environment override and overall timeout. The engine only reads it.
//!
//! [`ExecutionId`] correlates registry entries, monitor events and results of
//! one execution attempt.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Last issued identifier value (microseconds since the Unix epoch).
static LAST_ID_MICROS: AtomicU64 = AtomicU64::new(0);

/// Unique token assigned per process-execution attempt.
///
/// Rendered as `proc_<micros>`. Values are derived from the wall clock and
/// forced strictly increasing within this process, so two identifiers never
/// collide even when the clock does not advance between calls.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionId(Arc<str>);

impl ExecutionId {
    /// Generates a new identifier.
    pub fn generate() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros().min(u128::from(u64::MAX)) as u64)
            .unwrap_or(0);

        let mut prev = LAST_ID_MICROS.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev.saturating_add(1));
            match LAST_ID_MICROS.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self(format!("proc_{next}").into()),
                Err(actual) => prev = actual,
            }
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for ExecutionId {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

/// What to run: one external command with its limits.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use procvisor::ProcessRequest;
///
/// let req = ProcessRequest::new(["ffmpeg", "-i", "in.ts", "out.mp4"])
///     .with_working_directory("/tmp")
///     .with_env("LANG", "C")
///     .with_timeout(Duration::from_secs(3600));
///
/// assert_eq!(req.program(), Some("ffmpeg"));
/// assert_eq!(req.command_line(), "ffmpeg -i in.ts out.mp4");
/// ```
#[derive(Clone, Debug, Default)]
pub struct ProcessRequest {
    /// Argument vector; the first element is the executable.
    pub command: Vec<String>,
    /// Working directory (`None` = inherit).
    pub working_directory: Option<PathBuf>,
    /// Environment override; when present it **replaces** the inherited environment.
    pub environment: Option<HashMap<String, String>>,
    /// Overall timeout for this execution (`None` = wait indefinitely).
    pub timeout: Option<Duration>,
}

impl ProcessRequest {
    /// Creates a request from an argument vector.
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Adds one variable to the environment override (creating it if absent).
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Replaces the whole environment override.
    pub fn with_environment(mut self, env: HashMap<String, String>) -> Self {
        self.environment = Some(env);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the executable, if the command is not empty.
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    /// Returns the command joined with spaces (for logs and result metadata).
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Returns the timeout, treating zero as "no timeout".
    #[inline]
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|d| *d > Duration::ZERO)
    }
}
