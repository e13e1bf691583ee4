//! # Supervision engine configuration.
//!
//! Provides [`EngineConfig`] centralized settings for the [`SupervisionEngine`](crate::SupervisionEngine).
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → clamped to 1 (the admission gate always exists)
//! - `poll_interval = 0s` → clamped to 1ms
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use procvisor::EngineConfig;
//!
//! let mut cfg = EngineConfig::default();
//! cfg.max_concurrent = 2;
//! cfg.grace = Duration::from_secs(1);
//!
//! assert_eq!(cfg.concurrency_limit(), 2);
//! ```

use std::time::Duration;

/// Configuration for the supervision engine.
///
/// Defines:
/// - **Admission**: how many processes may be supervised at once
/// - **Termination**: how long each escalation stage waits
/// - **Monitoring**: exit polling cadence, output drain window, capture size
///
/// ## Field semantics
/// - `max_concurrent`: Admission gate capacity (min 1)
/// - `grace`: Wait after the graceful stop signal before escalating
/// - `kill_wait`: Wait after the forceful stop signal before the OS-level kill
/// - `poll_interval`: Exit-state polling interval of the monitor's state loop
/// - `drain_timeout`: How long read loops may keep draining after exit (also bounds observer shutdown)
/// - `max_captured_bytes`: Per-stream capture cap (most recent bytes are kept)
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum number of processes supervised concurrently.
    pub max_concurrent: usize,

    /// Time allotted to the graceful stop signal (SIGTERM).
    pub grace: Duration,

    /// Time allotted to the forceful stop signal (SIGKILL).
    pub kill_wait: Duration,

    /// Exit polling interval used by the monitor's state loop.
    pub poll_interval: Duration,

    /// Maximum time read loops may drain buffered output after the process exits.
    ///
    /// Matters when a grandchild keeps the pipes open after the direct child exited.
    /// Observers still busy this long after the loops stop are aborted.
    pub drain_timeout: Duration,

    /// Maximum number of bytes captured per stream into [`ProcessResult`](crate::ProcessResult).
    pub max_captured_bytes: usize,
}

impl EngineConfig {
    /// Returns the admission gate capacity (never below 1).
    #[inline]
    pub fn concurrency_limit(&self) -> usize {
        self.max_concurrent.max(1)
    }

    /// Returns the polling interval (never below 1ms).
    #[inline]
    pub fn poll_interval_clamped(&self) -> Duration {
        self.poll_interval.max(Duration::from_millis(1))
    }
}

impl Default for EngineConfig {
    /// Default configuration:
    ///
    /// - `max_concurrent = 5`
    /// - `grace = 5s`, `kill_wait = 3s`
    /// - `poll_interval = 500ms`
    /// - `drain_timeout = 2s`
    /// - `max_captured_bytes = 1 MiB`
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            grace: Duration::from_secs(5),
            kill_wait: Duration::from_secs(3),
            poll_interval: Duration::from_millis(500),
            drain_timeout: Duration::from_secs(2),
            max_captured_bytes: 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_clamped() {
        let cfg = EngineConfig {
            max_concurrent: 0,
            poll_interval: Duration::ZERO,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.concurrency_limit(), 1);
        assert_eq!(cfg.poll_interval_clamped(), Duration::from_millis(1));
    }
}
