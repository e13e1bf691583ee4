//! Retry policies.
//!
//! This module groups the knobs that control **whether** a failed operation is
//! attempted again and **how long** to wait before the next attempt.
//!
//! ## Contents
//! - [`RetryConfiguration`] validated settings (attempt budget, delays, timeout) and [`RetryPreset`]s
//! - [`RetryPolicy`] / [`DelayCalculator`] how delays evolve between attempts
//! - [`JitterSample`] the random spread applied by `RandomJitter`
//! - [`RetryConditionChecker`] whether a given error deserves another attempt, plus stock [`checkers`]
//!
//! ## Quick wiring
//! ```text
//! RetryConfiguration { max_attempts, policy, base/max delay, multiplier, jitter, timeout }
//!      └─► retry::RetryExecutor uses:
//!           - RetryConditionChecker::should_retry(attempt, cfg, err, checker) to continue/stop
//!           - DelayCalculator::calculate(attempt, cfg, err) to schedule the next attempt
//! ```
//!
//! ## Defaults
//! - 3 attempts, `ExponentialBackoff` from 1s (×2), capped at 60s, no overall timeout.
//! - Fatal errors (interrupt, exit request, out of memory) are never retried unless a checker says so.

mod backoff;
mod condition;
mod config;
mod jitter;

pub use backoff::{DelayCalculator, DelayFn, RetryPolicy};
pub use condition::{ErrorChecker, RetryConditionChecker, checkers};
pub use config::{RetryConfiguration, RetryConfigurationBuilder, RetryPreset};
pub use jitter::JitterSample;
