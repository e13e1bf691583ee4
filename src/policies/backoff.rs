//! # Retry delay calculation.
//!
//! [`DelayCalculator`] maps "attempt `n` just failed" to the wait before
//! attempt `n + 1`, according to the configured [`RetryPolicy`]:
//!
//! ```text
//! FixedDelay          base
//! ExponentialBackoff  base × m^(n-1)
//! LinearBackoff       base × n
//! RandomJitter        e ± e × j × U      e = base × m^(n-1), U ∈ [-1, 1]
//! Custom(f)           f(n, last_error)   Err or panic → base
//! ```
//!
//! Every branch is finally clamped to `[0, max_delay]`; a non-finite
//! intermediate (overflowing exponent, NaN multiplier) saturates to `max_delay`.
//! Attempt `0` is treated as `1`.
//!
//! The base delay is derived purely from the attempt number, so jitter output
//! never feeds back into later calculations.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{DelayCalculator, RetryConfiguration, RetryPolicy};
//!
//! let cfg = RetryConfiguration::builder()
//!     .with_policy(RetryPolicy::ExponentialBackoff)
//!     .with_base_delay(Duration::from_millis(100))
//!     .with_max_delay(Duration::from_secs(1))
//!     .with_backoff_multiplier(2.0)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(DelayCalculator::calculate(1, &cfg, None), Duration::from_millis(100));
//! assert_eq!(DelayCalculator::calculate(3, &cfg, None), Duration::from_millis(400));
//! // 100ms × 2^9 = 51.2s → capped at max=1s
//! assert_eq!(DelayCalculator::calculate(10, &cfg, None), Duration::from_secs(1));
//! ```

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{DelayError, OperationError};
use crate::policies::config::RetryConfiguration;
use crate::policies::jitter::JitterSample;

/// Caller-supplied delay function: `(failed_attempt, last_error) -> delay`.
pub type DelayFn =
    Arc<dyn Fn(u32, Option<&OperationError>) -> Result<Duration, DelayError> + Send + Sync>;

/// Family of functions mapping an attempt number to an inter-attempt delay.
#[derive(Clone, Default)]
pub enum RetryPolicy {
    /// Always `base_delay`.
    FixedDelay,
    /// `base_delay × multiplier^(attempt-1)`.
    #[default]
    ExponentialBackoff,
    /// `base_delay × attempt`.
    LinearBackoff,
    /// Exponential value spread by `± jitter_factor`.
    RandomJitter,
    /// Caller-supplied function; falls back to `base_delay` on error or panic.
    Custom(DelayFn),
}

impl RetryPolicy {
    /// Wraps a closure into [`RetryPolicy::Custom`].
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32, Option<&OperationError>) -> Result<Duration, DelayError> + Send + Sync + 'static,
    {
        RetryPolicy::Custom(Arc::new(f))
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RetryPolicy::FixedDelay => "fixed_delay",
            RetryPolicy::ExponentialBackoff => "exponential_backoff",
            RetryPolicy::LinearBackoff => "linear_backoff",
            RetryPolicy::RandomJitter => "random_jitter",
            RetryPolicy::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPolicy::Custom(_) => f.write_str("Custom(<fn>)"),
            other => f.write_str(other.as_label()),
        }
    }
}

impl PartialEq for RetryPolicy {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RetryPolicy::Custom(a), RetryPolicy::Custom(b)) => Arc::ptr_eq(a, b),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

/// Stateless delay computation.
pub struct DelayCalculator;

impl DelayCalculator {
    /// Computes the wait after `attempt` (1-based) failed.
    pub fn calculate(
        attempt: u32,
        cfg: &RetryConfiguration,
        last_error: Option<&OperationError>,
    ) -> Duration {
        Self::calculate_with(attempt, cfg, last_error, JitterSample::draw())
    }

    /// Same as [`calculate`](Self::calculate) with an explicit jitter sample.
    pub fn calculate_with(
        attempt: u32,
        cfg: &RetryConfiguration,
        last_error: Option<&OperationError>,
        jitter: JitterSample,
    ) -> Duration {
        let attempt = attempt.max(1);
        let max = cfg.max_delay();
        let base = cfg.base_delay().as_secs_f64();
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let exponential = || base * cfg.backoff_multiplier().powi(exponent);

        let secs = match cfg.policy() {
            RetryPolicy::FixedDelay => return cfg.base_delay().min(max),
            RetryPolicy::ExponentialBackoff => exponential(),
            RetryPolicy::LinearBackoff => base * f64::from(attempt),
            RetryPolicy::RandomJitter => jitter.apply(exponential(), cfg.jitter_factor()),
            RetryPolicy::Custom(f) => {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| f(attempt, last_error)));
                return match outcome {
                    Ok(Ok(delay)) => delay.min(max),
                    Ok(Err(err)) => {
                        debug!(attempt, error = %err, "custom delay failed, using base delay");
                        cfg.base_delay().min(max)
                    }
                    Err(_) => {
                        debug!(attempt, "custom delay panicked, using base delay");
                        cfg.base_delay().min(max)
                    }
                };
            }
        };

        clamp(secs, max)
    }
}

fn clamp(secs: f64, max: Duration) -> Duration {
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        max
    } else if secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(policy: RetryPolicy) -> RetryConfiguration {
        RetryConfiguration::builder()
            .with_policy(policy)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_backoff_multiplier(2.0)
            .with_jitter_factor(0.5)
            .build()
            .unwrap()
    }

    #[test]
    fn test_fixed_and_linear() {
        let fixed = cfg(RetryPolicy::FixedDelay);
        let linear = cfg(RetryPolicy::LinearBackoff);
        for attempt in 1..6 {
            assert_eq!(DelayCalculator::calculate(attempt, &fixed, None), Duration::from_millis(100));
            assert_eq!(
                DelayCalculator::calculate(attempt, &linear, None),
                Duration::from_millis(100 * u64::from(attempt))
            );
        }
    }

    #[test]
    fn test_exponential_formula_and_monotonicity() {
        let c = cfg(RetryPolicy::ExponentialBackoff);
        let mut prev = Duration::ZERO;
        for attempt in 1..20u32 {
            let expected_secs = (0.1 * 2f64.powi(attempt as i32 - 1)).min(30.0);
            let got = DelayCalculator::calculate(attempt, &c, None);
            assert!(
                (got.as_secs_f64() - expected_secs).abs() < 1e-6,
                "attempt {attempt}: {got:?} != {expected_secs}s"
            );
            assert!(got >= prev, "attempt {attempt} decreased");
            prev = got;
        }
    }

    #[test]
    fn test_attempt_zero_is_treated_as_first() {
        let c = cfg(RetryPolicy::ExponentialBackoff);
        assert_eq!(
            DelayCalculator::calculate(0, &c, None),
            DelayCalculator::calculate(1, &c, None)
        );
    }

    #[test]
    fn test_non_finite_saturates_to_max() {
        let c = cfg(RetryPolicy::ExponentialBackoff);
        assert_eq!(DelayCalculator::calculate(u32::MAX, &c, None), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_bounds_and_never_negative() {
        let c = cfg(RetryPolicy::RandomJitter);
        let d = |u| {
            DelayCalculator::calculate_with(3, &c, None, JitterSample::fixed(u)).as_secs_f64()
        };
        assert!((d(1.0) - 0.6).abs() < 1e-6);
        assert!((d(-1.0) - 0.2).abs() < 1e-6);
        assert!((d(0.0) - 0.4).abs() < 1e-6);

        let wild = RetryConfiguration::builder()
            .with_policy(RetryPolicy::RandomJitter)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10))
            .with_jitter_factor(5.0)
            .build()
            .unwrap();
        assert_eq!(
            DelayCalculator::calculate_with(1, &wild, None, JitterSample::fixed(-1.0)),
            Duration::ZERO
        );
        for _ in 0..500 {
            let delay = DelayCalculator::calculate(2, &wild, None);
            assert!(delay <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_custom_receives_error_and_falls_back() {
        let seen = RetryPolicy::custom(|attempt, err| {
            assert!(err.is_some());
            Ok(Duration::from_millis(u64::from(attempt) * 7))
        });
        let c = cfg(seen);
        let err = OperationError::fail("boom");
        assert_eq!(DelayCalculator::calculate(3, &c, Some(&err)), Duration::from_millis(21));

        let failing = cfg(RetryPolicy::custom(|_, _| Err(DelayError("no".into()))));
        assert_eq!(DelayCalculator::calculate(2, &failing, None), Duration::from_millis(100));

        let panicking = cfg(RetryPolicy::custom(|_, _| panic!("delay bug")));
        assert_eq!(DelayCalculator::calculate(2, &panicking, None), Duration::from_millis(100));

        let huge = cfg(RetryPolicy::custom(|_, _| Ok(Duration::from_secs(3600))));
        assert_eq!(DelayCalculator::calculate(1, &huge, None), Duration::from_secs(30));
    }

    #[test]
    fn test_policy_equality_and_debug() {
        assert_eq!(RetryPolicy::FixedDelay, RetryPolicy::FixedDelay);
        assert_ne!(RetryPolicy::FixedDelay, RetryPolicy::LinearBackoff);
        assert_eq!(format!("{:?}", RetryPolicy::custom(|_, _| Ok(Duration::ZERO))), "Custom(<fn>)");
    }
}
