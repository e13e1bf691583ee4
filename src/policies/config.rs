//! # Retry configuration and presets.
//!
//! [`RetryConfiguration`] is validated on construction: it can only be obtained
//! through [`RetryConfigurationBuilder::build`] or a [`RetryPreset`], so every
//! value held by the retry layer satisfies:
//!
//! - `max_attempts >= 1`
//! - `0 <= base_delay <= max_delay`, both finite
//! - `backoff_multiplier` and `jitter_factor` finite and non-negative
//! - `timeout`, when set, finite and positive (zero means no overall timeout)
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{ConfigError, RetryConfiguration, RetryPolicy, RetryPreset};
//!
//! let cfg = RetryConfiguration::builder()
//!     .with_max_attempts(4)
//!     .with_policy(RetryPolicy::LinearBackoff)
//!     .with_base_delay_secs(0.5)
//!     .with_max_delay(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//! assert_eq!(cfg.max_attempts(), 4);
//!
//! let err = RetryConfiguration::builder().with_max_attempts(0).build().unwrap_err();
//! assert_eq!(err, ConfigError::MaxAttempts(0));
//!
//! let net = RetryConfiguration::preset(RetryPreset::NetworkOperation);
//! assert_eq!(net.timeout(), Some(Duration::from_secs(300)));
//! ```

use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::backoff::RetryPolicy;

/// Validated retry settings.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfiguration {
    max_attempts: u32,
    policy: RetryPolicy,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter_factor: f64,
    timeout: Option<Duration>,
}

impl RetryConfiguration {
    /// Starts a builder with the default values.
    pub fn builder() -> RetryConfigurationBuilder {
        RetryConfigurationBuilder::default()
    }

    /// Returns the configuration of a named preset.
    pub fn preset(preset: RetryPreset) -> Self {
        preset.configuration()
    }

    /// Starts a builder pre-filled with this configuration.
    pub fn to_builder(&self) -> RetryConfigurationBuilder {
        RetryConfigurationBuilder {
            max_attempts: self.max_attempts,
            policy: self.policy.clone(),
            base_delay: self.base_delay.as_secs_f64(),
            max_delay: self.max_delay.as_secs_f64(),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            timeout: self.timeout.map(|t| t.as_secs_f64()),
        }
    }

    /// Total attempt budget (first try included).
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[inline]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[inline]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    #[inline]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    #[inline]
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    #[inline]
    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Overall deadline of a retry session, checked before each attempt.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Default for RetryConfiguration {
    /// Same as [`RetryPreset::Default`].
    fn default() -> Self {
        RetryPreset::Default.configuration()
    }
}

/// Builder for [`RetryConfiguration`].
///
/// Durations are kept as seconds until [`build`](Self::build), so that the
/// `*_secs` setters can reject negative or non-finite input there.
#[derive(Clone, Debug)]
pub struct RetryConfigurationBuilder {
    max_attempts: u32,
    policy: RetryPolicy,
    base_delay: f64,
    max_delay: f64,
    backoff_multiplier: f64,
    jitter_factor: f64,
    timeout: Option<f64>,
}

impl Default for RetryConfigurationBuilder {
    /// Defaults: 3 attempts, exponential backoff, 1s base, 60s cap,
    /// multiplier 2.0, jitter 0.1, no overall timeout.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            policy: RetryPolicy::ExponentialBackoff,
            base_delay: 1.0,
            max_delay: 60.0,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            timeout: None,
        }
    }
}

impl RetryConfigurationBuilder {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay.as_secs_f64();
        self
    }

    pub fn with_base_delay_secs(mut self, secs: f64) -> Self {
        self.base_delay = secs;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay.as_secs_f64();
        self
    }

    pub fn with_max_delay_secs(mut self, secs: f64) -> Self {
        self.max_delay = secs;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Clears the overall timeout.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Validates the settings.
    pub fn build(self) -> Result<RetryConfiguration, ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::MaxAttempts(self.max_attempts));
        }
        let base_delay = secs_to_duration(self.base_delay).ok_or(ConfigError::BaseDelay(self.base_delay))?;
        let max_delay = secs_to_duration(self.max_delay)
            .filter(|max| *max >= base_delay)
            .ok_or(ConfigError::MaxDelay {
                base: self.base_delay,
                max: self.max_delay,
            })?;
        if !is_non_negative(self.backoff_multiplier) {
            return Err(ConfigError::Multiplier(self.backoff_multiplier));
        }
        if !is_non_negative(self.jitter_factor) {
            return Err(ConfigError::JitterFactor(self.jitter_factor));
        }
        let timeout = match self.timeout {
            Some(secs) => Some(secs_to_duration(secs).ok_or(ConfigError::Timeout(secs))?),
            None => None,
        }
        .filter(|limit| !limit.is_zero());

        Ok(RetryConfiguration {
            max_attempts: self.max_attempts,
            policy: self.policy,
            base_delay,
            max_delay,
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            timeout,
        })
    }
}

#[inline]
fn is_non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn secs_to_duration(secs: f64) -> Option<Duration> {
    if is_non_negative(secs) {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Named configurations for common workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryPreset {
    /// 3 attempts, exponential ×2 from 1s, capped at 60s.
    Default,
    /// 5 attempts, exponential ×1.5 from 0.5s, capped at 30s.
    Aggressive,
    /// 2 attempts, fixed 5s.
    Conservative,
    /// 3 attempts, fixed 0.1s (short operations).
    Quick,
    /// 5 attempts, jittered exponential ×2 from 2s (±30%), capped at 120s, 5 min budget.
    NetworkOperation,
    /// 3 attempts, linear from 1s, capped at 10s, 1 min budget.
    FileOperation,
    /// 3 attempts, exponential ×2 from 5s, capped at 300s, 1 h budget.
    RecordingOperation,
}

impl RetryPreset {
    /// Builds the preset's configuration.
    pub fn configuration(self) -> RetryConfiguration {
        let secs = Duration::from_secs_f64;
        let (max_attempts, policy, base, max, multiplier, jitter, timeout) = match self {
            RetryPreset::Default => (3, RetryPolicy::ExponentialBackoff, 1.0, 60.0, 2.0, 0.1, None),
            RetryPreset::Aggressive => (5, RetryPolicy::ExponentialBackoff, 0.5, 30.0, 1.5, 0.1, None),
            RetryPreset::Conservative => (2, RetryPolicy::FixedDelay, 5.0, 10.0, 2.0, 0.1, None),
            RetryPreset::Quick => (3, RetryPolicy::FixedDelay, 0.1, 1.0, 2.0, 0.1, None),
            RetryPreset::NetworkOperation => {
                (5, RetryPolicy::RandomJitter, 2.0, 120.0, 2.0, 0.3, Some(300.0))
            }
            RetryPreset::FileOperation => {
                (3, RetryPolicy::LinearBackoff, 1.0, 10.0, 2.0, 0.1, Some(60.0))
            }
            RetryPreset::RecordingOperation => {
                (3, RetryPolicy::ExponentialBackoff, 5.0, 300.0, 2.0, 0.1, Some(3600.0))
            }
        };

        RetryConfiguration {
            max_attempts,
            policy,
            base_delay: secs(base),
            max_delay: secs(max),
            backoff_multiplier: multiplier,
            jitter_factor: jitter,
            timeout: timeout.map(secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RetryConfiguration::default();
        assert_eq!(cfg.max_attempts(), 3);
        assert_eq!(cfg.policy(), &RetryPolicy::ExponentialBackoff);
        assert_eq!(cfg.base_delay(), Duration::from_secs(1));
        assert_eq!(cfg.max_delay(), Duration::from_secs(60));
        assert_eq!(cfg.timeout(), None);
        assert_eq!(RetryConfiguration::builder().build().unwrap(), cfg);
    }

    #[test]
    fn test_rejects_invalid_combinations() {
        let b = RetryConfiguration::builder;

        assert_eq!(b().with_max_attempts(0).build(), Err(ConfigError::MaxAttempts(0)));
        assert_eq!(
            b().with_base_delay_secs(-1.0).build(),
            Err(ConfigError::BaseDelay(-1.0))
        );
        assert!(matches!(
            b().with_base_delay_secs(f64::NAN).build(),
            Err(ConfigError::BaseDelay(_))
        ));
        assert_eq!(
            b().with_base_delay_secs(10.0).with_max_delay_secs(5.0).build(),
            Err(ConfigError::MaxDelay { base: 10.0, max: 5.0 })
        );
        assert!(matches!(
            b().with_max_delay_secs(f64::INFINITY).build(),
            Err(ConfigError::MaxDelay { .. })
        ));
        assert_eq!(
            b().with_backoff_multiplier(-2.0).build(),
            Err(ConfigError::Multiplier(-2.0))
        );
        assert_eq!(
            b().with_jitter_factor(-0.1).build(),
            Err(ConfigError::JitterFactor(-0.1))
        );
        assert_eq!(
            b().with_timeout_secs(-5.0).build(),
            Err(ConfigError::Timeout(-5.0))
        );
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let cfg = RetryConfiguration::builder()
            .with_timeout(Duration::ZERO)
            .build()
            .unwrap();
        assert_eq!(cfg.timeout(), None);
        assert_eq!(
            RetryConfiguration::builder().with_timeout_secs(0.0).build().unwrap().timeout(),
            None
        );
    }

    #[test]
    fn test_equal_base_and_max_is_valid() {
        let cfg = RetryConfiguration::builder()
            .with_base_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(2))
            .build()
            .unwrap();
        assert_eq!(cfg.base_delay(), cfg.max_delay());
    }

    #[test]
    fn test_presets_match_their_workloads() {
        let net = RetryPreset::NetworkOperation.configuration();
        assert_eq!(net.max_attempts(), 5);
        assert_eq!(net.policy(), &RetryPolicy::RandomJitter);
        assert_eq!(net.jitter_factor(), 0.3);
        assert_eq!(net.timeout(), Some(Duration::from_secs(300)));

        let quick = RetryPreset::Quick.configuration();
        assert_eq!(quick.base_delay(), Duration::from_millis(100));
        assert_eq!(quick.policy(), &RetryPolicy::FixedDelay);

        let rec = RetryPreset::RecordingOperation.configuration();
        assert_eq!(rec.timeout(), Some(Duration::from_secs(3600)));

        for preset in [
            RetryPreset::Default,
            RetryPreset::Aggressive,
            RetryPreset::Conservative,
            RetryPreset::Quick,
            RetryPreset::NetworkOperation,
            RetryPreset::FileOperation,
            RetryPreset::RecordingOperation,
        ] {
            let cfg = preset.configuration();
            assert_eq!(cfg.to_builder().build().unwrap(), cfg, "{preset:?} round-trips");
        }
    }
}
