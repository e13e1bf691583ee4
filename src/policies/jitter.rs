//! # Symmetric jitter for retry delays.
//!
//! [`JitterSample`] is one draw of `U ∈ [-1, 1]`. Applied to an expected delay
//! `e` with factor `j` it yields `e + e·j·U`, i.e. a delay spread evenly
//! around `e`. The result can be negative when `j > 1`; callers clamp it.
//!
//! Samples are drawn from the thread-local RNG; [`JitterSample::fixed`] pins
//! a value for deterministic tests.

use rand::Rng;

/// One draw of the uniform jitter variable `U ∈ [-1, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JitterSample(f64);

impl JitterSample {
    /// Draws a fresh sample.
    pub fn draw() -> Self {
        Self(rand::rng().random_range(-1.0..=1.0))
    }

    /// Uses a fixed value, clamped into `[-1, 1]` (`NaN` becomes 0).
    pub fn fixed(u: f64) -> Self {
        if u.is_nan() {
            Self(0.0)
        } else {
            Self(u.clamp(-1.0, 1.0))
        }
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Returns `expected + expected × factor × U` (seconds, unclamped).
    #[inline]
    pub fn apply(self, expected_secs: f64, factor: f64) -> f64 {
        expected_secs + expected_secs * factor * self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_stays_in_range() {
        for _ in 0..1000 {
            let u = JitterSample::draw().value();
            assert!((-1.0..=1.0).contains(&u), "sample {u} out of range");
        }
    }

    #[test]
    fn test_fixed_clamps() {
        assert_eq!(JitterSample::fixed(3.0).value(), 1.0);
        assert_eq!(JitterSample::fixed(-7.0).value(), -1.0);
        assert_eq!(JitterSample::fixed(f64::NAN).value(), 0.0);
    }

    #[test]
    fn test_apply_spreads_around_expected() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(JitterSample::fixed(1.0).apply(10.0, 0.3), 13.0));
        assert!(close(JitterSample::fixed(-1.0).apply(10.0, 0.3), 7.0));
        assert!(close(JitterSample::fixed(0.0).apply(10.0, 0.3), 10.0));
        assert!(JitterSample::fixed(-1.0).apply(10.0, 2.0) < 0.0);
    }
}
