//! Session counters of a [`RetryExecutor`](crate::RetryExecutor).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::retry::result::RetryOutcome;

/// Snapshot of retry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    /// Sessions run.
    pub total_executions: u64,
    pub successful: u64,
    /// Sessions that ended `FailedAllAttempts`.
    pub failed: u64,
    pub aborted: u64,
    pub timed_out: u64,
    /// Attempts made across all sessions.
    pub total_attempts: u64,
}

impl RetryStats {
    /// Share of sessions that succeeded (0.0 when none ran).
    pub fn success_rate(&self) -> f64 {
        ratio(self.successful, self.total_executions)
    }

    /// Mean attempts per session (0.0 when none ran).
    pub fn average_attempts(&self) -> f64 {
        ratio(self.total_attempts, self.total_executions)
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[derive(Default)]
pub(crate) struct RetryCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
    timed_out: AtomicU64,
    attempts: AtomicU64,
}

impl RetryCounters {
    pub(crate) fn record(&self, outcome: RetryOutcome, attempts: usize) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.attempts
            .fetch_add(u64::try_from(attempts).unwrap_or(u64::MAX), Ordering::Relaxed);
        let counter = match outcome {
            RetryOutcome::Success => &self.successful,
            RetryOutcome::FailedAllAttempts => &self.failed,
            RetryOutcome::Aborted => &self.aborted,
            RetryOutcome::Timeout => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RetryStats {
        RetryStats {
            total_executions: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            total_attempts: self.attempts.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.total,
            &self.successful,
            &self.failed,
            &self.aborted,
            &self.timed_out,
            &self.attempts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_and_reset() {
        let c = RetryCounters::default();
        assert_eq!(c.snapshot().success_rate(), 0.0);
        assert_eq!(c.snapshot().average_attempts(), 0.0);

        c.record(RetryOutcome::Success, 1);
        c.record(RetryOutcome::Success, 3);
        c.record(RetryOutcome::FailedAllAttempts, 3);
        c.record(RetryOutcome::Aborted, 1);

        let s = c.snapshot();
        assert_eq!(s.total_executions, 4);
        assert_eq!(s.failed, 1);
        assert_eq!(s.aborted, 1);
        assert!((s.success_rate() - 0.5).abs() < f64::EPSILON);
        assert!((s.average_attempts() - 2.0).abs() < f64::EPSILON);

        c.reset();
        assert_eq!(c.snapshot(), RetryStats::default());
    }
}
