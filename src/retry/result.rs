//! Outcome records of a retry session.

use std::time::{Duration, SystemTime};

use crate::error::RetryError;
use crate::policies::RetryConfiguration;

/// Terminal outcome of a retry session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryOutcome {
    /// The last attempt succeeded.
    Success,
    /// The attempt budget was exhausted, or the condition checker stopped early.
    FailedAllAttempts,
    /// The abort checker fired between attempts.
    Aborted,
    /// The overall session deadline elapsed.
    Timeout,
}

impl RetryOutcome {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RetryOutcome::Success => "success",
            RetryOutcome::FailedAllAttempts => "failed_all_attempts",
            RetryOutcome::Aborted => "aborted",
            RetryOutcome::Timeout => "timeout",
        }
    }
}

/// One invocation of the wrapped operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based, strictly increasing within a session.
    pub attempt_number: u32,
    pub started_at: SystemTime,
    pub ended_at: SystemTime,
    pub success: bool,
    /// Error text when the attempt failed.
    pub error: Option<String>,
    /// Wait that preceded this attempt (zero for the first one).
    pub delay_before: Duration,
}

impl RetryAttempt {
    /// Wall-clock time spent in the operation (zero if the clock went backwards).
    pub fn duration(&self) -> Duration {
        self.ended_at
            .duration_since(self.started_at)
            .unwrap_or_default()
    }
}

/// Result of [`RetryExecutor::execute_with_retry`](crate::RetryExecutor::execute_with_retry).
#[derive(Debug, Clone)]
pub struct RetryExecutionResult<T> {
    pub outcome: RetryOutcome,
    /// Value produced by the successful attempt.
    pub value: Option<T>,
    /// Every attempt made, in order.
    pub attempts: Vec<RetryAttempt>,
    /// Wall-clock time of the whole session, waits included.
    pub total_duration: Duration,
    /// Error text explaining a non-successful outcome.
    pub final_error: Option<String>,
    /// Configuration the session ran with.
    pub configuration: RetryConfiguration,
}

impl<T> RetryExecutionResult<T> {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.outcome == RetryOutcome::Success
    }

    #[inline]
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Last attempt made, if any.
    pub fn last_attempt(&self) -> Option<&RetryAttempt> {
        self.attempts.last()
    }

    /// Mean operation time per attempt (`None` when no attempt was made).
    pub fn average_attempt_duration(&self) -> Option<Duration> {
        let count = u32::try_from(self.attempts.len()).ok().filter(|n| *n > 0)?;
        let total: Duration = self.attempts.iter().map(RetryAttempt::duration).sum();
        Some(total / count)
    }

    /// Converts into `Result`, for callers preferring `?` control flow.
    pub fn into_result(self) -> Result<T, RetryError> {
        let attempts = self.attempts.len();
        match (self.outcome, self.value) {
            (RetryOutcome::Success, Some(value)) => Ok(value),
            (outcome, _) => Err(RetryError {
                outcome,
                attempts,
                final_error: self
                    .final_error
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}
