//! # RetryExecutor: bounded-attempt loop around a fallible operation.
//!
//! ## Flow
//! ```text
//! for attempt in 1..=max_attempts {
//!   ├─► abort_checker() ─────────────► Aborted
//!   ├─► elapsed >= timeout ──────────► Timeout
//!   ├─► sleep(delay from previous failure)
//!   ├─► op()
//!   │     ├─ Ok(v)  ──► Success(v)
//!   │     └─ Err(e) ──► record attempt
//!   │                   └─ attempts left?
//!   │                        ├─ should_retry == false ─► break
//!   │                        └─ delay = DelayCalculator::calculate(attempt, cfg, e)
//! }
//! └─► FailedAllAttempts(last error)
//! ```
//!
//! ## Rules
//! - The abort checker is polled only between attempts; an in-flight attempt
//!   always runs to completion.
//! - A panic inside the loop (operation included) is caught and reported as
//!   `FailedAllAttempts` with an `unexpected error: ...` message; an attempt
//!   that panicked is recorded as failed.
//! - The blocking variant has the same semantics with `std::thread::sleep`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{OperationError, panic_message};
use crate::policies::{DelayCalculator, ErrorChecker, RetryConditionChecker, RetryConfiguration};
use crate::retry::result::{RetryAttempt, RetryExecutionResult, RetryOutcome};
use crate::retry::stats::{RetryCounters, RetryStats};

/// External predicate polled between attempts; `true` aborts the session.
pub type AbortChecker = Arc<dyn Fn() -> bool + Send + Sync>;

/// Builds an [`AbortChecker`] that fires once `token` is cancelled.
pub fn abort_on_cancel(token: CancellationToken) -> AbortChecker {
    Arc::new(move || token.is_cancelled())
}

/// Runs operations under a [`RetryConfiguration`] and keeps session counters.
///
/// One executor can run many sessions concurrently; only the counters are shared.
#[derive(Default)]
pub struct RetryExecutor {
    counters: RetryCounters,
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `op` until it succeeds, the budget is spent, the condition checker
    /// says stop, the abort checker fires or the overall timeout elapses.
    ///
    /// # Example
    /// ```rust
    /// use std::time::Duration;
    /// use procvisor::{OperationError, RetryConfiguration, RetryExecutor, RetryPolicy};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let cfg = RetryConfiguration::builder()
    ///     .with_policy(RetryPolicy::FixedDelay)
    ///     .with_base_delay(Duration::from_millis(1))
    ///     .build()
    ///     .unwrap();
    ///
    /// let mut calls = 0;
    /// let result = RetryExecutor::new()
    ///     .execute_with_retry(
    ///         || {
    ///             calls += 1;
    ///             let n = calls;
    ///             async move {
    ///                 if n < 2 { Err(OperationError::fail("flaky")) } else { Ok(n) }
    ///             }
    ///         },
    ///         &cfg,
    ///         None,
    ///         None,
    ///     )
    ///     .await;
    ///
    /// assert!(result.is_success());
    /// assert_eq!(result.value, Some(2));
    /// assert_eq!(result.attempt_count(), 2);
    /// # }
    /// ```
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        mut op: F,
        cfg: &RetryConfiguration,
        error_checker: Option<&ErrorChecker>,
        abort_checker: Option<&AbortChecker>,
    ) -> RetryExecutionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<OperationError>,
    {
        let clock = tokio::time::Instant::now();
        let mut session = Session::new(cfg, error_checker, abort_checker);

        let run = AssertUnwindSafe(async {
            for attempt in 1..=cfg.max_attempts() {
                let delay = match session.begin(attempt, clock.elapsed()) {
                    Step::Proceed(delay) => delay,
                    Step::Stop(outcome) => return (outcome, None),
                };
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let started_at = session.start(attempt);
                match op().await {
                    Ok(value) => {
                        session.succeeded(attempt, started_at);
                        return (RetryOutcome::Success, Some(value));
                    }
                    Err(err) => {
                        if !session.failed(attempt, started_at, err.into()) {
                            break;
                        }
                    }
                }
            }
            (RetryOutcome::FailedAllAttempts, None)
        })
        .catch_unwind()
        .await;

        let (outcome, value) = run.unwrap_or_else(|panic| session.crashed(panic_message(&*panic)));
        self.finish(session, outcome, value, clock.elapsed())
    }

    /// Blocking twin of [`execute_with_retry`](Self::execute_with_retry).
    ///
    /// Sleeps the calling thread between attempts; do not call it from an
    /// async task.
    pub fn execute_with_retry_blocking<T, E, F>(
        &self,
        mut op: F,
        cfg: &RetryConfiguration,
        error_checker: Option<&ErrorChecker>,
        abort_checker: Option<&AbortChecker>,
    ) -> RetryExecutionResult<T>
    where
        F: FnMut() -> Result<T, E>,
        E: Into<OperationError>,
    {
        let clock = std::time::Instant::now();
        let mut session = Session::new(cfg, error_checker, abort_checker);

        let run = std::panic::catch_unwind(AssertUnwindSafe(|| {
            for attempt in 1..=cfg.max_attempts() {
                let delay = match session.begin(attempt, clock.elapsed()) {
                    Step::Proceed(delay) => delay,
                    Step::Stop(outcome) => return (outcome, None),
                };
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }

                let started_at = session.start(attempt);
                match op() {
                    Ok(value) => {
                        session.succeeded(attempt, started_at);
                        return (RetryOutcome::Success, Some(value));
                    }
                    Err(err) => {
                        if !session.failed(attempt, started_at, err.into()) {
                            break;
                        }
                    }
                }
            }
            (RetryOutcome::FailedAllAttempts, None)
        }));

        let (outcome, value) = run.unwrap_or_else(|panic| session.crashed(panic_message(&*panic)));
        self.finish(session, outcome, value, clock.elapsed())
    }

    /// Returns a snapshot of the session counters.
    pub fn stats(&self) -> RetryStats {
        self.counters.snapshot()
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    fn finish<T>(
        &self,
        session: Session<'_>,
        outcome: RetryOutcome,
        value: Option<T>,
        total_duration: Duration,
    ) -> RetryExecutionResult<T> {
        self.counters.record(outcome, session.attempts.len());
        RetryExecutionResult {
            outcome,
            value,
            attempts: session.attempts,
            total_duration,
            final_error: session.final_error,
            configuration: session.cfg.clone(),
        }
    }
}

enum Step {
    Proceed(Duration),
    Stop(RetryOutcome),
}

/// Bookkeeping shared by the async and blocking loops.
struct Session<'a> {
    cfg: &'a RetryConfiguration,
    error_checker: Option<&'a ErrorChecker>,
    abort_checker: Option<&'a AbortChecker>,
    attempts: Vec<RetryAttempt>,
    final_error: Option<String>,
    next_delay: Duration,
    in_flight: Option<(u32, SystemTime)>,
}

impl<'a> Session<'a> {
    fn new(
        cfg: &'a RetryConfiguration,
        error_checker: Option<&'a ErrorChecker>,
        abort_checker: Option<&'a AbortChecker>,
    ) -> Self {
        Self {
            cfg,
            error_checker,
            abort_checker,
            attempts: Vec::new(),
            final_error: None,
            next_delay: Duration::ZERO,
            in_flight: None,
        }
    }

    /// Boundary checks before `attempt`; returns the wait to apply first.
    fn begin(&mut self, attempt: u32, elapsed: Duration) -> Step {
        if self.abort_checker.is_some_and(|abort| abort()) {
            info!(attempt, "retry aborted");
            self.final_error = Some("execution aborted".to_string());
            return Step::Stop(RetryOutcome::Aborted);
        }
        if let Some(limit) = self.cfg.timeout().filter(|limit| elapsed >= *limit) {
            info!(attempt, ?limit, ?elapsed, "retry deadline exceeded");
            self.final_error = Some(format!("timed out after {limit:?}"));
            return Step::Stop(RetryOutcome::Timeout);
        }
        if attempt > 1 && !self.next_delay.is_zero() {
            debug!(
                attempt,
                delay = ?self.next_delay,
                policy = self.cfg.policy().as_label(),
                "waiting before retry"
            );
        }
        Step::Proceed(self.next_delay)
    }

    /// Marks `attempt` as running; returns its start time.
    fn start(&mut self, attempt: u32) -> SystemTime {
        let started_at = SystemTime::now();
        self.in_flight = Some((attempt, started_at));
        started_at
    }

    fn succeeded(&mut self, attempt: u32, started_at: SystemTime) {
        self.push(attempt, started_at, None);
        self.final_error = None;
        info!(attempt, "operation succeeded");
    }

    /// Records a failure; returns `false` when the session should stop early.
    fn failed(&mut self, attempt: u32, started_at: SystemTime, error: OperationError) -> bool {
        let text = error.to_string();
        warn!(attempt, max_attempts = self.cfg.max_attempts(), error = %text, "attempt failed");
        self.push(attempt, started_at, Some(text.clone()));
        self.final_error = Some(text);

        if attempt >= self.cfg.max_attempts() {
            return true;
        }
        if !RetryConditionChecker::should_retry(attempt, self.cfg, &error, self.error_checker) {
            info!(attempt, label = error.as_label(), "error is not retryable, stopping");
            return false;
        }
        self.next_delay = DelayCalculator::calculate(attempt, self.cfg, Some(&error));
        true
    }

    fn crashed<T>(&mut self, message: String) -> (RetryOutcome, Option<T>) {
        warn!(error = %message, "retry loop panicked");
        let text = format!("unexpected error: {message}");
        if let Some((attempt, started_at)) = self.in_flight {
            self.push(attempt, started_at, Some(text.clone()));
        }
        self.final_error = Some(text);
        (RetryOutcome::FailedAllAttempts, None)
    }

    fn push(&mut self, attempt: u32, started_at: SystemTime, error: Option<String>) {
        self.in_flight = None;
        self.attempts.push(RetryAttempt {
            attempt_number: attempt,
            started_at,
            ended_at: SystemTime::now(),
            success: error.is_none(),
            error,
            delay_before: self.next_delay,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{RetryPolicy, checkers};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryConfiguration {
        RetryConfiguration::builder()
            .with_max_attempts(max_attempts)
            .with_policy(RetryPolicy::FixedDelay)
            .with_base_delay(Duration::from_millis(5))
            .build()
            .unwrap()
    }

    fn assert_numbered(result: &RetryExecutionResult<impl Sized>) {
        for (i, a) in result.attempts.iter().enumerate() {
            assert_eq!(a.attempt_number as usize, i + 1);
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_two_failures() {
        let calls = AtomicU32::new(0);
        let exec = RetryExecutor::new();
        let result = exec
            .execute_with_retry(
                || async {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => Err(OperationError::fail("flaky")),
                        n => Ok(n),
                    }
                },
                &quick(3),
                None,
                None,
            )
            .await;

        assert_eq!(result.outcome, RetryOutcome::Success);
        assert_eq!(result.value, Some(2));
        assert_eq!(result.attempt_count(), 3);
        assert_numbered(&result);
        assert!(result.attempts[2].success);
        assert!(!result.attempts[0].success);
        assert_eq!(result.attempts[0].delay_before, Duration::ZERO);
        assert_eq!(result.attempts[1].delay_before, Duration::from_millis(5));
        assert_eq!(result.final_error, None);
        assert_eq!(exec.stats().successful, 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let calls = AtomicU32::new(0);
        let result = RetryExecutor::new()
            .execute_with_retry(
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err::<(), _>(OperationError::fail(format!("attempt {n}")))
                },
                &quick(3),
                None,
                None,
            )
            .await;

        assert_eq!(result.outcome, RetryOutcome::FailedAllAttempts);
        assert_eq!(result.attempt_count(), 3);
        assert_numbered(&result);
        assert_eq!(result.final_error.as_deref(), Some("operation failed: attempt 3"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_early() {
        let calls = AtomicU32::new(0);
        let never = Arc::new(checkers::never_retry) as ErrorChecker;
        let result = RetryExecutor::new()
            .execute_with_retry(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(OperationError::Interrupted)
                },
                &quick(5),
                Some(&never),
                None,
            )
            .await;

        assert_eq!(result.outcome, RetryOutcome::FailedAllAttempts);
        assert_eq!(result.attempt_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_between_attempts() {
        let token = CancellationToken::new();
        let abort = abort_on_cancel(token.clone());
        let result = RetryExecutor::new()
            .execute_with_retry(
                || {
                    token.cancel();
                    async { Err::<(), _>(OperationError::fail("x")) }
                },
                &quick(5),
                None,
                Some(&abort),
            )
            .await;

        assert_eq!(result.outcome, RetryOutcome::Aborted);
        assert_eq!(result.attempt_count(), 1);
        assert_eq!(result.final_error.as_deref(), Some("execution aborted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_timeout() {
        let cfg = RetryConfiguration::builder()
            .with_max_attempts(10)
            .with_policy(RetryPolicy::FixedDelay)
            .with_base_delay(Duration::from_secs(1))
            .with_timeout(Duration::from_millis(2500))
            .build()
            .unwrap();
        let result = RetryExecutor::new()
            .execute_with_retry(
                || async { Err::<(), _>(OperationError::fail("down")) },
                &cfg,
                None,
                None,
            )
            .await;

        // Attempts start at 0s, 1s, 2s; the check before the fourth sees 3s elapsed.
        assert_eq!(result.outcome, RetryOutcome::Timeout);
        assert_eq!(result.attempt_count(), 3);
        assert!(result.final_error.is_some_and(|e| e.starts_with("timed out")));
    }

    #[tokio::test]
    async fn test_zero_timeout_runs_every_attempt() {
        let cfg = quick(2).to_builder().with_timeout(Duration::ZERO).build().unwrap();
        let result = RetryExecutor::new()
            .execute_with_retry(
                || async { Err::<(), _>(OperationError::fail("down")) },
                &cfg,
                None,
                None,
            )
            .await;

        assert_eq!(result.outcome, RetryOutcome::FailedAllAttempts);
        assert_eq!(result.attempt_count(), 2);
    }

    async fn explode() -> Result<(), OperationError> {
        panic!("op bug")
    }

    #[tokio::test]
    async fn test_panicking_operation_is_contained() {
        let exec = RetryExecutor::new();
        let result = exec
            .execute_with_retry(
                explode,
                &quick(3),
                None,
                None,
            )
            .await;

        assert_eq!(result.outcome, RetryOutcome::FailedAllAttempts);
        assert_eq!(result.final_error.as_deref(), Some("unexpected error: op bug"));
        assert_eq!(result.attempt_count(), 1);
        assert!(!result.attempts[0].success);
        assert_eq!(result.attempts[0].error.as_deref(), Some("unexpected error: op bug"));
        assert_eq!(exec.stats().failed, 1);
        assert_eq!(exec.stats().total_attempts, 1);
    }

    #[tokio::test]
    async fn test_panic_on_later_attempt_is_recorded() {
        let mut calls = 0u32;
        let result = RetryExecutor::new()
            .execute_with_retry(
                move || {
                    calls += 1;
                    let call = calls;
                    async move {
                        if call == 2 {
                            panic!("second call bug");
                        }
                        Err::<(), _>(OperationError::fail("down"))
                    }
                },
                &quick(3),
                None,
                None,
            )
            .await;

        assert_eq!(result.outcome, RetryOutcome::FailedAllAttempts);
        assert_eq!(result.attempt_count(), 2);
        assert_numbered(&result);
        assert!(result.attempts.iter().all(|a| !a.success));
        assert_eq!(
            result.attempts[1].error.as_deref(),
            Some("unexpected error: second call bug")
        );
    }

    #[test]
    fn test_blocking_variant_matches() {
        let mut calls = 0;
        let exec = RetryExecutor::new();
        let result = exec.execute_with_retry_blocking(
            || {
                calls += 1;
                if calls < 3 { Err("not yet") } else { Ok("done") }
            },
            &quick(3),
            None,
            None,
        );
        assert!(result.is_success());
        assert_eq!(result.attempt_count(), 3);
        assert_numbered(&result);

        let always: AbortChecker = Arc::new(|| true);
        let aborted = exec.execute_with_retry_blocking(
            || Ok::<_, OperationError>(()),
            &quick(3),
            None,
            Some(&always),
        );
        assert_eq!(aborted.outcome, RetryOutcome::Aborted);
        assert_eq!(aborted.attempt_count(), 0);

        let stats = exec.stats();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.total_attempts, 3);
        exec.reset_stats();
        assert_eq!(exec.stats().total_executions, 0);
    }
}
