//! Retry orchestration: run any fallible operation under a [`RetryConfiguration`].
//!
//! ## Contents
//! - [`RetryExecutor`] the attempt loop (async and blocking), with [`RetryStats`]
//! - [`RetryExecutionResult`], [`RetryAttempt`], [`RetryOutcome`] what a session produced
//! - [`AbortChecker`], [`abort_on_cancel`] external cancellation between attempts
//! - [`retry_async`], [`retry_blocking`] `Result`-returning shorthands
//!
//! ## Wiring with the supervision engine
//! ```text
//! RetryExecutor::execute_with_retry(|| async {
//!     engine.execute(&request, observers, parsers).await.into_result()
//! }, &cfg, checker, abort)
//! ```
//! The engine enforces the per-attempt timeout and the concurrency ceiling;
//! the executor enforces the attempt budget, the backoff and the overall deadline.

mod executor;
mod result;
mod stats;

pub use executor::{AbortChecker, RetryExecutor, abort_on_cancel};
pub use result::{RetryAttempt, RetryExecutionResult, RetryOutcome};
pub use stats::RetryStats;

use crate::error::{OperationError, RetryError};
use crate::policies::RetryConfiguration;

/// Retries `op` under `cfg` with the default retry condition.
///
/// # Example
/// ```rust
/// use procvisor::{OperationError, RetryConfiguration, RetryOutcome, retry_async};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cfg = RetryConfiguration::builder().with_max_attempts(1).build().unwrap();
/// let err = retry_async(|| async { Err::<(), _>(OperationError::fail("down")) }, &cfg)
///     .await
///     .unwrap_err();
/// assert_eq!(err.outcome, RetryOutcome::FailedAllAttempts);
/// assert_eq!(err.attempts, 1);
/// # }
/// ```
pub async fn retry_async<T, E, F, Fut>(op: F, cfg: &RetryConfiguration) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<OperationError>,
{
    RetryExecutor::new()
        .execute_with_retry(op, cfg, None, None)
        .await
        .into_result()
}

/// Blocking counterpart of [`retry_async`].
pub fn retry_blocking<T, E, F>(op: F, cfg: &RetryConfiguration) -> Result<T, RetryError>
where
    F: FnMut() -> Result<T, E>,
    E: Into<OperationError>,
{
    RetryExecutor::new()
        .execute_with_retry_blocking(op, cfg, None, None)
        .into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::{RetryPolicy, RetryPreset};
    use std::time::Duration;

    #[tokio::test]
    async fn test_retry_async_returns_value() {
        let cfg = RetryConfiguration::preset(RetryPreset::Quick)
            .to_builder()
            .with_base_delay(Duration::from_millis(1))
            .build()
            .unwrap();
        let mut left = 2;
        let value = retry_async(
            || {
                left -= 1;
                let ready = left == 0;
                async move { if ready { Ok(42) } else { Err("warming up") } }
            },
            &cfg,
        )
        .await;
        assert_eq!(value, Ok(42));
    }

    #[test]
    fn test_retry_blocking_reports_fatal_stop() {
        let cfg = RetryConfiguration::builder()
            .with_policy(RetryPolicy::FixedDelay)
            .with_base_delay(Duration::ZERO)
            .with_max_attempts(4)
            .build()
            .unwrap();
        let err = retry_blocking(|| Err::<(), _>(OperationError::ExitRequested), &cfg).unwrap_err();
        assert_eq!(err.outcome, RetryOutcome::FailedAllAttempts);
        assert_eq!(err.attempts, 1);
        assert_eq!(err.final_error, "exit requested");
    }
}
