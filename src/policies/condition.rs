//! # Retry eligibility.
//!
//! [`RetryConditionChecker::should_retry`] decides, after a failed attempt,
//! whether another attempt should be made:
//!
//! 1. `attempt >= max_attempts` → stop (budget exhausted);
//! 2. a custom [`ErrorChecker`] is authoritative (a panicking checker means stop);
//! 3. otherwise everything is retried except the fatal categories
//!    (see [`OperationError::is_fatal`]).
//!
//! [`checkers`] holds reusable predicates for common error families.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tracing::warn;

use crate::error::OperationError;
use crate::policies::config::RetryConfiguration;

/// Custom retry predicate: `true` means "retry this error".
pub type ErrorChecker = Arc<dyn Fn(&OperationError) -> bool + Send + Sync>;

/// Stateless retry-eligibility decision.
pub struct RetryConditionChecker;

impl RetryConditionChecker {
    /// Returns `true` if the attempt that just failed should be followed by another one.
    pub fn should_retry(
        attempt: u32,
        cfg: &RetryConfiguration,
        error: &OperationError,
        checker: Option<&ErrorChecker>,
    ) -> bool {
        if attempt >= cfg.max_attempts() {
            return false;
        }
        match checker {
            Some(check) => match std::panic::catch_unwind(AssertUnwindSafe(|| check(error))) {
                Ok(verdict) => verdict,
                Err(_) => {
                    warn!(attempt, error = %error, "error checker panicked, not retrying");
                    false
                }
            },
            None => !error.is_fatal(),
        }
    }
}

/// Reusable [`ErrorChecker`] predicates.
///
/// ```rust
/// use std::sync::Arc;
/// use procvisor::{ErrorChecker, OperationError, checkers};
///
/// let network: ErrorChecker = Arc::new(checkers::network_errors);
/// assert!(network(&OperationError::fail("Connection reset by peer")));
/// assert!(!network(&OperationError::fail("bad header")));
/// ```
pub mod checkers {
    use std::io::ErrorKind;
    use std::sync::Arc;

    use super::ErrorChecker;
    use crate::error::OperationError;

    const NETWORK_KEYWORDS: &[&str] = &[
        "connection",
        "network",
        "timeout",
        "unreachable",
        "dns",
        "socket",
        "refused",
        "reset",
    ];

    const FILE_KEYWORDS: &[&str] = &[
        "permission denied",
        "file not found",
        "directory",
        "disk",
        "space",
        "access",
    ];

    fn mentions(error: &OperationError, keywords: &[&str]) -> bool {
        let text = error.to_string().to_lowercase();
        keywords.iter().any(|k| text.contains(k))
    }

    /// Connection-level I/O failures, timeouts, or messages mentioning the network.
    pub fn network_errors(error: &OperationError) -> bool {
        match error {
            OperationError::Timeout { .. } => true,
            OperationError::Io { kind, .. }
                if matches!(
                    kind,
                    ErrorKind::ConnectionRefused
                        | ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::NotConnected
                        | ErrorKind::AddrNotAvailable
                        | ErrorKind::BrokenPipe
                        | ErrorKind::TimedOut
                        | ErrorKind::HostUnreachable
                        | ErrorKind::NetworkUnreachable
                        | ErrorKind::NetworkDown
                ) =>
            {
                true
            }
            _ => mentions(error, NETWORK_KEYWORDS),
        }
    }

    /// Any I/O failure, or messages mentioning files, disks or access.
    pub fn file_operation_errors(error: &OperationError) -> bool {
        matches!(error, OperationError::Io { .. }) || mentions(error, FILE_KEYWORDS)
    }

    /// Failures likely to go away on their own (network trouble and timeouts).
    pub fn temporary_errors(error: &OperationError) -> bool {
        network_errors(error)
    }

    /// Retries everything except fatal categories and invalid input.
    pub fn never_retry(error: &OperationError) -> bool {
        !(error.is_fatal() || matches!(error, OperationError::Invalid { .. }))
    }

    /// Retries errors whose message contains any of `keywords` (case-insensitive).
    pub fn keywords<I, S>(keywords: I) -> ErrorChecker
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .collect();
        Arc::new(move |error: &OperationError| {
            let text = error.to_string().to_lowercase();
            words.iter().any(|k| text.contains(k.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::checkers;
    use super::*;
    use std::io;
    use std::time::Duration;

    fn cfg(max_attempts: u32) -> RetryConfiguration {
        RetryConfiguration::builder()
            .with_max_attempts(max_attempts)
            .build()
            .unwrap()
    }

    #[test]
    fn test_budget_bounds() {
        let c = cfg(3);
        let err = OperationError::fail("x");
        let yes: ErrorChecker = Arc::new(|_: &OperationError| true);

        assert!(RetryConditionChecker::should_retry(1, &c, &err, None));
        assert!(RetryConditionChecker::should_retry(2, &c, &err, None));
        assert!(!RetryConditionChecker::should_retry(3, &c, &err, None));
        assert!(!RetryConditionChecker::should_retry(3, &c, &err, Some(&yes)));
        assert!(!RetryConditionChecker::should_retry(7, &c, &err, Some(&yes)));
    }

    #[test]
    fn test_fatal_errors_are_never_retried_by_default() {
        let c = cfg(5);
        for err in [
            OperationError::Interrupted,
            OperationError::ExitRequested,
            OperationError::OutOfMemory,
        ] {
            assert!(!RetryConditionChecker::should_retry(1, &c, &err, None));
        }
        let timeout = OperationError::Timeout {
            timeout: Duration::from_secs(1),
        };
        assert!(RetryConditionChecker::should_retry(1, &c, &timeout, None));
    }

    #[test]
    fn test_custom_checker_is_authoritative() {
        let c = cfg(5);
        let no: ErrorChecker = Arc::new(|_: &OperationError| false);
        let yes: ErrorChecker = Arc::new(|_: &OperationError| true);
        let boom: ErrorChecker = Arc::new(|_: &OperationError| -> bool { panic!("checker bug") });

        assert!(!RetryConditionChecker::should_retry(1, &c, &OperationError::fail("x"), Some(&no)));
        assert!(RetryConditionChecker::should_retry(1, &c, &OperationError::Interrupted, Some(&yes)));
        assert!(!RetryConditionChecker::should_retry(1, &c, &OperationError::fail("x"), Some(&boom)));
    }

    #[test]
    fn test_common_checkers() {
        let refused: OperationError = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        let denied: OperationError = io::Error::from(io::ErrorKind::PermissionDenied).into();

        assert!(checkers::network_errors(&refused));
        assert!(checkers::network_errors(&OperationError::fail("DNS lookup failed")));
        assert!(!checkers::network_errors(&OperationError::fail("bad header")));

        assert!(checkers::file_operation_errors(&denied));
        assert!(checkers::file_operation_errors(&OperationError::fail("No space left on disk")));
        assert!(!checkers::file_operation_errors(&OperationError::fail("bad header")));

        assert!(checkers::temporary_errors(&OperationError::Timeout {
            timeout: Duration::from_secs(1)
        }));

        assert!(checkers::never_retry(&OperationError::fail("x")));
        assert!(!checkers::never_retry(&OperationError::invalid("bad url")));
        assert!(!checkers::never_retry(&OperationError::OutOfMemory));

        let kw = checkers::keywords(["Rate Limit", "503"]);
        assert!(kw(&OperationError::fail("server said: rate limit exceeded")));
        assert!(kw(&OperationError::Process {
            exit_code: Some(1),
            error: "HTTP 503".into()
        }));
        assert!(!kw(&OperationError::fail("404")));
    }
}
