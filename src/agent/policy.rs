//! Uniform timeout and retry policy for external calls.
//!
//! Every call to an LLM provider, tool collaborator, or store goes
//! through a [`CallPolicy`], parameterized per collaborator from
//! [`AgentConfig`](super::config::AgentConfig).

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AgentError;

/// Bounded timeout plus exponential-backoff retry for one collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Budget for a single attempt.
    pub timeout: Duration,
    /// Extra attempts allowed after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
}

impl CallPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(timeout: Duration, max_retries: u32, backoff: Duration) -> Self {
        Self {
            timeout,
            max_retries,
            backoff,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor)
    }

    /// Runs `op` under this policy.
    ///
    /// Each attempt is bounded by [`timeout`](Self::timeout); an elapsed
    /// attempt becomes [`AgentError::Timeout`]. Failures that report
    /// [`AgentError::is_retryable`] are retried up to
    /// [`max_retries`](Self::max_retries) times.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted or a
    /// non-retryable error occurs.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::time::timeout(self.timeout, op())
                .await
                .unwrap_or_else(|_| {
                    Err(AgentError::Timeout {
                        operation: operation.to_string(),
                        timeout: self.timeout,
                    })
                });

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_retries && e.is_retryable() => {
                    attempt += 1;
                    let delay = self.backoff_for(attempt);
                    warn!(operation, attempt, ?delay, error = %e, "retrying external call");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(retries: u32) -> CallPolicy {
        CallPolicy::new(Duration::from_millis(50), retries, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_doubles() {
        let p = CallPolicy::new(Duration::from_secs(1), 3, Duration::from_millis(100));
        assert_eq!(p.backoff_for(1), Duration::from_millis(100));
        assert_eq!(p.backoff_for(2), Duration::from_millis(200));
        assert_eq!(p.backoff_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result = policy(2)
            .run("flaky", || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(AgentError::ApiRequest {
                            message: "reset".to_string(),
                            status: None,
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap_or_default(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_parse_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), AgentError> = policy(3)
            .run("parse", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AgentError::ResponseParse {
                        message: "bad".to_string(),
                        content: String::new(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_error() {
        let result: Result<(), AgentError> = policy(0)
            .run("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AgentError::Timeout { .. })));
    }
}
