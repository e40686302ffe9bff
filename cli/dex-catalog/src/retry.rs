//! Retry with exponential backoff for catalog requests.
//!
//! The client itself never retries; callers wrap requests in [retry] when a
//! failed request should be repeated.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::FetchError;

/// How often and how patiently a failed request is repeated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of attempts after the first one.
    pub max_retries: u32,
    /// Backoff before the first retry, doubled for every further one.
    pub initial_backoff: Duration,
    /// Upper bound of the backoff.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Backoff before retry number `attempt` (0-based): `min(initial * 2^attempt, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy is
/// exhausted.
///
/// Backoff sleeps end early with [FetchError::Cancelled] when `cancel` fires.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let backoff = policy.backoff(attempt);
                debug!(%err, attempt, ?backoff, "retrying catalog request");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {},
                }
                attempt += 1;
            },
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn network_error() -> FetchError {
        FetchError::Network {
            message: "connection reset".to_string(),
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(16));
        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = retry(&RetryPolicy::default(), &CancellationToken::new(), || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(network_error())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default().with_max_retries(2);
        let result: Result<(), _> = retry(&policy, &CancellationToken::new(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(network_error())
        })
        .await;

        assert_eq!(result, Err(network_error()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_not_found() {
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<(), _> = retry(&RetryPolicy::default(), &cancel, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::NotFound {
                what: "item '0'".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(FetchError::NotFound { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = retry(&RetryPolicy::default(), &cancel, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            cancel.cancel();
            Err(network_error())
        })
        .await;

        assert_eq!(result, Err(FetchError::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
