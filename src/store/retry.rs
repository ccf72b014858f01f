use crate::app::config::NetworkSettings;
use crate::error::SyncError;
use std::future::Future;
use std::time::Duration;

/// Bounded retry for store calls. Every attempt runs under `timeout`; only
/// transient failures are retried, `attempts` times after the first try, with
/// a fixed `delay` in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn once(timeout: Duration) -> Self {
        Self {
            timeout,
            attempts: 0,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&NetworkSettings::default())
    }
}

impl From<&NetworkSettings> for RetryPolicy {
    fn from(settings: &NetworkSettings) -> Self {
        Self {
            timeout: settings.request_timeout,
            attempts: settings.retry_attempts,
            delay: settings.retry_delay,
        }
    }
}

pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut operation: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(elapsed) => Err(SyncError::from(elapsed)),
        };
        match result {
            Err(error) if error.is_transient() && attempt < policy.attempts => {
                attempt += 1;
                tracing::debug!(?error, attempt, "{label} failed, retrying");
                tokio::time::sleep(policy.delay).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            attempts,
            delay: Duration::from_millis(10),
        }
    }

    /// Fails with `error` for the first `failures` calls, then returns 7.
    async fn flaky(calls: Arc<AtomicU32>, failures: u32, error: SyncError) -> Result<u32, SyncError> {
        if calls.fetch_add(1, Ordering::SeqCst) < failures {
            Err(error)
        } else {
            Ok(7)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(policy(2), "probe", || {
            flaky(Arc::clone(&calls), 2, SyncError::Transient("down".to_string()))
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(policy(1), "probe", || {
            flaky(Arc::clone(&calls), 10, SyncError::Transient("down".to_string()))
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(policy(3), "probe", || {
            flaky(Arc::clone(&calls), 10, SyncError::Backend("boom".to_string()))
        })
        .await;
        assert_eq!(result, Err(SyncError::Backend("boom".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_as_transient() {
        let result = with_retry(policy(0), "probe", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, SyncError>(())
        })
        .await;
        assert!(result.unwrap_err().is_transient());
    }
}
