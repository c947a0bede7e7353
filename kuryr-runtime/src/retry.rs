//! Full-jitter exponential backoff around a handler invocation (C3):
//! triggered by a `Result` value rather than an HTTP status, and scoped to
//! one handler call rather than a whole stream.

use std::future::Future;
use std::time::{Duration, Instant};

use kuryr_k8s_core::HandlerError;
use rand::Rng;
use tracing::debug;

/// Parameters for [`with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total time budget across all attempts.
    pub timeout: Duration,
    /// Base interval the full-jitter backoff scales from.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Builds a policy from a timeout and interval, both in seconds.
    pub fn from_secs(timeout_s: u64, interval_s: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_s),
            interval: Duration::from_secs(interval_s),
        }
    }
}

/// Invokes `call` (which should itself re-run the whole handler with the
/// same event) under `policy`, retrying only when the
/// attempt fails with [`HandlerError::ResourceNotReady`]. Any other error
/// is returned immediately. Returns the last error once the deadline is
/// exhausted.
pub async fn with_retry<F, Fut>(policy: RetryPolicy, mut call: F) -> Result<(), HandlerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), HandlerError>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match call().await {
            Ok(()) => return Ok(()),
            Err(err) if !err.is_resource_not_ready() => return Err(err),
            Err(err) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(err);
                }
                let remaining = deadline - now;
                let sleep_for = next_sleep(attempt, policy.interval).min(remaining);
                debug!(attempt, ?sleep_for, "retrying after ResourceNotReady");
                tokio::time::sleep(sleep_for).await;
            }
        }
    }
}

/// `random_int(1, 2^attempt - 1) * interval`, clamped so `attempt` never
/// overflows the shift.
fn next_sleep(attempt: u32, interval: Duration) -> Duration {
    let shift = attempt.min(31);
    let upper = (1u64 << shift).saturating_sub(1).max(1);
    let jitter = rand::rng().random_range(1..=upper);
    interval.saturating_mul(jitter as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retry_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = with_retry(RetryPolicy::from_secs(60, 1), move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_resource_not_ready_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = with_retry(RetryPolicy::from_secs(60, 1), move || {
            let n = calls2.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(HandlerError::resource_not_ready("endpoints/web"))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_integrity_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = with_retry(RetryPolicy::from_secs(60, 1), move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            async { Err(HandlerError::integrity("bad selfLink")) }
        })
        .await;
        assert!(matches!(result, Err(HandlerError::Integrity(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_once_the_deadline_passes() {
        let result = with_retry(RetryPolicy::from_secs(0, 1), || async {
            Err(HandlerError::resource_not_ready("endpoints/web"))
        })
        .await;
        assert!(result.is_err());
    }
}
