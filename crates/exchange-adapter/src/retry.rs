use market_types::ScanError;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter, shared across every adapter implementation (§4.1).
///
/// On rate-limit or transient network failure the caller backs off starting at `base`,
/// doubling each attempt, plus uniform random jitter in `[0, jitter_pct * current_backoff]`.
/// After `max_retries` attempts the failure surfaces unchanged — jitter exists so that
/// concurrent workers hitting the same limit don't retry in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub jitter_pct: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_secs_f64(1.0),
            jitter_pct: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration, jitter_pct: f64) -> Self {
        Self { max_retries, base, jitter_pct }
    }

    /// Runs `op` up to `max_retries + 1` times. `op` returns `Retryable(true)` errors to
    /// signal a rate-limit/transient failure worth backing off on; any other error is
    /// returned immediately without retrying.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ScanError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RetryableError>>,
    {
        let mut backoff = self.base;
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RetryableError::Permanent(e)) => return Err(e),
                Err(RetryableError::Transient(e)) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(e);
                    }
                    let jitter_secs = backoff.as_secs_f64() * self.jitter_pct * rand::thread_rng().gen::<f64>();
                    let sleep_for = backoff + Duration::from_secs_f64(jitter_secs);
                    tracing::warn!(attempt, max = self.max_retries, sleep_secs = sleep_for.as_secs_f64(), "adapter call failed, backing off");
                    tokio::time::sleep(sleep_for).await;
                    backoff *= 2;
                }
            }
        }
    }
}

/// An error from an adapter call, tagged with whether the retry policy should retry it.
#[derive(Debug, Clone)]
pub enum RetryableError {
    Transient(ScanError),
    Permanent(ScanError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 0.0);
        let result = policy.run(|| async { Ok::<_, RetryableError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 0.0);
        let calls = AtomicU32::new(0);
        let result = policy
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RetryableError::Transient(ScanError::RateLimited("429".into())))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rplus1th_failure_propagates_unchanged() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 0.0);
        let calls = AtomicU32::new(0);
        let result: Result<(), ScanError> = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RetryableError::Transient(ScanError::RateLimited("still limited".into())))
            })
            .await;
        assert!(result.is_err());
        // 1 initial attempt + 3 retries = 4 calls total
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_error_never_retries() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 0.0);
        let calls = AtomicU32::new(0);
        let result: Result<(), ScanError> = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RetryableError::Permanent(ScanError::InvalidArgument("bad symbol".into())))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
