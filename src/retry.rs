//! Bounded retry with exponential backoff for latent external calls.
//!
//! The delay primitive is injectable so tests run without real timers; the
//! loop is explicit (attempt counter, no recursion).

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): base * 2^retry, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(retry));
        exp.min(self.max_delay)
    }

    /// Runs `op` until it succeeds or `max_attempts` is exhausted, sleeping
    /// with `tokio::time::sleep` between attempts. The final error is
    /// returned as-is; the caller decides whether a dropped unit aborts
    /// anything (for batch generation it never does).
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with_sleep(op, tokio::time::sleep).await
    }

    /// Same as `run`, with an injectable sleep primitive.
    pub async fn run_with_sleep<T, E, F, Fut, S, SFut>(
        &self,
        mut op: F,
        mut sleep: S,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        S: FnMut(Duration) -> SFut,
        SFut: Future<Output = ()>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after failure");
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let slept = Arc::new(Mutex::new(Vec::new()));
        let calls_in = Arc::clone(&calls);
        let slept_in = Arc::clone(&slept);

        let result: Result<u32, &str> = policy()
            .run_with_sleep(
                move || {
                    let n = calls_in.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("transient")
                        } else {
                            Ok(42)
                        }
                    }
                },
                move |d| {
                    slept_in.lock().unwrap().push(d);
                    async {}
                },
            )
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // exponential: 100ms then 200ms
        assert_eq!(
            *slept.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);
        let result: Result<(), String> = policy()
            .run_with_sleep(
                move || {
                    let n = calls_in.fetch_add(1, Ordering::SeqCst);
                    async move { Err(format!("failure {n}")) }
                },
                |_| async {},
            )
            .await;
        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_success_never_sleeps() {
        let slept = Arc::new(Mutex::new(Vec::new()));
        let slept_in = Arc::clone(&slept);
        let result: Result<u32, &str> = policy()
            .run_with_sleep(
                || async { Ok(7) },
                move |d| {
                    slept_in.lock().unwrap().push(d);
                    async {}
                },
            )
            .await;
        assert_eq!(result, Ok(7));
        assert!(slept.lock().unwrap().is_empty());
    }

    #[test]
    fn delays_are_capped() {
        let p = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(p.delay_for(0), Duration::from_secs(4));
        assert_eq!(p.delay_for(1), Duration::from_secs(8));
        assert_eq!(p.delay_for(2), Duration::from_secs(10));
        assert_eq!(p.delay_for(9), Duration::from_secs(10));
    }
}
