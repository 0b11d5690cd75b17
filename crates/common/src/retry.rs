//! Bounded retry with exponential backoff.
//!
//! Every CA network call goes through [`RetryPolicy::run`]. A failed attempt
//! is followed by a wait that starts at `initial_wait` and is multiplied
//! after each failure (no jitter, no cap). When the attempt budget is spent
//! the last error is returned wrapped in [`RetryExhausted`].
//!
//! Waiting goes through the [`Sleeper`] trait so tests can observe the
//! backoff schedule without sleeping in real time.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Backoff multiplier applied after each failed attempt.
pub const DEFAULT_MULTIPLIER: u32 = 2;

/// Something that can suspend the caller for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// All attempts of a retried operation failed.
#[derive(Debug, Error)]
#[error("operation failed after {attempts} attempts: {last}")]
pub struct RetryExhausted<E> {
    /// Number of attempts made
    pub attempts: u32,
    /// Error returned by the final attempt
    #[source]
    pub last: E,
}

impl<E> RetryExhausted<E> {
    /// Unwrap the error of the final attempt.
    pub fn into_last(self) -> E {
        self.last
    }
}

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (zero behaves as one)
    pub max_attempts: u32,
    /// Wait after the first failure
    pub initial_wait: Duration,
    /// Factor applied to the wait after every failure
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Create a doubling policy.
    pub fn new(max_attempts: u32, initial_wait: Duration) -> Self {
        Self {
            max_attempts,
            initial_wait,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }

    /// Effective number of attempts.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    pub async fn run<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        mut op: F,
    ) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.attempts();
        let mut wait = self.initial_wait;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= attempts => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Operation failed, giving up"
                    );
                    return Err(RetryExhausted { attempts, last: e });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    sleeper.sleep(wait).await;
                    wait = wait.saturating_mul(self.multiplier);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn waits(&self) -> Vec<Duration> {
            self.waits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    fn block_on<F: Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    async fn fail_times(
        policy: RetryPolicy,
        sleeper: &RecordingSleeper,
        failures: u32,
        calls: &AtomicU32,
    ) -> Result<&'static str, RetryExhausted<String>> {
        policy
            .run(sleeper, move || async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= failures {
                    Err(format!("failure {}", call))
                } else {
                    Ok("done")
                }
            })
            .await
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_wait() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(15));

        let result = fail_times(policy, &sleeper, 0, &calls).await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let err = fail_times(policy, &sleeper, u32::MAX, &calls)
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last, "failure 3");
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::from_secs(1));

        let err = fail_times(policy, &sleeper, u32::MAX, &calls)
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits_on_timer() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    proptest! {
        #[test]
        fn prop_recovers_after_k_failures(max_attempts in 1u32..8, k_seed in 0u32..8, wait_ms in 1u64..1000) {
            let k = k_seed % max_attempts;
            let sleeper = RecordingSleeper::default();
            let calls = AtomicU32::new(0);
            let policy = RetryPolicy::new(max_attempts, Duration::from_millis(wait_ms));

            let result = block_on(fail_times(policy, &sleeper, k, &calls));

            prop_assert_eq!(result.unwrap(), "done");
            prop_assert_eq!(calls.load(Ordering::SeqCst), k + 1);
            let expected: Vec<Duration> = (0..k)
                .map(|i| Duration::from_millis(wait_ms * (1u64 << i)))
                .collect();
            prop_assert_eq!(sleeper.waits(), expected);
        }

        #[test]
        fn prop_always_failing_uses_every_attempt(max_attempts in 1u32..8) {
            let sleeper = RecordingSleeper::default();
            let calls = AtomicU32::new(0);
            let policy = RetryPolicy::new(max_attempts, Duration::from_millis(10));

            let err = block_on(fail_times(policy, &sleeper, u32::MAX, &calls)).unwrap_err();

            prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
            prop_assert_eq!(err.attempts, max_attempts);
            let expected_last = format!("failure {}", max_attempts);
            prop_assert_eq!(err.last, expected_last);
            prop_assert_eq!(sleeper.waits().len() as u32, max_attempts - 1);
        }
    }
}
