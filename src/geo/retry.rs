//! Bounded retry with a fixed backoff.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Source of delays between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`.
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

/// Fixed number of attempts with a constant pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Pause after each failed attempt
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy. Zero attempts is treated as one.
    #[must_use]
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts
    /// run out. `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        mut op: F,
        retryable: impl Fn(&E) -> bool + Send,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        E: std::fmt::Display + Send,
        T: Send,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && retryable(&e) => {
                    tracing::debug!("Attempt {attempt}/{attempts} failed: {e}");
                    sleeper.sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requested delays without waiting.
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let result: Result<u32, String> = policy
            .run(
                &sleeper,
                |attempt| async move {
                    if attempt < 3 {
                        Err(format!("fail {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![Duration::from_secs(1); 2]);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let result: Result<(), String> = policy
            .run(&sleeper, |attempt| async move { Err(format!("fail {attempt}")) }, |_| true)
            .await;

        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::new(5, Duration::from_secs(1));

        let result: Result<(), String> = policy
            .run(&sleeper, |_| async { Err("fatal".to_string()) }, |_| false)
            .await;

        assert!(result.is_err());
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }
}
