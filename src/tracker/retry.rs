use std::future::Future;
use std::time::Duration;

use log::{error, warn};
use rocket::tokio;

use crate::error::Result;

/// How often, and how patiently, to rerun an operation the store aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// `attempts` counts the first try, so it is at least one.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the retry that follows the given failed attempt (1-based).
    /// Doubles each time.
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1 << exponent)
    }

    /// Run `operation` until it succeeds, fails with a non-transient error, or
    /// runs out of attempts. Each run starts from scratch.
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    let delay = self.delay(attempt);
                    warn!(
                        "{name}: attempt {attempt}/{} failed ({err}), retrying in {}ms",
                        self.attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    error!("{name}: giving up after {attempt} attempts ({err})");
                    return Err(err);
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::Error;

    use super::*;

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(50));
        assert_eq!(policy.delay(1), Duration::from_millis(50));
        assert_eq!(policy.delay(2), Duration::from_millis(100));
        assert_eq!(policy.delay(3), Duration::from_millis(200));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }

    #[rocket::async_test]
    async fn retries_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast()
            .run("test", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::TransientStore("write conflict".to_string()))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[rocket::async_test]
    async fn gives_up_after_the_last_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = fast()
            .run("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::TransientStore("write conflict".to_string()))
            })
            .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[rocket::async_test]
    async fn other_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = fast()
            .run("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::forbidden("not a member"))
            })
            .await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
