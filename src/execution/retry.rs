use crate::config::RetrySettings;
use std::fmt::Display;
use std::future::Future;
use tokio::time::{sleep, Duration};

/// Fixed-delay retry: up to `count` extra attempts, `fixed_delay` apart
///
/// No exponential growth; a failing gateway is retried at a constant pace.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub count: u32,
    pub fixed_delay: Duration,
}

impl RetryPolicy {
    pub fn new(count: u32, fixed_delay: Duration) -> Self {
        Self { count, fixed_delay }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `op` until it succeeds or the retries are used up
    pub async fn run<T, E, F, Fut>(&self, operation_name: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("✓ {} succeeded after {} attempts", operation_name, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.count => {
                    attempt += 1;
                    tracing::warn!(
                        "Attempt {}/{} of {} failed: {}. Retrying in {:?}...",
                        attempt,
                        self.count + 1,
                        operation_name,
                        e,
                        self.fixed_delay
                    );
                    sleep(self.fixed_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.count, Duration::from_millis(settings.delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result: Result<u32, String> = policy
            .run("flaky", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("boom".to_string())
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(assert_ok!(result), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_count() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let result: Result<(), String> = policy
            .run("always failing", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            })
            .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_none_is_single_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), String> = RetryPolicy::none()
            .run("once", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("no".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_settings() {
        let policy = RetryPolicy::from(&RetrySettings { count: 5, delay_ms: 250 });
        assert_eq!(policy.count, 5);
        assert_eq!(policy.fixed_delay, Duration::from_millis(250));
    }
}
