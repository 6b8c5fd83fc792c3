//! Bounded retry with exponential backoff for a single async operation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_jitter: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay: Duration::from_millis(1_000), max_jitter: None }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self { max_attempts, initial_delay, max_jitter: None }
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = Some(max_jitter);
        self
    }

    /// Delay slept after the attempt at `attempt_index` (zero-based) fails:
    /// `initial_delay * 2^attempt_index`, saturating.
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        let exponent = attempt_index.min(16);
        let multiplier = 1_u32 << exponent;
        self.initial_delay.saturating_mul(multiplier)
    }

    fn delay_with_jitter(&self, attempt_index: u32) -> Duration {
        let base = self.backoff(attempt_index);
        match self.max_jitter {
            Some(max_jitter) if !max_jitter.is_zero() => {
                let ceiling = u64::try_from(max_jitter.as_millis()).unwrap_or(u64::MAX);
                let jitter_ms = rand::thread_rng().gen_range(0..=ceiling);
                base.saturating_add(Duration::from_millis(jitter_ms))
            }
            _ => base,
        }
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` attempts have
/// failed, then returns the last error unchanged. Every failure is retried.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_with_backoff_if(policy, sleeper, operation, |_| true).await
}

/// Same as [`retry_with_backoff`], except an error for which `should_retry`
/// returns false is returned immediately without sleeping.
pub async fn retry_with_backoff_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt_index = 0_u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let attempts_left = attempt_index + 1 < max_attempts;
                if !attempts_left || !should_retry(&error) {
                    return Err(error);
                }

                let delay = policy.delay_with_jitter(attempt_index);
                warn!(
                    event_name = "retry.attempt_failed",
                    attempt = attempt_index + 1,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "attempt failed, retrying after backoff"
                );
                sleeper.sleep(delay).await;
                attempt_index += 1;
            }
        }
    }
}
