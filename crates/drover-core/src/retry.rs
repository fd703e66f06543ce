//! Retry and backoff policy for transient decision-service failures.
//!
//! Exponential backoff: `wait = base_delay * 2^attempt`, bounded by
//! `max_retries`. On exhaustion the last error surfaces to the caller.
//! Content problems (e.g. HTTP 403 for an oversized payload) are not this
//! module's concern: the caller should transform the payload and retry once
//! rather than backing off.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

/// Classification hook: errors decide whether the policy may retry them.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry configuration.
///
/// Defaults match the observed service limits: three attempts on top of the
/// initial call, 30 seconds base delay (so 30s, 60s, 120s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Base delay; doubles on each consecutive failure
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Disable retries entirely.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Wait before retry number `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Sleep seam, injectable for testing with a virtual clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `op`, retrying retryable failures with exponential backoff.
///
/// Non-retryable errors surface immediately with zero sleeps; exhausting
/// `max_retries` surfaces the last error rather than swallowing it.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < config.max_retries => {
                let wait = config.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    wait_secs = wait.as_secs(),
                    error = %error,
                    "Transient failure, backing off"
                );
                sleeper.sleep(wait).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
