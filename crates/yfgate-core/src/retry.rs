//! Retry of rate-limited upstream calls with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::data_source::{SourceError, SourceErrorKind};

/// Backoff schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the second attempt.
    pub base: Duration,
    /// Multiplier applied for each further attempt.
    pub factor: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            factor: 2.0,
        }
    }
}

impl Backoff {
    /// Delay after the failed attempt with 0-based index `attempt`: `base * factor^attempt`.
    pub fn delay(self, attempt: u32) -> Duration {
        let scale = self.factor.powi(attempt as i32);
        Duration::from_secs_f64(self.base.as_secs_f64() * scale)
    }
}

/// Configuration for the rate-limit retry loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff {
                base: base_delay,
                ..Backoff::default()
            },
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

/// Run `operation`, retrying only when it fails with [`SourceErrorKind::RateLimited`].
///
/// Other errors are returned immediately. When the last attempt is still rate
/// limited, that error is returned.
pub async fn retry_rate_limited<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.kind() == SourceErrorKind::RateLimited => {
                warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    error = %err,
                    "rate limit hit"
                );
                if attempt + 1 >= max_attempts {
                    error!(max_attempts, "max retries reached, rate limit still active");
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt);
                info!(delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(code = err.code(), error = %err, "upstream call failed");
                return Err(err);
            }
        }
    }
}
