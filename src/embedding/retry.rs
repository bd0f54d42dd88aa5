//! Bounded retry with exponential backoff for transient embedding failures.

use std::future::Future;
use std::time::Duration;

use super::error::EmbedError;

/// How many times to try an operation, how long to wait in between, and which
/// errors qualify for another attempt.
///
/// The wait after attempt `n` (1-based) is `multiplier * 2^(n-1)` seconds,
/// clamped to `[min_delay, max_delay]`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    retryable: fn(&EmbedError) -> bool,
}

impl Default for RetryPolicy {
    /// Three attempts, waits clamped to 4–10 seconds, transient errors only.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(4), Duration::from_secs(10), 1.0)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay,
            max_delay: max_delay.max(min_delay),
            multiplier,
            retryable: EmbedError::is_transient,
        }
    }

    /// No waiting between attempts. For tests and batch tools that pace themselves.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, 0.0)
    }

    /// Replace the predicate that decides which errors are retried.
    pub fn with_retryable(mut self, retryable: fn(&EmbedError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt.saturating_sub(1).min(62) as i32);
        let secs = (self.multiplier * exp).max(0.0);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
            .clamp(self.min_delay, self.max_delay)
    }

    pub fn should_retry(&self, err: &EmbedError) -> bool {
        (self.retryable)(err)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or runs out
    /// of attempts. The error returned is always the last one `op` produced.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, EmbedError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, EmbedError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && self.should_retry(&err) => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        kind = err.kind(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient embedding failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if self.should_retry(&err) {
                        tracing::error!(attempts = attempt, error = %err, "retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}
