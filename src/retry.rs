//! Retry and backoff for polling loops.
//!
//! [`RetryPolicy`] describes how long to wait between attempts; [`Backoff`]
//! tracks one loop's progress through it. [`retry`] re-runs an operation
//! only while it fails with a retryable error (see
//! [`BunchError::is_retryable`]); every other error is returned as is.

use std::future::Future;
use std::time::Duration;

use crate::error::{BunchError, Result};

/// Exponential backoff settings.
///
/// # Defaults
///
/// | Setting           | Default |
/// |-------------------|---------|
/// | `max_attempts`    | 50      |
/// | `initial_backoff` | 100ms   |
/// | `max_backoff`     | 2s      |
/// | `multiplier`      | 2.0     |
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use taskbunch::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.backoff(0), Duration::from_millis(100));
/// assert_eq!(policy.backoff(1), Duration::from_millis(200));
/// assert_eq!(policy.backoff(10), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts before giving up, including the first one.
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single wait.
    pub max_backoff: Duration,
    /// Growth factor between consecutive waits.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the first and maximum wait.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Wait before retry number `retry` (0-based), capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Start tracking a fresh loop under this policy.
    pub fn start(&self) -> Backoff<'_> {
        Backoff {
            policy: self,
            failures: 0,
        }
    }
}

/// Progress of one loop through a [`RetryPolicy`].
#[derive(Debug)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    failures: u32,
}

impl Backoff<'_> {
    /// Record an unsuccessful attempt and return how long to wait, or `None`
    /// once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            return None;
        }
        Some(self.policy.backoff(self.failures - 1))
    }

    /// Forget earlier failures, e.g. after the loop made progress.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Unsuccessful attempts since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempt budget runs out.
///
/// # Errors
///
/// - The first non-retryable error, unchanged.
/// - [`BunchError::RetriesExhausted`] wrapping the last retryable error.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.start();
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => match backoff.next_delay() {
                Some(delay) => {
                    tracing::debug!(attempt = backoff.failures(), ?delay, error = %err, "retrying");
                    tokio::time::sleep(delay).await;
                },
                None => {
                    return Err(BunchError::RetriesExhausted {
                        attempts: backoff.failures(),
                        last: Box::new(err),
                    });
                },
            },
            Err(err) => return Err(err),
        }
    }
}
