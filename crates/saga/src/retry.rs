//! Bounded exponential backoff for remote calls.
//!
//! Booking and compensation calls share the same schedule shape but have very
//! different budgets: a booking branch gives up quickly and lets the saga
//! compensate, while a compensation branch keeps trying for as long as it
//! reasonably can.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;

/// Retry policy for one kind of remote call.
///
/// `max_attempts` counts every call, including the first. The delay before
/// attempt `n` (n >= 2) is `initial_interval * backoff_rate^(n - 2)`, capped
/// at `max_interval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_rate: f64,
    pub max_interval: Duration,
    /// Deadline for a single attempt. An attempt that overruns it counts as a
    /// transient failure.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Policy for booking calls: 5 attempts.
    pub fn booking() -> Self {
        Self {
            max_attempts: 5,
            ..Self::base()
        }
    }

    /// Policy for compensation calls: 100 attempts.
    pub fn compensation() -> Self {
        Self {
            max_attempts: 100,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::from_secs(1),
            backoff_rate: 2.0,
            max_interval: Duration::from_secs(3600),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Returns the delay to wait before `attempt` (1-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let factor = self.backoff_rate.powi((attempt - 2) as i32);
        let secs = self.initial_interval.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            return self.max_interval;
        }
        Duration::from_secs_f64(secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::booking()
    }
}

/// A value produced by a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    /// Number of calls made, including the successful one.
    pub attempts: u32,
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    /// The operation returned an error that is not worth retrying.
    #[error("permanent failure after {attempts} attempt(s): {error}")]
    Permanent { attempts: u32, error: E },

    /// Every attempt failed with a retryable error.
    #[error("retry budget exhausted after {attempts} attempt(s): {error}")]
    Exhausted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn error(&self) -> &E {
        match self {
            RetryError::Permanent { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    pub fn into_error(self) -> E {
        match self {
            RetryError::Permanent { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy's
/// attempt budget is spent.
///
/// `operation` receives the 1-based attempt number. Errors for which
/// `is_retryable` returns false are returned immediately.
pub async fn retry_with_policy<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<Retried<T>, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) if !is_retryable(&error) => {
                tracing::warn!(attempt, %error, "operation failed permanently");
                return Err(RetryError::Permanent {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) if attempt >= max_attempts => {
                tracing::error!(attempt, %error, "operation failed after max attempts");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) => {
                metrics::counter!("retry_attempts_total").increment(1);
                let delay = policy.delay_before(attempt + 1);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
