//! Bounded retry with linear backoff around capability calls.

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::error::ServiceError;

/// Default number of attempts (first call included).
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
/// Default backoff unit; attempt `n` waits `n` units before the next one.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);

/// Terminal failure of a retried call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// The call was rejected as unauthorized; no retries were attempted.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Message reported by the service.
        message: String,
    },
    /// Every attempt failed transiently.
    #[error("gave up after {attempts} attempts: {message}")]
    Exhausted {
        /// Attempts made.
        attempts: usize,
        /// Message of the last failure.
        message: String,
    },
}

/// Attempt budget plus linear backoff unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Duration,
}

impl RetryPolicy {
    /// Builds a policy; at least one attempt is always made.
    pub fn new(max_attempts: usize, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Maximum number of attempts.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay slept after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        self.backoff
            .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }

    /// Runs `op`, sleeping the calling thread between attempts.
    pub fn call<T, F>(&self, label: &str, op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Result<T, ServiceError>,
    {
        self.run_with_sleep(label, op, thread::sleep)
    }

    /// Runs `op` with a caller-supplied sleep function.
    pub fn run_with_sleep<T, F, S>(&self, label: &str, mut op: F, mut sleep: S) -> Result<T, RetryError>
    where
        F: FnMut() -> Result<T, ServiceError>,
        S: FnMut(Duration),
    {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(ServiceError::Unauthorized(message)) => {
                    return Err(RetryError::Unauthorized { message });
                }
                Err(ServiceError::Transient(message)) => {
                    if attempt >= self.max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            message,
                        });
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "transient failure, retrying"
                    );
                    sleep(delay);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF)
    }
}
