//! Retry policy configuration and external-call error classification.

use std::time::Duration;

use thiserror::Error;

/// Error returned by a call to an external collaborator.
///
/// Classification is decided where the call fails, not by inspecting
/// error types at the call site: transient failures are eligible for
/// retry, permanent ones are re-raised on the first attempt.
#[derive(Error, Debug)]
pub enum CallError {
    /// Transient failure - worth retrying.
    #[error("transient: {0}")]
    Transient(#[source] anyhow::Error),

    /// Permanent failure - won't succeed on retry.
    #[error("permanent: {0}")]
    Permanent(#[source] anyhow::Error),
}

impl CallError {
    /// Create a transient error.
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self::Transient(err.into())
    }

    /// Create a permanent error.
    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self::Permanent(err.into())
    }

    /// Returns true if this error is transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Policy for retrying failed external calls.
///
/// The policy is pure data; the attempt loop lives at the call site
/// ([`WorkerContext::retry`](crate::worker::WorkerContext::retry)).
/// `max_attempts` is the total attempt ceiling, including the first call.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// No retries - a single attempt, fail immediately.
    None,

    /// Fixed delay between retries.
    Fixed {
        /// Total number of attempts allowed.
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Exponential backoff between retries.
    Exponential {
        /// Total number of attempts allowed.
        max_attempts: u32,
        /// Initial delay (doubles each attempt).
        initial_delay: Duration,
        /// Maximum delay cap.
        max_delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::None
    }
}

impl RetryPolicy {
    /// Create an exponential backoff policy with sensible defaults.
    ///
    /// - Initial delay: 1 second
    /// - Max delay: 5 minutes
    pub fn exponential(max_attempts: u32) -> Self {
        Self::Exponential {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }

    /// Create a fixed delay policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed { max_attempts, delay }
    }

    /// Calculate the delay to wait after a failed attempt (1-indexed)
    /// before the next one.
    ///
    /// Returns `None` when the attempt ceiling is reached and no further
    /// attempt is allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed { max_attempts, delay } => {
                if attempt < *max_attempts {
                    Some(*delay)
                } else {
                    None
                }
            }
            Self::Exponential {
                max_attempts,
                initial_delay,
                max_delay,
            } => {
                if attempt < *max_attempts {
                    // 2^(attempt-1) * initial_delay, capped at max_delay
                    let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
                    let delay_ms = initial_delay.as_millis() as u64 * multiplier;
                    let delay = Duration::from_millis(delay_ms.min(max_delay.as_millis() as u64));
                    Some(delay)
                } else {
                    None
                }
            }
        }
    }

    /// Returns the total number of attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::Exponential { max_attempts, .. } => *max_attempts,
        }
    }
}
