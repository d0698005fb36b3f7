//! Bounded retry with exponential backoff for I/O-bound steps.
//!
//! Used for the source read in the loader and for model artifact fetches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry schedule for a fallible operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_backoff_ms: u64,

    /// Growth factor applied to the delay after each failed attempt
    pub multiplier: f64,

    /// Upper bound for any single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30) as i32;
        let factor = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier.powi(exp)
        } else {
            1.0
        };
        let ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts in `policy` are used up. Returns the last error on failure
/// together with the number of attempts made.
///
/// # Errors
/// Returns `(last_error, attempts)` when no attempt succeeded.
pub fn retry_with_backoff<T, E, F, R>(
    policy: &RetryPolicy,
    desc: &str,
    mut op: F,
    retryable: R,
) -> Result<T, (E, u32)>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
    R: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!("Completed {} on attempt {}", desc, attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= max_attempts || !retryable(&e) {
                    return Err((e, attempt));
                }
                let delay = policy.backoff_after(attempt);
                tracing::warn!(
                    "Failed to {} (attempt {}/{}): {}; retrying in {:?}",
                    desc,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// Whether an I/O error is worth retrying.
#[must_use]
pub fn is_transient_io(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
    )
}
