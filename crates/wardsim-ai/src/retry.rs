//! Retry with exponential backoff for transient AI failures.
//!
//! [`retry_with_backoff`] is generic over the error type, the retry
//! predicate and the backoff schedule. [`invoke`] fixes those to the
//! simulator's policy: retry only rate-limit failures, wait
//! `2^i * base_delay` before retry `i`, and surface exhaustion as
//! [`AiError::MaxRetriesExceeded`] so callers can tell "gave up" from
//! "server rejected".
//!
//! Delays use `tokio::time`, so tests drive them with a paused clock.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before retry `retry` (0-indexed): 1x, 2x, 4x, ... the base delay.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Why [`retry_with_backoff`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// A non-retryable error, returned on the attempt it happened.
    Fatal(E),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: E },
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is used up. `backoff(i)` is awaited before retry `i`.
pub async fn retry_with_backoff<T, E, F, Fut, P, B>(
    max_attempts: u32,
    mut op: F,
    is_retryable: P,
    backoff: B,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    B: Fn(u32) -> Duration,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(RetryError::Fatal(e)),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                let delay = backoff(attempt - 1);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Wrap a single AI call with the rate-limit retry policy.
pub async fn invoke<T, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, AiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AiError>>,
{
    retry_with_backoff(
        policy.max_attempts,
        op,
        AiError::is_rate_limited,
        |retry| policy.delay_for(retry),
    )
    .await
    .map_err(|e| match e {
        RetryError::Fatal(e) => e,
        RetryError::Exhausted { attempts, last } => AiError::MaxRetriesExceeded {
            attempts,
            last: Box::new(last),
        },
    })
}
