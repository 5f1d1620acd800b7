//! Retry-with-backoff combinator used for every delivery call.
//!
//! Attempt `n` that fails transiently waits `n × base_delay` before attempt
//! `n + 1`. A rejection is final on the spot.

use std::future::Future;
use std::time::Duration;

use coursemail_core::DeliveryError;

use crate::pacing::{Pacer, Pause};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(3))
    }
}

/// Final result plus how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryResult<T> {
    pub result: Result<T, DeliveryError>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, is rejected, or attempts run out. `op`
/// receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    pacer: &dyn Pacer,
    mut op: F,
) -> RetryResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if !e.is_transient() || attempt >= policy.max_attempts => {
                return RetryResult {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "⚠️ Attempt {attempt}/{} failed: {e}; retrying in {delay:?}",
                    policy.max_attempts
                );
                pacer.pause(Pause::Backoff { attempt }, delay).await;
                attempt += 1;
            }
        }
    }
}
