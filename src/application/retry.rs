use crate::error::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Wait between two optimistic attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed {
        interval_ms: u64,
    },
    /// Doubles from `base_ms` up to `max_ms`. With `jitter`, each delay is
    /// drawn from the upper half of that window to spread colliding writers.
    Exponential {
        base_ms: u64,
        max_ms: u64,
        #[serde(default)]
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed { interval_ms: 100 }
    }
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed { interval_ms } => Duration::from_millis(interval_ms),
            Backoff::Exponential {
                base_ms,
                max_ms,
                jitter,
            } => {
                let shift = attempt.saturating_sub(1).min(32);
                let ceiling = base_ms.saturating_mul(1u64 << shift).min(max_ms);
                let millis = if jitter && ceiling > 1 {
                    let half = ceiling / 2;
                    half + rand::thread_rng().gen_range(0..=ceiling - half)
                } else {
                    ceiling
                };
                Duration::from_millis(millis)
            }
        }
    }
}

/// Bounded retry budget for version conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error, or
    /// the budget is spent. On exhaustion the last conflict is returned as is.
    ///
    /// Each call of `attempt` must redo the whole read-validate-write cycle.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut n = 1;
        loop {
            match attempt(n).await {
                Err(e) if e.is_retryable() && n < max_attempts => {
                    let delay = self.backoff.delay(n);
                    debug!(operation, attempt = n, ?delay, error = %e, "retrying after conflict");
                    tokio::time::sleep(delay).await;
                    n += 1;
                }
                result => return result,
            }
        }
    }
}
