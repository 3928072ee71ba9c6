//! Bounded retry and polling policies.
//!
//! Used for read-only RPC calls (exponential back-off) and for receipt
//! polling (fixed interval).  Delays go through `tokio::time`, so tests can
//! drive them with a paused clock.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { initial: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.  Always >= 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(interval),
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential { initial, max },
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, max } => {
                let factor = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    /// Returns the last error when every attempt fails.
    pub async fn retry<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!("{what} failed (attempt {attempt}, retry in {delay:?}): {e}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Poll `probe` until it yields a value.  Errors from a probe count as
    /// "not yet" and are logged.  Returns `None` after exactly
    /// `max_attempts` probes without a value.
    pub async fn poll<T, E, F, Fut>(&self, what: &str, mut probe: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: std::fmt::Display,
    {
        for attempt in 1..=self.max_attempts {
            match probe().await {
                Ok(Some(v)) => return Some(v),
                Ok(None) => debug!("{what}: nothing yet (attempt {attempt}/{})", self.max_attempts),
                Err(e) => warn!("{what}: probe error (attempt {attempt}/{}): {e}", self.max_attempts),
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.delay_after(attempt)).await;
            }
        }
        None
    }
}
