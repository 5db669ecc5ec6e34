//! Bounded exponential backoff for calls into remote embedding backends.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub exponential_base: f64,
    pub max_delay_ms: u64,
    /// Multiply each delay by a random factor in `[1, 2)`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 10, initial_delay_ms: 1_000, exponential_base: 2.0, max_delay_ms: 60_000, jitter: true }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.exponential_base.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Delay before retry number `attempt`, jittered and never above `max_delay_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter && !base.is_zero() {
            base.mul_f64(rand::thread_rng().gen_range(1.0..2.0)).min(Duration::from_millis(self.max_delay_ms))
        } else {
            base
        }
    }
}

/// Run `op` until it succeeds, a non-transient error occurs, or the policy's
/// retries are exhausted. The last error is returned on failure.
pub fn retry<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                attempt += 1;
                warn!(error = %e, attempt, max_retries = policy.max_retries, delay_ms = delay.as_millis() as u64, "retrying embedding request");
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy { max_retries, initial_delay_ms: 0, jitter: false, ..RetryPolicy::default() }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let out = retry(&instant(3), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(Error::Backend("flaky".into())) } else { Ok(42) }
        });
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let calls = Cell::new(0);
        let out: Result<()> = retry(&instant(2), || {
            calls.set(calls.get() + 1);
            Err(Error::transport("http://x/embeddings", Some(500), "boom"))
        });
        assert!(matches!(out, Err(Error::Transport { status: Some(500), .. })));
        assert_eq!(calls.get(), 3, "first attempt plus two retries");
    }

    #[test]
    fn jittered_delay_stays_under_the_cap() {
        let policy = RetryPolicy { initial_delay_ms: 700, exponential_base: 2.0, max_delay_ms: 1_000, jitter: true, max_retries: 10 };
        for attempt in 0..8 {
            for _ in 0..50 {
                let delay = policy.delay(attempt);
                assert!(delay <= Duration::from_millis(1_000), "attempt {attempt}: {delay:?}");
                assert!(delay >= policy.base_delay(attempt));
            }
        }
    }

    #[test]
    fn client_errors_are_not_retried() {
        let calls = Cell::new(0);
        let out: Result<()> = retry(&instant(5), || {
            calls.set(calls.get() + 1);
            Err(Error::transport("http://x/embeddings", Some(401), "invalid api key"))
        });
        assert!(matches!(out, Err(Error::Transport { status: Some(401), .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn config_errors_are_not_retried() {
        let calls = Cell::new(0);
        let out: Result<()> = retry(&instant(5), || {
            calls.set(calls.get() + 1);
            Err(Error::InvalidConfig("no key".into()))
        });
        assert!(out.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn delays_grow_exponentially_and_are_capped() {
        let policy = RetryPolicy { initial_delay_ms: 100, exponential_base: 2.0, max_delay_ms: 1_000, jitter: false, max_retries: 10 };
        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(800));
        assert_eq!(policy.base_delay(4), Duration::from_millis(1_000));
        assert_eq!(policy.base_delay(30), Duration::from_millis(1_000));
    }
}
