//! Bounded retry with exponential backoff

use crate::utils::config::RetryConfig;
use std::time::Duration;

/// Retry schedule: at most `max_attempts` tries, doubling the delay between
/// them up to `max_backoff`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Result of [`RetryPolicy::run`] when every attempt came back empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based; the first attempt has none)
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Call `attempt` until it yields a value or the attempts run out
    pub fn run<T, F>(&self, mut attempt: F) -> Result<T, Exhausted>
    where
        F: FnMut(u32) -> Option<T>,
    {
        self.run_with_sleep(&mut attempt, std::thread::sleep)
    }

    fn run_with_sleep<T, F, S>(&self, attempt: &mut F, mut sleep: S) -> Result<T, Exhausted>
    where
        F: FnMut(u32) -> Option<T>,
        S: FnMut(Duration),
    {
        for n in 1..=self.max_attempts {
            let delay = self.backoff(n);
            if !delay.is_zero() {
                sleep(delay);
            }
            if let Some(value) = attempt(n) {
                return Ok(value);
            }
        }
        Err(Exhausted {
            attempts: self.max_attempts,
        })
    }
}
