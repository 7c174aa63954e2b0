//! Retry policy
//!
//! | Kind | Action |
//! |------|--------|
//! | `CORS` | Fail after one attempt |
//! | `HTTP_ERROR` | Fail after one attempt |
//! | `MALFORMED` | Fail after one attempt |
//! | `CANCELLED` | Stop immediately |
//! | `TIMEOUT` | Retry until `max_attempts`, exponential delay |
//! | `NETWORK` | Retry until `max_attempts`, exponential delay |
//! | `UNKNOWN` | Retry until `max_attempts`, exponential delay |

use crate::config::FetchConfig;
use crate::fetch::ErrorKind;
use std::time::Duration;

/// Decides whether and when to re-attempt a failed retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for each attempt after
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base())
    }

    /// Returns true if attempt number `attempt` (1-based) failed with `kind`
    /// and another attempt should follow
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        kind.is_retryable() && attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt`:
    /// `backoff_base * 2^(attempt - 1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}
