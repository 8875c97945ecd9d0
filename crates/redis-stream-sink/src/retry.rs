//! Retry policy for batch delivery
//!
//! Bounded exponential backoff with deterministic jitter. The delivery
//! executor drives the attempt loop itself (it needs the batch back when
//! the budget is exhausted); this module only owns the policy arithmetic.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Backoff policy applied to retryable flush failures
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    #[serde(default = "default_max_retries")]
    #[validate(range(max = 100))]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    #[validate(range(min = 1, max = 60_000))]
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub max_delay_ms: u64,

    /// Multiplier applied per retry (2.0 doubles the delay each time)
    #[serde(default = "default_multiplier")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,

    /// Jitter factor in [0.0, 1.0] spread around the computed delay
    #[serde(default = "default_jitter")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub jitter: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Total number of flush attempts (initial + retries)
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay to sleep before retry number `retry` (1-indexed).
    ///
    /// Deterministic: jitter is derived from the retry number, not a RNG,
    /// so delays are reproducible in tests.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        // cap the exponent so powi cannot overflow into nonsense
        let exponent = retry.min(30) as i32 - 1;
        let base = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay_ms as f64);

        let jittered = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            let phase = (retry as f64 * 0.618_033_988_749_895) % 1.0;
            capped + spread * (phase - 0.5) * 2.0
        } else {
            capped
        };

        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.initial_delay_ms, 100);
    }

    #[test]
    fn delays_grow_exponentially() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for_retry(0), Duration::ZERO);
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(400));
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy {
            initial_delay_ms: 1_000,
            max_delay_ms: 5_000,
            multiplier: 10.0,
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_retry(4), Duration::from_millis(5_000));
    }

    #[test]
    fn jitter_stays_within_spread() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        for retry in 1..10 {
            let base = no_jitter().delay_for_retry(retry).as_millis() as f64;
            let actual = policy.delay_for_retry(retry).as_millis() as f64;
            assert!(actual >= base * 0.5 - 1.0);
            assert!(actual <= base * 1.5 + 1.0);
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: RetryPolicy = serde_yaml::from_str("max_retries: 5").unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay_ms, 100);
        assert_eq!(policy.multiplier, 2.0);
    }
}
