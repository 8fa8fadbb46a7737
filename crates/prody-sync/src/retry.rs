//! # Retry Scheduler
//!
//! Exponential backoff with additive jitter for failed operations.
//!
//! ## Backoff Curve (defaults: base 2s, cap 300s)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt │ base * 2^(attempt-1) │ capped │ final delay range          │
//! │  ────────┼──────────────────────┼────────┼──────────────────────────── │
//! │     1    │          2s          │   2s   │   [2s, 3s]                  │
//! │     2    │          4s          │   4s   │   [4s, 6s]                  │
//! │     3    │          8s          │   8s   │   [8s, 12s]                 │
//! │     …    │          …           │   …    │   …                         │
//! │     9    │        512s          │  300s  │   [300s, 450s]              │
//! │                                                                         │
//! │  jitter = uniform [0, capped / 2], added AFTER the cap                 │
//! │  so no delay ever exceeds 1.5 × max_delay.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All arithmetic is in whole milliseconds and saturates instead of
//! overflowing.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use prody_core::DEFAULT_MAX_ATTEMPTS;

// =============================================================================
// Retry Policy
// =============================================================================

/// Backoff parameters shared by every operation in a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound on the pre-jitter delay.
    pub max_delay: Duration,

    /// Failed attempts after which an operation is marked FAILED.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum pre-jitter delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the attempt budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Pre-jitter delay for `attempt` (1-based; 0 is treated as 1).
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.capped_delay_ms(attempt))
    }

    fn capped_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.max(1) - 1;
        let factor = 2u64.checked_pow(exponent).unwrap_or(u64::MAX);
        let base_ms = duration_ms(self.base_delay);
        base_ms.saturating_mul(factor).min(duration_ms(self.max_delay))
    }

    /// Returns true if an operation with `attempt_count` failures may be
    /// tried again automatically.
    pub fn allows_retry(&self, attempt_count: u32) -> bool {
        attempt_count <= self.max_attempts
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Delay before retrying `attempt`, with jitter drawn from `rng`.
///
/// Returns `capped + uniform[0, capped / 2]`.
pub fn next_retry_delay<R: Rng + ?Sized>(policy: &RetryPolicy, attempt: u32, rng: &mut R) -> Duration {
    let capped = policy.capped_delay_ms(attempt);
    let jitter = rng.gen_range(0..=capped / 2);
    Duration::from_millis(capped.saturating_add(jitter))
}

// =============================================================================
// Scheduler
// =============================================================================

/// Owns the policy and the jitter source.
#[derive(Debug)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    rng: StdRng,
}

impl RetryScheduler {
    /// Creates a scheduler seeded from OS entropy.
    pub fn new(policy: RetryPolicy) -> Self {
        RetryScheduler {
            policy,
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a scheduler with a fixed seed for reproducible jitter.
    pub fn with_seed(policy: RetryPolicy, seed: u64) -> Self {
        RetryScheduler {
            policy,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay before the next attempt after `attempt` failures.
    pub fn next_delay(&mut self, attempt: u32) -> Duration {
        next_retry_delay(&self.policy, attempt, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capped_delay_doubles_until_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.capped_delay(0), Duration::from_secs(2));
        assert_eq!(policy.capped_delay(1), Duration::from_secs(2));
        assert_eq!(policy.capped_delay(2), Duration::from_secs(4));
        assert_eq!(policy.capped_delay(3), Duration::from_secs(8));
        assert_eq!(policy.capped_delay(9), Duration::from_secs(300));
        assert_eq!(policy.capped_delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_capped_delay_is_monotonic() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..=64 {
            let delay = policy.capped_delay(attempt);
            assert!(delay >= previous, "attempt {attempt} went backwards");
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::default();
        let mut scheduler = RetryScheduler::with_seed(policy, 7);

        for attempt in 1..=40 {
            let capped = policy.capped_delay(attempt);
            let delay = scheduler.next_delay(attempt);
            assert!(delay >= capped);
            assert!(delay <= capped + capped / 2);
            assert!(delay <= policy.max_delay * 3 / 2);
        }
    }

    #[test]
    fn test_seeded_schedulers_agree() {
        let policy = RetryPolicy::default();
        let mut a = RetryScheduler::with_seed(policy, 42);
        let mut b = RetryScheduler::with_seed(policy, 42);

        for attempt in 1..=10 {
            assert_eq!(a.next_delay(attempt), b.next_delay(attempt));
        }
    }

    #[test]
    fn test_allows_retry_boundary() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        assert!(policy.allows_retry(3));
        assert!(!policy.allows_retry(4));
    }

    #[test]
    fn test_zero_base_delay() {
        let policy = RetryPolicy::default().with_base_delay(Duration::ZERO);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(next_retry_delay(&policy, 5, &mut rng), Duration::ZERO);
    }
}
