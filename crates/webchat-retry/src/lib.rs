// SPDX-FileCopyrightText: 2026 Weni Webchat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure functional exponential-backoff retry policy.
//!
//! `delay(n) = min(base_delay * factor^n, max_delay)`, optionally perturbed
//! by a uniform jitter in `[0, min(delay, max_jitter)]`. The policy has no
//! side effects beyond its own attempt counter: it does not sleep, spawn, or
//! touch a clock. The Connection Engine is the only caller that turns
//! `next()`'s returned delay into an actual scheduled reconnect.

use std::time::Duration;

use rand::Rng;

/// Exponential-backoff parameters and attempt counter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: bool,
    max_jitter: Duration,
    attempts: u32,
}

/// Builder-style configuration for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub jitter: bool,
    pub max_jitter: Duration,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3_000),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            jitter: true,
            max_jitter: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            factor: config.factor,
            jitter: config.jitter,
            max_jitter: config.max_jitter,
            attempts: 0,
        }
    }

    /// The expected (jitter-free) delay for attempt number `n` (0-based).
    pub fn delay_for(&self, n: u32) -> Duration {
        let base_millis = self.base_delay.as_secs_f64() * 1000.0;
        let scaled = base_millis * self.factor.powi(n as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64() * 1000.0);
        Duration::from_secs_f64((capped.max(0.0)) / 1000.0)
    }

    /// Returns the delay for the current attempt count (with jitter applied
    /// if enabled) and increments the attempt counter.
    pub fn next(&mut self) -> Duration {
        let base = self.delay_for(self.attempts);
        self.attempts += 1;
        if !self.jitter {
            return base;
        }
        let cap = base.min(self.max_jitter);
        if cap.is_zero() {
            return base;
        }
        let extra_millis = rand::thread_rng().gen_range(0..=cap.as_millis() as u64);
        base + Duration::from_millis(extra_millis)
    }

    /// Resets the attempt counter to zero without changing parameters.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// The number of times [`Self::next`] has been called since the last
    /// [`Self::reset`].
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter_policy() -> RetryPolicy {
        RetryPolicy::new(RetryPolicyConfig {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            factor: 2.0,
            jitter: false,
            max_jitter: Duration::ZERO,
        })
    }

    #[test]
    fn reconnection_backoff_schedule() {
        // Scenario 4 from the specification: base=1000, factor=2, no jitter.
        let mut policy = no_jitter_policy();
        assert_eq!(policy.next(), Duration::from_millis(1_000));
        assert_eq!(policy.next(), Duration::from_millis(2_000));
        assert_eq!(policy.next(), Duration::from_millis(4_000));
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let mut policy = no_jitter_policy();
        for _ in 0..10 {
            policy.next();
        }
        assert_eq!(policy.next(), Duration::from_millis(10_000));
    }

    #[test]
    fn reset_returns_attempts_to_zero() {
        let mut policy = no_jitter_policy();
        policy.next();
        policy.next();
        assert_eq!(policy.attempts(), 2);
        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next(), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_adds_bounded_extra_delay() {
        let mut policy = RetryPolicy::new(RetryPolicyConfig {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            factor: 2.0,
            jitter: true,
            max_jitter: Duration::from_millis(500),
        });
        for _ in 0..20 {
            let d = policy.next();
            assert!(d >= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn expected_delay_is_monotone_non_decreasing_up_to_cap() {
        let policy = no_jitter_policy();
        for n in 0..20 {
            assert!(policy.delay_for(n) <= policy.delay_for(n + 1));
            assert!(policy.delay_for(n) <= Duration::from_millis(10_000));
        }
    }

    proptest::proptest! {
        #[test]
        fn property_delay_monotone_non_decreasing(n in 0u32..64) {
            let policy = no_jitter_policy();
            let d1 = policy.delay_for(n);
            let d2 = policy.delay_for(n + 1);
            proptest::prop_assert!(d1 <= d2);
            proptest::prop_assert!(d2 <= Duration::from_millis(10_000));
        }

        #[test]
        fn property_reset_always_zeroes_attempts(calls in 0u32..32) {
            let mut policy = no_jitter_policy();
            for _ in 0..calls {
                policy.next();
            }
            policy.reset();
            proptest::prop_assert_eq!(policy.attempts(), 0);
        }
    }
}
