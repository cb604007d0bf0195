//! Randomized retry policy between whole-pool attempts

use std::time::Duration;

use rand::Rng;

/// Stateless retry policy.
///
/// `retry_count` bounds the number of attempts per `lock` call and every
/// delay is drawn uniformly from `[retry_delay / 2, retry_delay]` so that
/// contending clients desynchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_count: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, retry_delay: Duration) -> Self {
        Self {
            retry_count,
            retry_delay,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Number of attempts a `lock` call makes; never less than one
    pub fn attempts(&self) -> u32 {
        self.retry_count.max(1)
    }

    /// Draw the delay to wait before the next attempt
    pub fn next_delay(&self) -> Duration {
        let max = self.retry_delay.as_micros().min(u64::MAX as u128) as u64;
        let min = max / 2;
        Duration::from_micros(rand::rng().random_range(min..=max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_RETRY_COUNT,
            Duration::from_millis(crate::config::DEFAULT_RETRY_DELAY_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_count(), 3);
        assert_eq!(policy.retry_delay(), Duration::from_millis(200));
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn test_delay_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(200));
        for _ in 0..1000 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(100), "delay {:?} too short", delay);
            assert!(delay <= Duration::from_millis(200), "delay {:?} too long", delay);
        }
    }

    #[test]
    fn test_delay_is_randomized() {
        let policy = RetryPolicy::new(3, Duration::from_millis(200));
        let first = policy.next_delay();
        let differs = (0..100).any(|_| policy.next_delay() != first);
        assert!(differs);
    }

    #[test]
    fn test_zero_delay() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert_eq!(policy.next_delay(), Duration::ZERO);
    }

    #[test]
    fn test_zero_retry_count_still_attempts_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.attempts(), 1);
    }
}
