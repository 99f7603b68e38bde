//! Reconnect backoff policy.

use std::time::Duration;

use backoff::ExponentialBackoff;

/// Doubling reconnect delay, clamped at a ceiling, never giving up.
///
/// Starting at 2s the delays are 2, 4, 8, ... 128, 128, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    /// `base` is raised to 1ms and clamped to `max`.
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(Duration::from_millis(1));
        Self {
            base: base.max(Duration::from_millis(1)).min(max),
            max,
        }
    }

    /// Fresh backoff state for one reconnect loop.
    pub fn build(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base,
            initial_interval: self.base,
            max_interval: self.max,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(128))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoff::backoff::Backoff;

    fn delays(backoff: &mut ExponentialBackoff, count: usize) -> Vec<u64> {
        (0..count)
            .map(|_| backoff.next_backoff().unwrap().as_secs())
            .collect()
    }

    #[test]
    fn test_sequence_caps_at_max() {
        let mut backoff = BackoffPolicy::default().build();
        assert_eq!(delays(&mut backoff, 10), vec![2, 4, 8, 16, 32, 64, 128, 128, 128, 128]);
    }

    #[test]
    fn test_reset_returns_to_base() {
        let mut backoff = BackoffPolicy::default().build();
        assert_eq!(delays(&mut backoff, 5), vec![2, 4, 8, 16, 32]);
        backoff.reset();
        assert_eq!(delays(&mut backoff, 2), vec![2, 4]);
    }

    #[test]
    fn test_base_above_max_is_clamped() {
        let mut backoff = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(5)).build();
        assert_eq!(delays(&mut backoff, 2), vec![5, 5]);
    }

    #[test]
    fn test_zero_base_never_spins() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.base, Duration::from_millis(1));
        let mut backoff = policy.build();
        assert!(backoff.next_backoff().unwrap() >= Duration::from_millis(1));
    }
}
