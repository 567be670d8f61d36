use std::time::Duration;

use stridopt_shared::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_STEP_MS};

/// Backoff schedule for re-establishing a broken subscription.
///
/// After the `n`th consecutive failure the task waits `n * step`; the
/// `max_attempts`th failure is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub step: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            step,
        }
    }

    pub fn delay_after(&self, failures: u32) -> Duration {
        self.step.saturating_mul(failures)
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_ATTEMPTS,
            Duration::from_millis(DEFAULT_RETRY_STEP_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
