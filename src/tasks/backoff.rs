use rand::Rng;
use std::time::Duration;

use crate::config::OrchestrationConfig;
use crate::hotspot::error::OrchestrationError;

/// Attempt ceiling and exponential backoff for orchestration tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &OrchestrationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: config.backoff_base(),
            max: config.backoff_max(),
            jitter: config.backoff_jitter,
        }
    }

    /// `min(base * 2^(attempt-1), max)` for the wait after `attempt` failed
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1 << exponent).min(self.max)
    }

    /// Nominal delay, drawn uniformly from `[delay/2, delay]` when jitter is on
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if !self.jitter || nominal.is_zero() {
            return nominal;
        }
        rand::thread_rng().gen_range(nominal / 2..=nominal)
    }

    pub fn should_retry(&self, attempt: u32, error: &OrchestrationError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base: Duration::from_secs(30),
            max: Duration::from_secs(600),
            jitter,
        }
    }

    #[test]
    fn delay_doubles_up_to_the_cap() {
        let p = policy(false);
        assert_eq!(p.delay(1), Duration::from_secs(30));
        assert_eq!(p.delay(2), Duration::from_secs(60));
        assert_eq!(p.delay(3), Duration::from_secs(120));
        assert_eq!(p.delay(6), Duration::from_secs(600));
        assert_eq!(p.delay(40), Duration::from_secs(600));
    }

    #[test]
    fn jitter_stays_within_half_to_full_delay() {
        let p = policy(true);
        for attempt in 1..=6 {
            let nominal = p.nominal_delay(attempt);
            for _ in 0..50 {
                let d = p.delay(attempt);
                assert!(d >= nominal / 2 && d <= nominal, "{:?} outside [{:?}/2, {:?}]", d, nominal, nominal);
            }
        }
    }

    #[test]
    fn retries_stop_at_ceiling_or_terminal_error() {
        let p = policy(false);
        let transient = OrchestrationError::NoInterfaceAvailable { checked: vec![] };
        assert!(p.should_retry(1, &transient));
        assert!(p.should_retry(2, &transient));
        assert!(!p.should_retry(3, &transient));
        assert!(!p.should_retry(1, &OrchestrationError::HotspotNotFound(1)));
    }
}
