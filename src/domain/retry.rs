//! Retry Policy
//!
//! Attempt -> Backoff -> Retry/GiveUp state machine shared by the provider
//! clients. The HTTP layer classifies each attempt; the policy decides what
//! happens next, which keeps delays and attempt caps testable without I/O.

use std::time::Duration;

/// Default number of attempts per request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default first backoff delay (1s, 2s, 4s, ...)
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default ceiling on any single delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Classification of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Response is usable
    Success,
    /// 429, 5xx, timeout or connection failure
    Transient {
        /// Server-suggested delay (Retry-After)
        retry_after: Option<Duration>,
    },
    /// 401/403 or another non-retryable status
    Fatal,
}

/// What the caller should do after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop, the attempt succeeded
    Done,
    /// Sleep for the delay, then attempt again
    Retry(Duration),
    /// Attempts exhausted on transient failures
    Exhausted,
    /// Non-retryable failure
    Abort,
}

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before the retry that follows the 1-based `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    /// Decide the next step after the 1-based `attempt` finished with `outcome`
    pub fn decide(&self, attempt: u32, outcome: AttemptOutcome) -> RetryDecision {
        match outcome {
            AttemptOutcome::Success => RetryDecision::Done,
            AttemptOutcome::Fatal => RetryDecision::Abort,
            AttemptOutcome::Transient { .. } if attempt >= self.max_attempts => RetryDecision::Exhausted,
            AttemptOutcome::Transient { retry_after } => {
                let delay = match retry_after {
                    Some(hint) => hint.min(self.max_delay),
                    None => self.with_jitter(self.backoff(attempt)),
                };
                RetryDecision::Retry(delay)
            }
        }
    }

    fn with_jitter(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let spread = (delay.as_millis() as u64) / 4;
        if spread == 0 {
            return delay;
        }
        let extra = rand::Rng::gen_range(&mut rand::thread_rng(), 0..=spread);
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(60)).without_jitter()
    }

    const TRANSIENT: AttemptOutcome = AttemptOutcome::Transient { retry_after: None };

    #[test]
    fn test_backoff_doubles() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_is_capped() {
        let p = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5)).without_jitter();
        assert_eq!(p.backoff(8), Duration::from_secs(5));
    }

    #[test]
    fn test_transient_retries_until_exhausted() {
        let p = policy();
        assert_eq!(p.decide(1, TRANSIENT), RetryDecision::Retry(Duration::from_secs(1)));
        assert_eq!(p.decide(2, TRANSIENT), RetryDecision::Retry(Duration::from_secs(2)));
        assert_eq!(p.decide(3, TRANSIENT), RetryDecision::Exhausted);
    }

    #[test]
    fn test_fatal_never_retries() {
        assert_eq!(policy().decide(1, AttemptOutcome::Fatal), RetryDecision::Abort);
    }

    #[test]
    fn test_success_is_done() {
        assert_eq!(policy().decide(2, AttemptOutcome::Success), RetryDecision::Done);
    }

    #[test]
    fn test_retry_after_overrides_backoff_but_is_capped() {
        let p = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(10)).without_jitter();
        let hinted = AttemptOutcome::Transient { retry_after: Some(Duration::from_secs(7)) };
        assert_eq!(p.decide(1, hinted), RetryDecision::Retry(Duration::from_secs(7)));

        let too_long = AttemptOutcome::Transient { retry_after: Some(Duration::from_secs(120)) };
        assert_eq!(p.decide(1, too_long), RetryDecision::Retry(Duration::from_secs(10)));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let p = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(60));
        for _ in 0..50 {
            match p.decide(1, TRANSIENT) {
                RetryDecision::Retry(delay) => {
                    assert!(delay >= Duration::from_secs(2));
                    assert!(delay <= Duration::from_millis(2_500));
                }
                other => panic!("unexpected decision {:?}", other),
            }
        }
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let p = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.decide(1, TRANSIENT), RetryDecision::Exhausted);
    }
}
