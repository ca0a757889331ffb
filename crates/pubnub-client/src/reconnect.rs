//! Bounded retry scheduling for the subscribe loop.

use std::time::Duration;

/// How the subscribe loop reacts to recoverable poll failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectionPolicy {
    /// Halt after the first failure.
    #[default]
    None,
    /// Retry every 3 seconds.
    Linear,
    /// Retry after `min(2^attempt, 32)` seconds.
    Exponential,
}

const LINEAR_INTERVAL: Duration = Duration::from_secs(3);
const EXPONENTIAL_CAP_SECS: u64 = 32;

/// What the loop should do after one more failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Policy `None`: report `disconnected` and halt.
    Halt,
    /// Retry budget spent: report exhaustion and halt.
    Exhausted,
    /// Cool down for the given duration, then re-handshake.
    Wait(Duration),
}

#[derive(Debug)]
pub(crate) struct RetryController {
    policy: ReconnectionPolicy,
    max_retries: u32,
    attempt: u32,
}

impl RetryController {
    pub(crate) fn new(policy: ReconnectionPolicy, max_retries: u32) -> Self {
        Self {
            policy,
            max_retries,
            attempt: 0,
        }
    }

    /// Register one failure and decide the next step.
    pub(crate) fn next(&mut self) -> RetryDecision {
        match self.policy {
            ReconnectionPolicy::None => RetryDecision::Halt,
            _ if self.attempt >= self.max_retries => RetryDecision::Exhausted,
            ReconnectionPolicy::Linear => {
                self.attempt += 1;
                RetryDecision::Wait(LINEAR_INTERVAL)
            }
            ReconnectionPolicy::Exponential => {
                let exp = self.attempt.min(5); // 2^5 = 32, the cap
                self.attempt += 1;
                RetryDecision::Wait(Duration::from_secs(
                    (1u64 << exp).min(EXPONENTIAL_CAP_SECS),
                ))
            }
        }
    }

    /// Whether at least one failure is pending recovery; a success after
    /// this reports `reconnected` rather than `connected`.
    pub(crate) fn is_recovering(&self) -> bool {
        self.attempt > 0
    }

    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_policy_halts_immediately() {
        let mut retry = RetryController::new(ReconnectionPolicy::None, 50);
        assert_eq!(retry.next(), RetryDecision::Halt);
        assert!(!retry.is_recovering());
    }

    #[test]
    fn linear_policy_is_constant() {
        let mut retry = RetryController::new(ReconnectionPolicy::Linear, 3);
        assert_eq!(retry.next(), RetryDecision::Wait(Duration::from_secs(3)));
        assert_eq!(retry.next(), RetryDecision::Wait(Duration::from_secs(3)));
        assert_eq!(retry.next(), RetryDecision::Wait(Duration::from_secs(3)));
        assert_eq!(retry.next(), RetryDecision::Exhausted);
    }

    #[test]
    fn exponential_policy_doubles_and_caps() {
        let mut retry = RetryController::new(ReconnectionPolicy::Exponential, 10);
        let waits: Vec<u64> = (0..8)
            .map(|_| match retry.next() {
                RetryDecision::Wait(d) => d.as_secs(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 16, 32, 32, 32]);
    }

    #[test]
    fn reset_restores_the_budget() {
        let mut retry = RetryController::new(ReconnectionPolicy::Exponential, 2);
        assert!(matches!(retry.next(), RetryDecision::Wait(_)));
        assert!(retry.is_recovering());
        assert!(matches!(retry.next(), RetryDecision::Wait(_)));
        assert_eq!(retry.next(), RetryDecision::Exhausted);

        retry.reset();
        assert!(!retry.is_recovering());
        assert_eq!(retry.next(), RetryDecision::Wait(Duration::from_secs(1)));
    }
}
